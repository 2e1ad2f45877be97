use fmon_core::context::Shutdown;
use fmon_core::error::FmonError;
use fmon_core::watcher::inotify::{Inotify, Readiness};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn panicking_thread_still_triggers_shutdown() {
    let shutdown = Arc::new(Shutdown::new());
    let worker = shutdown.clone();

    let handle = thread::spawn(move || {
        let _stop = worker.trigger_on_drop();
        panic!("dispatcher blew up");
    });

    assert!(handle.join().is_err());
    assert!(shutdown.is_triggered());
    println!("✅ Panic guard test passed");
}

#[test]
fn trigger_wakes_blocked_wait() -> Result<(), FmonError> {
    let inotify = Arc::new(Inotify::init()?);
    let shutdown = Arc::new(Shutdown::new());
    shutdown.attach_waker(inotify.waker());

    let waiter = {
        let inotify = inotify.clone();
        thread::spawn(move || inotify.wait())
    };
    thread::sleep(Duration::from_millis(50));
    shutdown.trigger();

    let readiness = waiter.join().expect("waiter thread")?;
    assert_eq!(readiness, Readiness::Woken);
    Ok(())
}

#[test]
fn waker_attached_after_trigger_fires_immediately() -> Result<(), FmonError> {
    let inotify = Inotify::init()?;
    let shutdown = Shutdown::new();
    shutdown.trigger();
    shutdown.trigger();

    shutdown.attach_waker(inotify.waker());
    assert_eq!(inotify.wait()?, Readiness::Woken);
    Ok(())
}

#[tokio::test]
async fn cancelled_resolves_after_trigger() {
    let shutdown = Arc::new(Shutdown::new());
    let waiter = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.cancelled().await })
    };

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("cancelled resolves")
        .expect("waiter task");
    assert!(shutdown.is_triggered());
}
