use crate::watcher::event::{EventMask, WatchDescriptor};
use inotify::WatchMask;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const NOTIFY: Token = Token(0);
const WAKE: Token = Token(1);

/// Where watches are registered. Implemented by [`Inotify`]; tests supply
/// their own to exercise the registry without kernel limits.
pub trait WatchBackend: Send + Sync {
    fn add_watch(&self, path: &Path, mask: EventMask) -> io::Result<WatchDescriptor>;
    fn remove_watch(&self, wd: WatchDescriptor) -> io::Result<()>;

    /// Drops bookkeeping for a watch the kernel already removed.
    fn forget(&self, _wd: WatchDescriptor) {}
}

/// What woke a [`Inotify::wait`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Events,
    Woken,
}

#[derive(Debug)]
struct Poller {
    poll: Poll,
    events: Events,
}

/// Non-blocking inotify instance with a readiness poller.
///
/// Raw record batches are read from a duplicate of the inotify descriptor so
/// they can be handed to [`crate::watcher::event::decode`] untouched.
#[derive(Debug)]
pub struct Inotify {
    kernel: inotify::Inotify,
    reader: File,
    descriptors: Mutex<HashMap<i32, inotify::WatchDescriptor>>,
    poller: Mutex<Poller>,
    waker: Arc<Waker>,
}

impl Inotify {
    pub fn init() -> io::Result<Self> {
        let kernel = inotify::Inotify::init()?;
        let reader = File::from(kernel.as_fd().try_clone_to_owned()?);

        let poll = Poll::new()?;
        poll.registry().register(
            &mut SourceFd(&kernel.as_raw_fd()),
            NOTIFY,
            Interest::READABLE,
        )?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE)?);

        Ok(Self {
            kernel,
            reader,
            descriptors: Mutex::new(HashMap::new()),
            poller: Mutex::new(Poller {
                poll,
                events: Events::with_capacity(8),
            }),
            waker,
        })
    }

    /// Handle that interrupts a blocked [`Inotify::wait`].
    pub fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// Blocks until records are readable or the waker fires.
    ///
    /// Readiness is edge-triggered: after [`Readiness::Events`] the caller
    /// must read until `WouldBlock`.
    pub fn wait(&self) -> io::Result<Readiness> {
        let mut guard = lock(&self.poller);
        let Poller { poll, events } = &mut *guard;
        poll.poll(events, None)?;

        if events.iter().any(|event| event.token() == WAKE) {
            Ok(Readiness::Woken)
        } else {
            Ok(Readiness::Events)
        }
    }

    /// Reads one batch of raw records into `buf`.
    ///
    /// `WouldBlock` and `Interrupted` are returned as-is for the caller to retry.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.reader).read(buf)
    }
}

impl WatchBackend for Inotify {
    fn add_watch(&self, path: &Path, mask: EventMask) -> io::Result<WatchDescriptor> {
        let wd = self
            .kernel
            .watches()
            .add(path, WatchMask::from_bits_truncate(mask.bits()))?;
        let id = wd.get_watch_descriptor_id();
        lock(&self.descriptors).insert(id, wd);
        Ok(WatchDescriptor(id))
    }

    fn remove_watch(&self, wd: WatchDescriptor) -> io::Result<()> {
        let Some(kernel_wd) = lock(&self.descriptors).remove(&wd.0) else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("watch descriptor {wd} is not registered"),
            ));
        };
        self.kernel.watches().remove(kernel_wd)
    }

    fn forget(&self, wd: WatchDescriptor) {
        lock(&self.descriptors).remove(&wd.0);
    }
}

impl AsRawFd for Inotify {
    fn as_raw_fd(&self) -> RawFd {
        self.kernel.as_raw_fd()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
