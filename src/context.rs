//! State shared by the dispatcher, the statistics aggregator and the
//! control channel.

use crate::config::{Capabilities, MonitorConfig};
use crate::error::FmonResult;
use crate::eventlog::EventLog;
use crate::eventlog::rotation::RotationPolicy;
use crate::stats::{EventCounters, StatsSnapshot};
use crate::watcher::registry::WatchRegistry;
use chrono::{DateTime, Utc};
use mio::Waker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// One-way stop signal observable from threads and async tasks alike.
///
/// [`Shutdown::trigger`] only flips a flag, fires the attached poll waker
/// and publishes on a watch channel; the owners of each execution context do
/// the actual teardown when they notice.
#[derive(Debug)]
pub struct Shutdown {
    requested: AtomicBool,
    waker: OnceLock<Arc<Waker>>,
    tx: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            requested: AtomicBool::new(false),
            waker: OnceLock::new(),
            tx,
        }
    }

    /// Registers the waker of the poller the dispatcher blocks on. Only the
    /// first call has any effect.
    pub fn attach_waker(&self, waker: Arc<Waker>) {
        if self.waker.set(waker).is_ok() && self.is_triggered() {
            self.wake();
        }
    }

    pub fn trigger(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            self.wake();
            self.tx.send_replace(true);
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Guard that triggers shutdown when dropped, unwinding included.
    pub fn trigger_on_drop(&self) -> ShutdownGuard<'_> {
        ShutdownGuard(self)
    }

    /// Resolves once [`Shutdown::trigger`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|stop| *stop).await;
    }

    fn wake(&self) {
        if let Some(waker) = self.waker.get() {
            if let Err(e) = waker.wake() {
                tracing::warn!("failed to wake dispatcher: {}", e);
            }
        }
    }
}

/// Returned by [`Shutdown::trigger_on_drop`].
#[must_use = "shutdown fires as soon as the guard is dropped"]
pub struct ShutdownGuard<'a>(&'a Shutdown);

impl Drop for ShutdownGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!("thread panicked, requesting shutdown");
        }
        self.0.trigger();
    }
}

/// Everything the execution contexts share, owned in one place.
pub struct MonitorContext {
    pub config: MonitorConfig,
    pub capabilities: Capabilities,
    pub registry: WatchRegistry,
    pub counters: EventCounters,
    pub log: EventLog,
    pub shutdown: Shutdown,
    started_at: DateTime<Utc>,
    started: Instant,
    latest: Mutex<Option<StatsSnapshot>>,
}

impl MonitorContext {
    /// Opens the event log and builds an empty registry sized from `config`.
    pub fn new(config: MonitorConfig) -> FmonResult<Self> {
        let capabilities = config.capabilities();
        let policy = RotationPolicy {
            max_bytes: config.max_log_bytes(),
            max_generations: config.max_log_generations,
            compress: capabilities.compression,
        };
        let log = EventLog::open(&config.log_path, policy)?;
        let registry =
            WatchRegistry::new(config.initial_watch_capacity, capabilities.dynamic_growth);

        Ok(Self {
            capabilities,
            registry,
            counters: EventCounters::new(),
            log,
            shutdown: Shutdown::new(),
            started_at: Utc::now(),
            started: Instant::now(),
            latest: Mutex::new(None),
            config,
        })
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn publish_snapshot(&self, snapshot: StatsSnapshot) {
        *self.latest() = Some(snapshot);
    }

    /// Copy of the last published snapshot, or a fresh one if none exists yet.
    pub fn latest_snapshot(&self) -> StatsSnapshot {
        if let Some(snapshot) = self.latest().clone() {
            return snapshot;
        }
        StatsSnapshot::collect(self)
    }

    fn latest(&self) -> MutexGuard<'_, Option<StatsSnapshot>> {
        self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
