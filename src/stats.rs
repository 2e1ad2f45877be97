//! Live statistics.
//!
//! The dispatcher bumps lock-free [`EventCounters`]; the [`StatsAggregator`]
//! periodically folds them together with registry, cache and process figures
//! into a [`StatsSnapshot`], keeps a copy for the control channel and writes
//! it to disk as JSON.

pub mod process;
pub mod system;

use crate::context::MonitorContext;
use crate::error::FmonResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MostActive {
    pub path: Option<PathBuf>,
    pub events: u64,
}

#[derive(Debug, Default)]
pub struct EventCounters {
    total_events: AtomicU64,
    overflows: AtomicU64,
    alerts: AtomicU64,
    cache_entries: AtomicU64,
    most_active: Mutex<MostActive>,
}

impl EventCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one logged event for the watch at `path`, whose own counter
    /// now reads `path_events`.
    pub fn record_event(&self, path: &Path, path_events: u64) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let mut most_active = self.most_active();
        if path_events > most_active.events {
            most_active.events = path_events;
            if most_active.path.as_deref() != Some(path) {
                most_active.path = Some(path.to_path_buf());
            }
        }
    }

    pub fn record_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self) {
        self.alerts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_cache_entries(&self, entries: usize) {
        self.cache_entries.store(entries as u64, Ordering::Relaxed);
    }

    pub fn total_events(&self) -> u64 {
        self.total_events.load(Ordering::Relaxed)
    }

    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    pub fn alerts(&self) -> u64 {
        self.alerts.load(Ordering::Relaxed)
    }

    pub fn cache_entries(&self) -> u64 {
        self.cache_entries.load(Ordering::Relaxed)
    }

    pub fn most_active_path(&self) -> MostActive {
        self.most_active().clone()
    }

    fn most_active(&self) -> std::sync::MutexGuard<'_, MostActive> {
        self.most_active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_events: u64,
    pub active_watches: usize,
    pub watch_capacity: usize,
    pub memory_kb: u64,
    pub cpu_percent: f64,
    pub realloc_count: u64,
    pub most_active_path: Option<PathBuf>,
    pub max_events_for_path: u64,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub events_per_second: f64,
    pub cache_entries: u64,
    pub watch_limit_hits: u64,
    pub bytes_logged: u64,
    pub log_generations: u64,
    pub overflow_count: u64,
    pub alert_count: u64,
    /// Used space of the filesystem holding the event log, in percent.
    #[serde(default)]
    pub disk_usage_percent: Option<u64>,
}

impl StatsSnapshot {
    /// Gathers a fresh snapshot. Takes the registry lock only long enough to
    /// read its count and capacity.
    pub fn collect(ctx: &MonitorContext) -> Self {
        let usage = process::sample();
        let uptime = ctx.uptime();
        let registry = ctx.registry.stats();
        let most_active = ctx.counters.most_active_path();
        let rotation = ctx.log.rotation_state();
        let total_events = ctx.counters.total_events();
        let log_dir = match ctx.log.path().parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let elapsed = uptime.as_secs_f64();
        let events_per_second = if elapsed > 0.0 {
            total_events as f64 / elapsed
        } else {
            0.0
        };

        Self {
            total_events,
            active_watches: registry.count,
            watch_capacity: registry.capacity,
            memory_kb: usage.memory_kb,
            cpu_percent: usage.cpu_percent(uptime),
            realloc_count: registry.growth_events,
            most_active_path: most_active.path,
            max_events_for_path: most_active.events,
            start_time: ctx.started_at(),
            last_update: Utc::now(),
            uptime_seconds: uptime.as_secs(),
            events_per_second,
            cache_entries: ctx.counters.cache_entries(),
            watch_limit_hits: registry.limit_hits,
            bytes_logged: rotation.current_size_bytes,
            log_generations: rotation.generation_count,
            overflow_count: ctx.counters.overflows(),
            alert_count: ctx.counters.alerts(),
            disk_usage_percent: system::disk_usage_percent(log_dir),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "events={} watches={}/{} memory={}KB cpu={:.2}% reallocs={} limit_hits={} most_active={} ({} events)",
            self.total_events,
            self.active_watches,
            self.watch_capacity,
            self.memory_kb,
            self.cpu_percent,
            self.realloc_count,
            self.watch_limit_hits,
            self.most_active_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.max_events_for_path,
        )
    }
}

/// Replaces the snapshot file atomically: the JSON is written to a temp file
/// in the target directory and renamed over the old one.
pub fn write_snapshot(path: &Path, snapshot: &StatsSnapshot) -> FmonResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // The `.tmp` suffix keeps the scratch file out of the event log when the
    // snapshot lives inside the watched tree.
    let mut tmp = tempfile::Builder::new()
        .prefix(".fmon_stats")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, snapshot)?;
    tmp.write_all(b"\n")?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn read_snapshot(path: &Path) -> FmonResult<StatsSnapshot> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Warnings about the host that a snapshot reveals: a nearly full disk and a
/// watch count close to the kernel's per-user limit.
pub fn resource_warnings(snapshot: &StatsSnapshot, watch_limit: Option<u64>) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Some(percent) = snapshot.disk_usage_percent {
        if percent > system::DISK_CRITICAL_PERCENT {
            warnings.push(format!("Disk usage critical: {percent}% used"));
        }
    }
    if let Some(limit) = watch_limit {
        if system::near_watch_limit(snapshot.active_watches, limit) {
            warnings.push(format!(
                "Approaching inotify watch limit ({} of {} watches)",
                snapshot.active_watches, limit
            ));
        }
    }
    warnings
}

/// Timer-driven snapshot writer.
pub struct StatsAggregator {
    ctx: Arc<MonitorContext>,
    path: PathBuf,
    interval: Duration,
    watch_limit: Option<u64>,
}

impl StatsAggregator {
    pub fn new(ctx: Arc<MonitorContext>) -> Self {
        let path = ctx.config.stats_path.clone();
        let interval = Duration::from_secs(ctx.config.stats_interval_secs.max(1));
        Self {
            ctx,
            path,
            interval,
            watch_limit: system::inotify_watch_limit(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Overrides the watch limit read from the kernel at construction.
    pub fn with_watch_limit(mut self, limit: Option<u64>) -> Self {
        self.watch_limit = limit;
        self
    }

    /// Collects, publishes and persists one snapshot, then logs any resource
    /// warnings. A failed write is logged; the snapshot is still published.
    pub fn tick(&self) -> StatsSnapshot {
        let snapshot = StatsSnapshot::collect(&self.ctx);
        self.ctx.publish_snapshot(snapshot.clone());

        for warning in resource_warnings(&snapshot, self.watch_limit) {
            self.ctx.log.warn(&warning);
        }

        if let Err(e) = write_snapshot(&self.path, &snapshot) {
            self.ctx.log.warn(&format!(
                "failed to save statistics to {}: {}",
                self.path.display(),
                e
            ));
        }
        snapshot
    }

    /// Ticks until shutdown is requested. The final snapshot is written by
    /// the service after the dispatcher has stopped.
    pub async fn run(self) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                _ = self.ctx.shutdown.cancelled() => {
                    tracing::debug!("statistics aggregator stopping");
                    break;
                }
            }
        }
    }
}
