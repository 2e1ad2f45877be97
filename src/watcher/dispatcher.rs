use crate::checksum::ChangeCache;
use crate::context::MonitorContext;
use crate::error::{FmonError, FmonResult};
use crate::pattern::{PatternMatcher, Verdict};
use crate::watcher::event::{self, EventMask, RawEvent};
use crate::watcher::filter::{self, ArtifactFilter, ExtensionFilter};
use crate::watcher::inotify::{Inotify, Readiness, WatchBackend};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

const BUFFER_LEN: usize = 64 * 1024;
const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Running,
    Draining,
    Stopped,
}

/// Turns raw inotify batches into event log lines.
///
/// Records are handled strictly in the order the kernel delivered them.
/// Nothing a single record does can stop the loop: stat, hash and install
/// failures are logged and the next record is processed.
pub struct Dispatcher {
    ctx: Arc<MonitorContext>,
    backend: Arc<dyn WatchBackend>,
    patterns: PatternMatcher,
    extensions: ExtensionFilter,
    artifacts: ArtifactFilter,
    cache: ChangeCache,
    large_file_bytes: Option<u64>,
    state: DispatchState,
}

impl Dispatcher {
    pub fn new(ctx: Arc<MonitorContext>, backend: Arc<dyn WatchBackend>) -> FmonResult<Self> {
        let config = &ctx.config;
        let patterns = PatternMatcher::compile(&config.patterns)?;
        let extensions = ExtensionFilter::new(&config.extensions);
        let mut others = vec![config.stats_path.as_path()];
        if let Some(config_path) = &config.config_path {
            others.push(config_path.as_path());
        }
        let artifacts = ArtifactFilter::new(&config.log_path, &others);
        let large_file_bytes = config.large_file_threshold_bytes();

        Ok(Self {
            ctx,
            backend,
            patterns,
            extensions,
            artifacts,
            cache: ChangeCache::new(),
            large_file_bytes,
            state: DispatchState::Stopped,
        })
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn cache(&self) -> &ChangeCache {
        &self.cache
    }

    /// Reads and handles batches until shutdown is triggered or the
    /// notification stream fails. Releases every watch before returning.
    ///
    /// # Errors
    /// [`FmonError::NotificationRead`] for any read or poll failure other than
    /// an interrupted or would-block call. Shutdown is triggered before returning it.
    pub fn run(&mut self, source: &Inotify) -> FmonResult<()> {
        let mut buf = vec![0u8; BUFFER_LEN];
        self.state = DispatchState::Running;
        tracing::info!("dispatcher running");

        let result = loop {
            if self.ctx.shutdown.is_triggered() {
                break Ok(());
            }

            match source.wait() {
                Ok(Readiness::Woken) => break Ok(()),
                Ok(Readiness::Events) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(FmonError::NotificationRead(e)),
            }

            if let Err(e) = self.read_ready(source, &mut buf) {
                break Err(FmonError::NotificationRead(e));
            }
        };

        self.state = DispatchState::Draining;
        if result.is_ok() {
            // Whatever is already queued still gets logged.
            if let Err(e) = self.read_ready(source, &mut buf) {
                tracing::debug!("final drain stopped early: {}", e);
            }
        }

        let released = self.ctx.registry.release_all(self.backend.as_ref());
        tracing::info!("released {} watches", released);
        self.state = DispatchState::Stopped;

        if let Err(e) = &result {
            self.ctx.log.error(&format!("Read from inotify failed: {e}"));
            self.ctx.shutdown.trigger();
        }
        result
    }

    /// Reads batches until the descriptor would block.
    fn read_ready(&mut self, source: &Inotify, buf: &mut [u8]) -> io::Result<()> {
        loop {
            match source.read(buf) {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    self.handle_batch(&buf[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Decodes one read batch and handles every complete record in it.
    /// Returns the number of records seen.
    pub fn handle_batch(&mut self, batch: &[u8]) -> usize {
        let mut seen = 0;
        for record in event::decode(batch) {
            self.handle(&record);
            seen += 1;
        }
        seen
    }

    pub fn handle(&mut self, record: &RawEvent<'_>) {
        if record.mask.contains(EventMask::Q_OVERFLOW) {
            self.ctx.counters.record_overflow();
            self.ctx
                .log
                .warn("Notification queue overflowed; some events were dropped");
            return;
        }

        if record.mask.contains(EventMask::IGNORED) {
            self.backend.forget(record.wd);
            if let Some(entry) = self.ctx.registry.remove(record.wd) {
                tracing::debug!("watch {} on {} dropped", entry.descriptor, entry.path.display());
            }
            return;
        }

        let Some(parent) = self.ctx.registry.resolve(record.wd) else {
            self.ctx
                .log
                .warn(&format!("Event from unknown watch descriptor {}", record.wd));
            return;
        };

        // Events about the watched directory itself carry no name.
        let Some(name) = record.name else {
            return;
        };
        let name_str = name.to_string_lossy();
        let full_path = parent.join(name);

        if self.artifacts.is_artifact(&name_str) || filter::is_transient(&name_str) {
            return;
        }

        let verdict = self.patterns.evaluate(&name_str);
        if !verdict.is_allowed() {
            return;
        }
        if !record.is_dir() && !self.extensions.allows(&name_str) {
            return;
        }

        if let Verdict::Alert(rule) = verdict {
            self.ctx.counters.record_alert();
            self.ctx.log.record(&format!(
                "[ALERT] Pattern matched '{}' for file: {}",
                rule.pattern,
                full_path.display()
            ));
        }

        self.dispatch(record, &full_path);
    }

    /// Emits one line per event class set in the mask, in fixed order.
    fn dispatch(&mut self, record: &RawEvent<'_>, path: &Path) {
        let mask = record.mask;
        let is_dir = record.is_dir();
        let size = if is_dir {
            None
        } else {
            fs::metadata(path).ok().map(|m| m.len())
        };

        if mask.intersects(EventMask::CREATE | EventMask::MOVED_TO | EventMask::CLOSE_WRITE) {
            self.check_large_file(path, size);
        }

        if mask.contains(EventMask::CREATE) {
            self.emit(record, "Created", path, size);
            if is_dir && self.ctx.config.recursive {
                self.watch_subtree(path);
            }
        }
        if mask.contains(EventMask::DELETE) {
            self.emit(record, "Deleted", path, None);
        }
        if mask.contains(EventMask::MODIFY) {
            let changed = if self.ctx.capabilities.checksum && !is_dir {
                let changed = self.cache.try_check_and_update(path).unwrap_or_else(|e| {
                    self.ctx
                        .log
                        .warn(&format!("Cannot hash file: {} ({})", path.display(), e));
                    true
                });
                self.ctx.counters.set_cache_entries(self.cache.len());
                changed
            } else {
                true
            };
            if changed {
                self.emit(record, "Modified", path, size);
            }
        }
        if mask.contains(EventMask::MOVED_FROM) {
            self.emit(record, "Moved from", path, None);
        }
        if mask.contains(EventMask::MOVED_TO) {
            self.emit(record, "Moved to", path, size);
            if is_dir && self.ctx.config.recursive {
                self.follow_moved_dir(path);
            }
        }
        if mask.contains(EventMask::ATTRIB) {
            self.emit(record, "Attribute changed", path, None);
        }
        if mask.contains(EventMask::OPEN) {
            self.emit(record, "Opened", path, None);
        }
        if mask.contains(EventMask::CLOSE_WRITE) {
            self.emit(record, "Closed", path, size);
        }
    }

    fn emit(&self, record: &RawEvent<'_>, verb: &str, path: &Path, size: Option<u64>) {
        let line = match size {
            Some(bytes) => format!("{verb}: {} ({bytes} bytes)", path.display()),
            None => format!("{verb}: {}", path.display()),
        };
        self.ctx.log.record(&line);

        if let Some((watch_path, count)) = self.ctx.registry.record_event(record.wd) {
            self.ctx.counters.record_event(&watch_path, count);
        }
    }

    fn watch_subtree(&self, path: &Path) {
        let result = self.ctx.registry.install_tree(
            self.backend.as_ref(),
            &self.ctx.log,
            path,
            self.ctx.config.recursive,
        );
        if let Err(e) = result {
            self.ctx
                .log
                .warn(&format!("Failed to watch new directory {}: {}", path.display(), e));
        }
    }

    fn follow_moved_dir(&self, path: &Path) {
        let result = self.ctx.registry.install_moved(
            self.backend.as_ref(),
            &self.ctx.log,
            path,
            self.ctx.config.recursive,
        );
        if let Err(e) = result {
            self.ctx
                .log
                .warn(&format!("Failed to watch moved directory {}: {}", path.display(), e));
        }
    }

    fn check_large_file(&self, path: &Path, size: Option<u64>) {
        if let (Some(limit), Some(bytes)) = (self.large_file_bytes, size) {
            if bytes > limit {
                self.ctx.log.record(&format!(
                    "Large file detected ({} MB): {}",
                    bytes / MB,
                    path.display()
                ));
            }
        }
    }
}

