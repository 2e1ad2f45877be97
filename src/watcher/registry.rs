use crate::error::{FmonError, FmonResult};
use crate::eventlog::EventLog;
use crate::watcher::event::{EventMask, WatchDescriptor};
use crate::watcher::inotify::WatchBackend;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Capacity multiplier applied each time the registry fills up.
pub const GROWTH_FACTOR: usize = 2;

/// One watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub descriptor: WatchDescriptor,
    pub path: PathBuf,
    pub added_at: DateTime<Utc>,
    pub event_count: u64,
}

/// Counters read by the statistics aggregator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub count: usize,
    pub capacity: usize,
    pub limit_hits: u64,
    pub growth_events: u64,
}

/// Result of a successful [`WatchRegistry::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Installed {
    pub descriptor: WatchDescriptor,
    /// `false` when the kernel handed back a descriptor we already track
    /// (same inode reached through another path).
    pub is_new: bool,
    /// Set when this install had to grow the registry.
    pub grown_to: Option<usize>,
}

/// Descriptor to path table.
///
/// Entries are only ever appended or removed, never reordered. The lock is
/// held for table updates only; the `inotify_add_watch` call and any
/// directory walking happen outside it.
#[derive(Debug)]
pub struct WatchRegistry {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    entries: Vec<WatchEntry>,
    index: HashMap<WatchDescriptor, usize>,
    capacity: usize,
    dynamic_growth: bool,
    limit_hits: u64,
    growth_events: u64,
}

impl Inner {
    /// Makes room for one more entry, growing by [`GROWTH_FACTOR`] when full.
    /// On failure only `limit_hits` changes.
    fn ensure_room(&mut self) -> FmonResult<Option<usize>> {
        if self.entries.len() < self.capacity {
            return Ok(None);
        }

        let full = FmonError::RegistryFull {
            capacity: self.capacity,
        };
        if !self.dynamic_growth {
            self.limit_hits += 1;
            return Err(full);
        }

        let Some(new_capacity) = self.capacity.checked_mul(GROWTH_FACTOR) else {
            self.limit_hits += 1;
            return Err(full);
        };
        if self
            .entries
            .try_reserve_exact(new_capacity - self.entries.len())
            .is_err()
        {
            self.limit_hits += 1;
            return Err(full);
        }

        self.capacity = new_capacity;
        self.growth_events += 1;
        Ok(Some(new_capacity))
    }

    fn reindex_from(&mut self, start: usize) {
        for (i, entry) in self.entries.iter().enumerate().skip(start) {
            self.index.insert(entry.descriptor, i);
        }
    }
}

impl WatchRegistry {
    pub fn new(initial_capacity: usize, dynamic_growth: bool) -> Self {
        let capacity = initial_capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::with_capacity(capacity),
                index: HashMap::with_capacity(capacity),
                capacity,
                dynamic_growth,
                limit_hits: 0,
                growth_events: 0,
            }),
        }
    }

    /// Subscribes `path` for [`EventMask::WATCHED`] and records it.
    ///
    /// A descriptor that is already tracked keeps its recorded path; the
    /// kernel hands those back when the same directory is reached through
    /// another name. The registry only grows once the kernel accepted the watch.
    ///
    /// # Errors
    /// - [`FmonError::RegistryFull`] if the registry cannot grow; nothing is registered
    /// - [`FmonError::WatchFailed`] if the kernel rejects the watch
    pub fn install(&self, backend: &dyn WatchBackend, path: &Path) -> FmonResult<Installed> {
        let descriptor =
            backend
                .add_watch(path, EventMask::WATCHED)
                .map_err(|source| FmonError::WatchFailed {
                    path: path.to_path_buf(),
                    source,
                })?;

        let mut inner = self.lock();
        if inner.index.contains_key(&descriptor) {
            return Ok(Installed {
                descriptor,
                is_new: false,
                grown_to: None,
            });
        }

        let grown_to = match inner.ensure_room() {
            Ok(grown_to) => grown_to,
            Err(e) => {
                drop(inner);
                let _ = backend.remove_watch(descriptor);
                return Err(e);
            }
        };

        let slot = inner.entries.len();
        inner.entries.push(WatchEntry {
            descriptor,
            path: path.to_path_buf(),
            added_at: Utc::now(),
            event_count: 0,
        });
        inner.index.insert(descriptor, slot);

        Ok(Installed {
            descriptor,
            is_new: true,
            grown_to,
        })
    }

    /// Installs `root` and, when `recursive`, every directory below it.
    ///
    /// A failure on `root` itself is returned. Below the root, directories
    /// that cannot be listed, stat'ed or watched are reported to `log` and
    /// skipped. Symbolic links are never followed. Returns the number of
    /// newly registered watches.
    pub fn install_tree(
        &self,
        backend: &dyn WatchBackend,
        log: &EventLog,
        root: &Path,
        recursive: bool,
    ) -> FmonResult<usize> {
        let installed = self.install(backend, root)?;
        self.announce(log, root, &installed);
        if !installed.is_new {
            return Ok(0);
        }
        if !recursive {
            return Ok(1);
        }
        Ok(1 + self.install_below(backend, log, root))
    }

    /// Follows a directory that was moved to `path`.
    ///
    /// When the directory was already watched under its old name it keeps
    /// its descriptors and every watch at or below the old path is re-pathed
    /// under `path`. A directory moved in from outside the tree is installed
    /// like a new one. Returns the number of newly registered watches.
    pub fn install_moved(
        &self,
        backend: &dyn WatchBackend,
        log: &EventLog,
        path: &Path,
        recursive: bool,
    ) -> FmonResult<usize> {
        let installed = self.install(backend, path)?;
        if installed.is_new {
            self.announce(log, path, &installed);
            if !recursive {
                return Ok(1);
            }
            return Ok(1 + self.install_below(backend, log, path));
        }

        let moved = self.relocate(installed.descriptor, path);
        if moved > 0 {
            log.record(&format!("[WATCH] Moved: {} ({} watches)", path.display(), moved));
        }
        Ok(0)
    }

    /// Rewrites the path of `wd` to `new_path`, along with every entry that
    /// lived below its old path. Returns how many entries changed.
    pub fn relocate(&self, wd: WatchDescriptor, new_path: &Path) -> usize {
        let mut inner = self.lock();
        let Some(&i) = inner.index.get(&wd) else {
            return 0;
        };
        let old_path = inner.entries[i].path.clone();
        if old_path == new_path {
            return 0;
        }

        let mut moved = 0;
        for entry in inner.entries.iter_mut() {
            let Ok(rest) = entry.path.strip_prefix(&old_path) else {
                continue;
            };
            entry.path = if rest.as_os_str().is_empty() {
                new_path.to_path_buf()
            } else {
                new_path.join(rest)
            };
            moved += 1;
        }
        moved
    }

    /// Walks everything below an already installed `top`.
    fn install_below(&self, backend: &dyn WatchBackend, log: &EventLog, top: &Path) -> usize {
        let mut added = 0;
        let mut pending = vec![top.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let listing = match fs::read_dir(&dir) {
                Ok(listing) => listing,
                Err(e) => {
                    log.warn(&format!("Cannot open directory: {} ({})", dir.display(), e));
                    continue;
                }
            };

            for entry in listing {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        log.warn(&format!("Cannot read entry in {}: {}", dir.display(), e));
                        continue;
                    }
                };
                let child = entry.path();

                // `file_type` does not follow symlinks.
                match entry.file_type() {
                    Ok(kind) if kind.is_dir() => {}
                    Ok(_) => continue,
                    Err(e) => {
                        log.warn(&format!("Cannot stat path: {} ({})", child.display(), e));
                        continue;
                    }
                }

                match self.install(backend, &child) {
                    Ok(installed) => {
                        self.announce(log, &child, &installed);
                        if installed.is_new {
                            added += 1;
                            pending.push(child);
                        }
                    }
                    Err(e) => log.warn(&format!("Failed to add watch: {e}")),
                }
            }
        }
        added
    }

    fn announce(&self, log: &EventLog, path: &Path, installed: &Installed) {
        if let Some(capacity) = installed.grown_to {
            tracing::info!("watch registry expanded to {} entries", capacity);
            log.record(&format!("[INFO] Watch registry expanded to {capacity} entries"));
        }
        if installed.is_new {
            tracing::debug!("watching {} (wd {})", path.display(), installed.descriptor);
            log.record(&format!(
                "[WATCH] Added: {} (wd: {})",
                path.display(),
                installed.descriptor
            ));
        }
    }

    pub fn resolve(&self, wd: WatchDescriptor) -> Option<PathBuf> {
        let inner = self.lock();
        inner.index.get(&wd).map(|&i| inner.entries[i].path.clone())
    }

    /// Bumps the per-watch counter and returns the watch path with its new count.
    pub fn record_event(&self, wd: WatchDescriptor) -> Option<(PathBuf, u64)> {
        let mut inner = self.lock();
        let i = *inner.index.get(&wd)?;
        let entry = &mut inner.entries[i];
        entry.event_count += 1;
        Some((entry.path.clone(), entry.event_count))
    }

    /// Forgets `wd`. Does not touch the kernel watch; use this when the
    /// kernel already dropped it (`IN_IGNORED`).
    pub fn remove(&self, wd: WatchDescriptor) -> Option<WatchEntry> {
        let mut inner = self.lock();
        let i = inner.index.remove(&wd)?;
        let entry = inner.entries.remove(i);
        inner.reindex_from(i);
        Some(entry)
    }

    /// Empties the registry and removes every kernel watch. Returns how many
    /// watches were released.
    pub fn release_all(&self, backend: &dyn WatchBackend) -> usize {
        let drained: Vec<WatchEntry> = {
            let mut inner = self.lock();
            inner.index.clear();
            inner.entries.drain(..).collect()
        };

        for entry in &drained {
            if let Err(e) = backend.remove_watch(entry.descriptor) {
                tracing::debug!("removing watch {} failed: {}", entry.descriptor, e);
            }
        }
        drained.len()
    }

    pub fn contains(&self, wd: WatchDescriptor) -> bool {
        self.lock().index.contains_key(&wd)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.lock();
        RegistryStats {
            count: inner.entries.len(),
            capacity: inner.capacity,
            limit_hits: inner.limit_hits,
            growth_events: inner.growth_events,
        }
    }

    /// Copy of every entry, in insertion order.
    pub fn entries(&self) -> Vec<WatchEntry> {
        self.lock().entries.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
