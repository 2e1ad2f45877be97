#![allow(dead_code)]

use fmon_core::config::MonitorConfig;
use fmon_core::watcher::event::{EventMask, HEADER_LEN, WatchDescriptor};
use fmon_core::watcher::inotify::WatchBackend;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

/// What the fake keys descriptors on: the inode for paths that exist, the
/// path itself otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum WatchKey {
    Inode(u64, u64),
    Path(PathBuf),
}

impl WatchKey {
    fn of(path: &Path) -> Self {
        match fs::metadata(path) {
            Ok(meta) => WatchKey::Inode(meta.dev(), meta.ino()),
            Err(_) => WatchKey::Path(path.to_path_buf()),
        }
    }
}

/// In-memory watch backend. Hands out increasing descriptors and, like the
/// kernel, returns the same descriptor when one directory is watched twice,
/// whatever name it is reached through.
#[derive(Debug, Default)]
pub struct FakeBackend {
    next: AtomicI32,
    by_key: Mutex<HashMap<WatchKey, WatchDescriptor>>,
    failing: HashSet<PathBuf>,
    removed: Mutex<Vec<WatchDescriptor>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            next: AtomicI32::new(1),
            ..Default::default()
        }
    }

    /// Backend that rejects every path in `paths`.
    pub fn failing_on(paths: &[&Path]) -> Self {
        Self {
            failing: paths.iter().map(|p| p.to_path_buf()).collect(),
            ..Self::new()
        }
    }

    pub fn removed(&self) -> Vec<WatchDescriptor> {
        self.removed.lock().unwrap().clone()
    }
}

impl WatchBackend for FakeBackend {
    fn add_watch(&self, path: &Path, _mask: EventMask) -> io::Result<WatchDescriptor> {
        if self.failing.contains(path) {
            return Err(io::Error::other("no space left for watches"));
        }
        let mut by_key = self.by_key.lock().unwrap();
        let wd = *by_key
            .entry(WatchKey::of(path))
            .or_insert_with(|| WatchDescriptor(self.next.fetch_add(1, Ordering::SeqCst)));
        Ok(wd)
    }

    fn remove_watch(&self, wd: WatchDescriptor) -> io::Result<()> {
        self.removed.lock().unwrap().push(wd);
        Ok(())
    }
}

/// Encodes one kernel-style record, padding the name to a 16-byte boundary.
pub fn record(wd: i32, mask: EventMask, cookie: u32, name: Option<&str>) -> Vec<u8> {
    let name_bytes = match name {
        Some(name) => {
            let mut bytes = name.as_bytes().to_vec();
            bytes.push(0);
            while bytes.len() % 16 != 0 {
                bytes.push(0);
            }
            bytes
        }
        None => Vec::new(),
    };

    let mut out = Vec::with_capacity(HEADER_LEN + name_bytes.len());
    out.extend_from_slice(&wd.to_ne_bytes());
    out.extend_from_slice(&mask.bits().to_ne_bytes());
    out.extend_from_slice(&cookie.to_ne_bytes());
    out.extend_from_slice(&(name_bytes.len() as u32).to_ne_bytes());
    out.extend_from_slice(&name_bytes);
    out
}

/// Config watching `root` with every artifact placed under `state`.
pub fn test_config(root: &Path, state: &Path) -> MonitorConfig {
    let mut config = MonitorConfig::new(root);
    config.log_path = state.join("fmon.log");
    config.stats_path = state.join("fmon_stats.json");
    config.socket_path = state.join("fmon.sock");
    config
}

pub fn read_log(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_default()
}

pub fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

/// Polls the log until `needle` appears at least `times` times.
pub fn wait_for_lines(log: &Path, needle: &str, times: usize, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if count(&read_log(log), needle) >= times {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}
