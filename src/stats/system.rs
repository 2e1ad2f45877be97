use std::fs;
use std::path::Path;

/// Where the kernel publishes the per-user inotify watch limit.
pub const WATCH_LIMIT_PATH: &str = "/proc/sys/fs/inotify/max_user_watches";

/// Disk usage above this percentage is reported.
pub const DISK_CRITICAL_PERCENT: u64 = 90;

/// Share of the watch limit, in percent, past which a warning is logged.
pub const WATCH_LIMIT_WARN_PERCENT: u64 = 80;

/// Used space of the filesystem holding `path`, in percent.
pub fn disk_usage_percent(path: &Path) -> Option<u64> {
    let total = fs2::total_space(path).ok()?;
    let available = fs2::available_space(path).ok()?;
    usage_percent(total, available)
}

pub fn usage_percent(total: u64, available: u64) -> Option<u64> {
    if total == 0 {
        return None;
    }
    let used = total.saturating_sub(available) as u128;
    Some((used * 100 / total as u128) as u64)
}

pub fn inotify_watch_limit() -> Option<u64> {
    let text = fs::read_to_string(WATCH_LIMIT_PATH).ok()?;
    text.trim().parse().ok()
}

pub fn near_watch_limit(watches: usize, limit: u64) -> bool {
    watches as u128 * 100 > limit as u128 * WATCH_LIMIT_WARN_PERCENT as u128
}
