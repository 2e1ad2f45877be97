use std::fs;
use std::time::Duration;

/// Resource usage of the current process.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessUsage {
    pub memory_kb: u64,
    pub cpu_time: Duration,
}

impl ProcessUsage {
    /// Average CPU utilisation over `elapsed` wall-clock time, in percent.
    pub fn cpu_percent(&self, elapsed: Duration) -> f64 {
        let wall = elapsed.as_secs_f64();
        if wall <= 0.0 {
            return 0.0;
        }
        self.cpu_time.as_secs_f64() / wall * 100.0
    }
}

pub fn sample() -> ProcessUsage {
    let rusage = rusage_self();
    let memory_kb = resident_memory_kb()
        .or_else(|| rusage.map(|usage| usage.ru_maxrss.max(0) as u64))
        .unwrap_or(0);
    let cpu_time = rusage
        .map(|usage| timeval(usage.ru_utime) + timeval(usage.ru_stime))
        .unwrap_or_default();

    ProcessUsage {
        memory_kb,
        cpu_time,
    }
}

/// `VmRSS` from `/proc/self/status`.
fn resident_memory_kb() -> Option<u64> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

pub fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}

fn rusage_self() -> Option<libc::rusage> {
    // SAFETY: getrusage only writes into the zeroed struct we hand it.
    unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        (libc::getrusage(libc::RUSAGE_SELF, &mut usage) == 0).then_some(usage)
    }
}

fn timeval(tv: libc::timeval) -> Duration {
    Duration::from_secs(tv.tv_sec.max(0) as u64) + Duration::from_micros(tv.tv_usec.max(0) as u64)
}
