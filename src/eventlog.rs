//! Append-only event log with size-triggered rotation.
//!
//! Every line is written as `[YYYY-mm-dd HH:MM:SS] message` and synced to
//! disk before [`EventLog::append`] returns. Rotation runs under the same
//! lock as the write, so no line can land on a half-rotated file.
//!
//! Retired generations are named `<log>.0` (newest) through
//! `<log>.<max_generations - 1>`; with compression enabled generation 0 is
//! gzipped on a background thread into `<log>.0.gz`.

pub mod rotation;

use crate::error::FmonResult;
use chrono::Local;
use rotation::{LogRotationState, RotationPolicy};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

pub use rotation::{compressed_path, existing_generations, generation_path};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct EventLog {
    path: PathBuf,
    policy: RotationPolicy,
    inner: Mutex<LogFile>,
}

struct LogFile {
    file: File,
    state: LogRotationState,
    compressor: Option<JoinHandle<()>>,
}

impl EventLog {
    /// Opens (or creates) the active log in append mode.
    pub fn open(path: &Path, policy: RotationPolicy) -> FmonResult<Self> {
        let file = open_append(path)?;
        let current_size_bytes = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            policy,
            inner: Mutex::new(LogFile {
                file,
                state: LogRotationState {
                    current_size_bytes,
                    generation_count: 0,
                },
                compressor: None,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    /// Writes one timestamped line, syncs it, then rotates if the file
    /// crossed the size threshold.
    pub fn append(&self, message: &str) -> FmonResult<()> {
        let mut log = self.lock();
        log.write_line(message)?;

        if let Some(max_bytes) = self.policy.max_bytes {
            if log.state.current_size_bytes > max_bytes {
                let warnings = log.rotate(&self.path, &self.policy);
                for warning in &warnings {
                    tracing::warn!("log rotation: {}", warning);
                    log.write_line(&format!("[WARN] {warning}"))?;
                }
                log.write_line("[INFO] Log file rotated")?;
            }
        }

        Ok(())
    }

    /// Appends a `[WARN]` line and mirrors it to the operator channel.
    /// A failing write is reported but never propagated.
    pub fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
        if let Err(e) = self.append(&format!("[WARN] {message}")) {
            tracing::error!("failed to write warning to event log: {}", e);
        }
    }

    /// Appends an `[ERROR]` line and mirrors it to the operator channel.
    pub fn error(&self, message: &str) {
        tracing::error!("{}", message);
        if let Err(e) = self.append(&format!("[ERROR] {message}")) {
            tracing::error!("failed to write error to event log: {}", e);
        }
    }

    /// Appends a line, reporting a failed write instead of returning it.
    pub fn record(&self, message: &str) {
        if let Err(e) = self.append(message) {
            tracing::error!("failed to write event log line: {}", e);
        }
    }

    pub fn rotation_state(&self) -> LogRotationState {
        self.lock().state
    }

    /// Waits for any background compression and syncs the active file.
    pub fn close(&self) -> FmonResult<()> {
        let mut log = self.lock();
        if let Some(handle) = log.compressor.take() {
            let _ = handle.join();
        }
        log.file.sync_all()?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogFile> {
        // A panic while holding the lock leaves the file handle usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LogFile {
    fn write_line(&mut self, message: &str) -> FmonResult<()> {
        let line = format!("[{}] {}\n", Local::now().format(TIMESTAMP_FORMAT), message);
        self.file.write_all(line.as_bytes())?;
        self.file.sync_data()?;
        self.state.current_size_bytes += line.len() as u64;
        Ok(())
    }

    /// Retires the active file. Never leaves `self.file` unusable: every
    /// failure is returned as a warning and the best open handle is kept.
    fn rotate(&mut self, active: &Path, policy: &RotationPolicy) -> Vec<String> {
        if let Some(handle) = self.compressor.take() {
            let _ = handle.join();
        }

        if policy.max_generations == 0 {
            self.state.current_size_bytes = 0;
            return match self.file.set_len(0) {
                Ok(()) => {
                    self.state.generation_count += 1;
                    Vec::new()
                }
                Err(e) => vec![format!("failed to truncate {}: {}", active.display(), e)],
            };
        }

        let mut warnings = rotation::shift_generations(active, policy.max_generations);
        let retired = generation_path(active, 0);

        if let Err(e) = fs::rename(active, &retired) {
            warnings.push(format!(
                "failed to rename {} to {}: {}",
                active.display(),
                retired.display(),
                e
            ));
            self.state.current_size_bytes = 0;
            return warnings;
        }

        match open_append(active) {
            Ok(fresh) => {
                self.file = fresh;
                self.state.current_size_bytes = 0;
                self.state.generation_count += 1;
            }
            Err(e) => {
                // The old handle now points at generation 0; keep writing there.
                warnings.push(format!("failed to reopen {}: {}", active.display(), e));
                self.state.current_size_bytes = 0;
                return warnings;
            }
        }

        if policy.compress {
            let spawned = thread::Builder::new()
                .name("fmon-log-compress".into())
                .spawn(move || match rotation::compress_file(&retired) {
                    Ok(target) => tracing::debug!("compressed {}", target.display()),
                    Err(e) => tracing::warn!("failed to compress {}: {}", retired.display(), e),
                });
            match spawned {
                Ok(handle) => self.compressor = Some(handle),
                Err(e) => warnings.push(format!("failed to start log compression: {e}")),
            }
        }

        warnings
    }
}

impl Drop for LogFile {
    fn drop(&mut self) {
        if let Some(handle) = self.compressor.take() {
            let _ = handle.join();
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
