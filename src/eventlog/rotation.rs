use flate2::Compression;
use flate2::write::GzEncoder;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// When and how the active log is retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate once the active file grows past this many bytes. `None` disables rotation.
    pub max_bytes: Option<u64>,
    /// Number of retired generations kept on disk.
    pub max_generations: usize,
    /// Gzip generation 0 after each rotation.
    pub compress: bool,
}

impl RotationPolicy {
    pub fn disabled() -> Self {
        Self {
            max_bytes: None,
            max_generations: 0,
            compress: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogRotationState {
    pub current_size_bytes: u64,
    pub generation_count: u64,
}

/// `fmon.log` -> `fmon.log.3`
pub fn generation_path(active: &Path, generation: usize) -> PathBuf {
    with_suffix(active, &format!(".{generation}"))
}

/// `fmon.log.0` -> `fmon.log.0.gz`
pub fn compressed_path(path: &Path) -> PathBuf {
    with_suffix(path, ".gz")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Retired generations currently on disk, plain or compressed, oldest last.
pub fn existing_generations(active: &Path, max_generations: usize) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for generation in 0..=max_generations {
        let plain = generation_path(active, generation);
        let gz = compressed_path(&plain);
        if plain.exists() {
            found.push(plain);
        }
        if gz.exists() {
            found.push(gz);
        }
    }
    found
}

/// Moves every generation up by one, dropping the one that would fall past
/// `max_generations`. Returns a warning for each step that failed.
pub(crate) fn shift_generations(active: &Path, max_generations: usize) -> Vec<String> {
    let mut warnings = Vec::new();
    if max_generations == 0 {
        return warnings;
    }

    let oldest = generation_path(active, max_generations - 1);
    for victim in [compressed_path(&oldest), oldest] {
        if victim.exists() {
            if let Err(e) = fs::remove_file(&victim) {
                warnings.push(format!("failed to remove {}: {}", victim.display(), e));
            }
        }
    }

    for generation in (0..max_generations - 1).rev() {
        let from = generation_path(active, generation);
        let to = generation_path(active, generation + 1);
        for (src, dst) in [
            (compressed_path(&from), compressed_path(&to)),
            (from, to),
        ] {
            if src.exists() {
                if let Err(e) = fs::rename(&src, &dst) {
                    warnings.push(format!(
                        "failed to rename {} to {}: {}",
                        src.display(),
                        dst.display(),
                        e
                    ));
                }
            }
        }
    }

    warnings
}

/// Gzips `path` into `path.gz` and removes the uncompressed file.
pub fn compress_file(path: &Path) -> io::Result<PathBuf> {
    let target = compressed_path(path);
    let mut input = BufReader::new(File::open(path)?);
    let mut encoder = GzEncoder::new(File::create(&target)?, Compression::best());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.sync_all()?;
    fs::remove_file(path)?;
    Ok(target)
}
