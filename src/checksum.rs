//! Content-hash change detection.
//!
//! Editors and build tools routinely emit modify events that leave a file's
//! bytes untouched (touch, attribute rewrites, identical saves). The
//! [`ChangeCache`] remembers the last digest seen for every path so those
//! events can be told apart from real content changes.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const CHUNK_SIZE: usize = 8192;

pub type ContentDigest = [u8; 32];

/// Last known state of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRecord {
    pub path: PathBuf,
    pub digest: ContentDigest,
    pub size: u64,
    pub last_modified: SystemTime,
}

impl HashRecord {
    pub fn digest_hex(&self) -> String {
        self.digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Path to digest map. Records are never evicted.
#[derive(Debug, Default)]
pub struct ChangeCache {
    records: HashMap<PathBuf, HashRecord>,
}

impl ChangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes `path` and compares it with the cached digest.
    ///
    /// Returns `true` on the first sighting of a path, when the digest
    /// differs from the cached one, and when the file cannot be read.
    /// Only an identical digest yields `false`.
    pub fn check_and_update(&mut self, path: &Path) -> bool {
        self.try_check_and_update(path).unwrap_or_else(|e| {
            tracing::debug!("hash of {} failed: {}", path.display(), e);
            true
        })
    }

    /// Like [`ChangeCache::check_and_update`], but hands a read failure back
    /// to the caller. The cache is left untouched on error.
    pub fn try_check_and_update(&mut self, path: &Path) -> io::Result<bool> {
        let digest = hash_file(path)?;

        if let Some(record) = self.records.get_mut(path) {
            if record.digest == digest {
                return Ok(false);
            }
            record.digest = digest;
            record.size = file_size(path).unwrap_or(record.size);
            record.last_modified = SystemTime::now();
            return Ok(true);
        }

        self.records.insert(
            path.to_path_buf(),
            HashRecord {
                path: path.to_path_buf(),
                digest,
                size: file_size(path).unwrap_or(0),
                last_modified: SystemTime::now(),
            },
        );
        Ok(true)
    }

    pub fn get(&self, path: &Path) -> Option<&HashRecord> {
        self.records.get(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Streams `path` through SHA-256 in fixed-size chunks.
pub fn hash_file(path: &Path) -> io::Result<ContentDigest> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize().into())
}

fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}
