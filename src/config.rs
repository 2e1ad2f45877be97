//! Monitor configuration.
//!
//! The configuration is plain data: a root directory plus the knobs that turn
//! individual pipeline stages on and off. It can be built in code or loaded
//! from a TOML file:
//!
//! ```toml
//! recursive = true
//! extensions = ["txt", "md"]
//! checksum_enabled = true
//! max_log_size_mb = 50
//!
//! [[patterns]]
//! pattern = '.*\.conf$'
//! action = "alert"
//! ```

use crate::error::FmonResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const MB: u64 = 1024 * 1024;

/// What a [`PatternSpec`] does when it matches a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternAction {
    Exclude,
    Include,
    Alert,
}

/// An uncompiled pattern rule as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub pattern: String,
    pub action: PatternAction,
}

impl PatternSpec {
    pub fn new(pattern: impl Into<String>, action: PatternAction) -> Self {
        Self {
            pattern: pattern.into(),
            action,
        }
    }
}

/// Legacy operating modes, each a fixed set of [`Capabilities`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Basic,
    Advanced,
    Enhanced,
}

impl Mode {
    pub fn capabilities(self) -> Capabilities {
        match self {
            Mode::Basic => Capabilities {
                checksum: false,
                dynamic_growth: false,
                rotation: false,
                compression: false,
            },
            Mode::Advanced => Capabilities {
                checksum: true,
                dynamic_growth: false,
                rotation: true,
                compression: true,
            },
            Mode::Enhanced => Capabilities {
                checksum: false,
                dynamic_growth: true,
                rotation: true,
                compression: false,
            },
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Mode::Basic),
            "advanced" => Ok(Mode::Advanced),
            "enhanced" => Ok(Mode::Enhanced),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// Resolved feature flags for the dispatcher and log writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub checksum: bool,
    pub dynamic_growth: bool,
    pub rotation: bool,
    pub compression: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub root: PathBuf,
    pub recursive: bool,
    pub extensions: Vec<String>,
    pub checksum_enabled: bool,
    pub compression_enabled: bool,
    pub dynamic_growth: bool,
    pub initial_watch_capacity: usize,
    pub max_log_size_mb: u64,
    pub max_log_generations: usize,
    pub large_file_threshold_mb: u64,
    pub stats_interval_secs: u64,
    pub log_path: PathBuf,
    pub stats_path: PathBuf,
    pub socket_path: PathBuf,
    pub patterns: Vec<PatternSpec>,
    /// File this configuration was loaded from, if any.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            recursive: true,
            extensions: Vec::new(),
            checksum_enabled: true,
            compression_enabled: true,
            dynamic_growth: true,
            initial_watch_capacity: 1024,
            max_log_size_mb: 50,
            max_log_generations: 10,
            large_file_threshold_mb: 100,
            stats_interval_secs: 5,
            log_path: PathBuf::from("fmon.log"),
            stats_path: PathBuf::from("fmon_stats.json"),
            socket_path: default_socket_path(),
            patterns: Vec::new(),
            config_path: None,
        }
    }
}

impl MonitorConfig {
    /// Creates a default configuration watching `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Reads a TOML configuration file.
    ///
    /// Fields absent from the file keep their defaults. The file's own path
    /// is kept in [`MonitorConfig::config_path`] so edits to it are not
    /// reported as events.
    pub fn load(path: &Path) -> FmonResult<Self> {
        let text = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> FmonResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Overwrites the capability flags with the preset of `mode`.
    pub fn apply_mode(&mut self, mode: Mode) {
        let caps = mode.capabilities();
        self.checksum_enabled = caps.checksum;
        self.dynamic_growth = caps.dynamic_growth;
        self.compression_enabled = caps.compression;
        if !caps.rotation {
            self.max_log_size_mb = 0;
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            checksum: self.checksum_enabled,
            dynamic_growth: self.dynamic_growth,
            rotation: self.max_log_size_mb > 0,
            compression: self.compression_enabled,
        }
    }

    /// Rotation threshold in bytes, `None` when rotation is disabled.
    pub fn max_log_bytes(&self) -> Option<u64> {
        (self.max_log_size_mb > 0).then(|| self.max_log_size_mb * MB)
    }

    pub fn large_file_threshold_bytes(&self) -> Option<u64> {
        (self.large_file_threshold_mb > 0).then(|| self.large_file_threshold_mb * MB)
    }
}

/// Control socket location: the user's runtime directory when there is one.
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("fmon.sock")
}
