use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FmonError {
    #[error("invalid root path: {0}")]
    InvalidRoot(PathBuf),

    #[error("watch registry is full ({capacity} entries)")]
    RegistryFull { capacity: usize },

    #[error("failed to add watch for {path}: {source}")]
    WatchFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("notification read failed: {0}")]
    NotificationRead(#[source] std::io::Error),

    #[error("control channel error: {0}")]
    Control(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type FmonResult<T> = Result<T, FmonError>;
