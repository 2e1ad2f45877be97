use std::ffi::OsString;
use std::path::Path;

const TRANSIENT_SUFFIXES: [&str; 3] = [".tmp", ".swp", ".swx"];

/// Extension allow-list. Empty allows everything.
#[derive(Debug, Clone, Default)]
pub struct ExtensionFilter {
    allowed: Vec<String>,
}

impl ExtensionFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_string())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { allowed }
    }

    /// Compares the text after the last `.` of `name` against the list.
    pub fn allows(&self, name: &str) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        match name.rsplit_once('.') {
            Some((_, ext)) => self.allowed.iter().any(|allowed| allowed == ext),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

/// Names of the files the monitor itself writes, so its own activity is
/// never reported.
#[derive(Debug, Clone, Default)]
pub struct ArtifactFilter {
    log_name: Option<OsString>,
    exact: Vec<OsString>,
}

impl ArtifactFilter {
    pub fn new(log_path: &Path, others: &[&Path]) -> Self {
        Self {
            log_name: log_path.file_name().map(|n| n.to_os_string()),
            exact: others
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
                .collect(),
        }
    }

    /// True for the active log, its rotated generations and the other
    /// registered artifacts.
    pub fn is_artifact(&self, name: &str) -> bool {
        if self.exact.iter().any(|n| n == name) {
            return true;
        }
        match self.log_name.as_ref().and_then(|n| n.to_str()) {
            Some(log) => {
                name == log
                    || name
                        .strip_prefix(log)
                        .is_some_and(|rest| rest.starts_with('.'))
            }
            None => false,
        }
    }
}

/// Editor swap files and other short-lived scratch files.
pub fn is_transient(name: &str) -> bool {
    TRANSIENT_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}
