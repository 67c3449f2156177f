//! Error types for fixture loading and watching.

use std::path::PathBuf;
use thiserror::Error;

/// Failures that can occur while loading a fixture document.
///
/// None of these ever reach an HTTP client. The resolution engine treats
/// every variant as "not found" and walks its fallback chain instead.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// The file does not exist under the fixture root.
    #[error("fixture not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but is not valid JSON.
    #[error("malformed JSON in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The canonical path lies outside the fixture root.
    ///
    /// Deliberately carries no path so the attempted location cannot leak.
    #[error("fixture path escapes the fixture root")]
    OutsideRoot,

    /// Any other I/O failure while reading the file.
    #[error("failed to read fixture {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FixtureError {
    /// Short machine-readable label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            FixtureError::NotFound(_) => "not_found",
            FixtureError::Parse { .. } => "parse_error",
            FixtureError::OutsideRoot => "security_violation",
            FixtureError::Io { .. } => "io_error",
        }
    }
}

/// Failures starting the filesystem watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("filesystem watcher error: {0}")]
    Notify(#[from] notify::Error),
}
