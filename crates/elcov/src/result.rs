//! Result and error types for elcov.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for elcov operations
pub type ElcovResult<T> = Result<T, ElcovError>;

/// Errors that can occur in elcov
#[derive(Debug, Error)]
pub enum ElcovError {
    /// Source root passed to the instrumenter does not exist
    #[error("Source directory not found: {}", path.display())]
    SourceNotFound {
        /// Missing directory
        path: PathBuf,
    },

    /// The instrumentation transform rejected a file
    #[error("Failed to instrument {}: {message}", path.display())]
    Instrument {
        /// File being instrumented
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Archive packaging or reading failed
    #[error("Archive error: {message}")]
    Archive {
        /// Error message
        message: String,
    },

    /// Requested report format is not supported
    #[error("Unknown report format: {format}")]
    UnknownReportFormat {
        /// Format identifier as given
        format: String,
    },

    /// Snapshot file name does not follow `<pid>-<kind>-<timestamp>.json`
    #[error("Invalid snapshot file name: {name}")]
    InvalidSnapshotName {
        /// Offending file name
        name: String,
    },

    /// Host runtime call failed (script execution, timeout)
    #[error("Host error: {message}")]
    Host {
        /// Error message
        message: String,
    },

    /// I/O error tied to a specific path
    #[error("I/O error at {}: {source}", path.display())]
    PathIo {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Invalid glob pattern
    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Glob iteration error
    #[error("Glob error: {0}")]
    Glob(#[from] glob::GlobError),

    /// Directory walk error
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ElcovError {
    /// Create an instrumentation error for `path`
    #[must_use]
    pub fn instrument(path: &Path, message: impl Into<String>) -> Self {
        Self::Instrument {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Create an archive error
    #[must_use]
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }

    /// Create a host runtime error
    #[must_use]
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host {
            message: message.into(),
        }
    }

    /// Attach a path to an I/O error
    #[must_use]
    pub fn path_io(path: &Path, source: std::io::Error) -> Self {
        Self::PathIo {
            path: path.to_path_buf(),
            source,
        }
    }
}
