//! Error type shared across the recorder workspace.
//!
//! `RecorderError` covers the failure classes the pipeline distinguishes:
//!
//! - **Local I/O and corruption failures** (`Io`, `Corrupt`, `Compression`): raised for a
//!   single location or a single file. Callers log them and carry on with siblings.
//! - **Whole-pipeline failures** (`NoUsableLocation`, `AllLocationsFailed`): propagate to
//!   the owning process, which stops the run signal.
//! - **Programmer errors** (`WriterClosed`, `FlushTaskPanicked`, `ThreadPanicked`, `Spawn`):
//!   surface to the offending task and terminate it instead of being swallowed.
//!
//! An empty queue is deliberately not represented here; `pop` reports it as `None`.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the recorder error type.
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Errors raised anywhere in the recorder.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// A configuration value is out of range or inconsistent
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Filesystem failure for one path
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path the operation was acting on
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Payload could not be compressed or decompressed
    #[error("Compression error: {0}")]
    Compression(String),

    /// A batch file does not hold a valid payload
    #[error("Corrupt data file {path}: {reason}")]
    Corrupt {
        /// Offending file
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// Every configured storage location failed preparation
    #[error("No storage location could be prepared")]
    NoUsableLocation,

    /// No selected location received its copy of a batch
    #[error("Write of {file_name} failed at all {attempted} selected locations")]
    AllLocationsFailed {
        /// Batch file name shared by the copies
        file_name: String,
        /// Number of locations that were tried
        attempted: usize,
    },

    /// A flush thread panicked
    #[error("Flush task panicked before reporting an outcome")]
    FlushTaskPanicked,

    /// The OS refused to start a worker thread
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread name
        name: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// A pipeline thread panicked
    #[error("{name} thread panicked")]
    ThreadPanicked {
        /// Thread name
        name: String,
    },

    /// `write` was called after `close`
    #[error("Buffered writer is closed")]
    WriterClosed,

    /// A collector stopped on an error
    #[error("Collector {id} failed: {reason}")]
    CollectorFailed {
        /// Collector index
        id: usize,
        /// Rendered cause
        reason: String,
    },
}

impl RecorderError {
    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure is confined to one location or one file.
    ///
    /// Local failures are logged and skipped; everything else should stop
    /// the pipeline.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Compression(_) | Self::Corrupt { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mentions_path() {
        let err = RecorderError::io(
            "/tmp/remote1/data_x.bin",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        let message = err.to_string();
        assert!(message.contains("/tmp/remote1/data_x.bin"));
        assert!(err.is_local());
    }

    #[test]
    fn test_pipeline_errors_are_not_local() {
        assert!(!RecorderError::NoUsableLocation.is_local());
        assert!(!RecorderError::WriterClosed.is_local());
        assert!(!RecorderError::FlushTaskPanicked.is_local());
        assert!(!RecorderError::ThreadPanicked {
            name: "generator".into()
        }
        .is_local());
        assert!(!RecorderError::AllLocationsFailed {
            file_name: "data_.bin".into(),
            attempted: 2,
        }
        .is_local());
    }
}
