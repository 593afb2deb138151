//! # Error Module
//!
//! Error types for the fingerprinting engine.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths and the underlying I/O error
//! - **Soft vs fatal** - read and hash failures become skips, discovery and
//!   write failures end the run

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("Hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("Report error: {0}")]
    Write(#[from] WriteError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised while walking the root directory. Always fatal.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Directory not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid exclude pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// A single file could not be opened or read. Counted as a skip.
#[derive(Error, Debug)]
#[error("Failed to read {path}: {source}")]
pub struct ReadError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// The fingerprint function rejected its input. Counted as a skip.
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Fingerprint computation failed for {path}: {reason}")]
    ComputationFailed { path: PathBuf, reason: String },
}

/// The report sink could not persist a record. Fatal for the run.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to create report file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write record for {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to flush report: {source}")]
    Flush {
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode record for {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("Report sink panicked: {reason}")]
    Panicked { reason: String },
}

/// Orchestration-level failures
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Run was aborted before all files were processed")]
    Aborted,

    #[error("Worker in stage '{stage}' panicked")]
    WorkerPanicked { stage: String },

    #[error("Failed to spawn worker thread for '{stage}': {source}")]
    Spawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by the worker pool itself (not by tasks)
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Worker pool is shut down, task rejected")]
    ShutDown,

    #[error("Failed to spawn pool worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A failure raised by one task running on the worker pool.
///
/// Delivered on the pool's error channel; never stops other workers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TaskError {
    pub path: Option<PathBuf>,
    pub message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }

    pub fn for_path(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            message: message.into(),
        }
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, FingerprintError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_error_includes_path() {
        let error = DiscoveryError::RootNotFound {
            path: PathBuf::from("/data/missing"),
        };
        assert!(error.to_string().contains("/data/missing"));
    }

    #[test]
    fn read_error_includes_path_and_cause() {
        let error = ReadError {
            path: PathBuf::from("/data/c.bin"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let message = error.to_string();
        assert!(message.contains("/data/c.bin"));
        assert!(message.contains("denied"));
    }

    #[test]
    fn write_error_converts_to_top_level() {
        let error: FingerprintError = WriteError::Flush {
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        }
        .into();
        assert!(matches!(error, FingerprintError::Write(_)));
        assert!(error.to_string().contains("disk full"));
    }

    #[test]
    fn task_error_keeps_path() {
        let error = TaskError::for_path("/data/a.txt", "boom");
        assert_eq!(error.path, Some(PathBuf::from("/data/a.txt")));
        assert_eq!(error.to_string(), "boom");
    }
}
