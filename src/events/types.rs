//! Event type definitions for progress reporting.

use crate::core::types::RunSummary;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted during a fingerprinting run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Directory traversal events
    Discover(DiscoverEvent),
    /// Per-file events from the read, hash and write stages
    File(FileEvent),
    /// Run-level events
    Pipeline(PipelineEvent),
}

/// Events during directory traversal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DiscoverEvent {
    /// Traversal has started
    Started { root: PathBuf },
    /// A directory was entered
    Progress(DiscoverProgress),
    /// Traversal finished; every file is now known
    Completed { total_files: usize },
}

/// Progress information during traversal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverProgress {
    /// Number of directories entered so far
    pub directories_scanned: usize,
    /// Number of regular files found so far
    pub files_found: usize,
    /// Directory being entered
    pub current_path: PathBuf,
}

/// Events for individual files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FileEvent {
    /// The file could not be read or hashed and was left out of the report
    Skipped { path: PathBuf, message: String },
    /// A record for the file reached the report
    Written(WriteProgress),
}

/// Progress information from the writer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteProgress {
    /// Records written so far
    pub completed: usize,
    /// Files handed to the run
    pub total: usize,
    /// File whose record was just written
    pub current_path: PathBuf,
}

/// Run-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Run has started
    Started { strategy: String },
    /// Moving to a new phase
    PhaseChanged { phase: RunPhase },
    /// Run drained and the report is flushed
    Completed { summary: RunSummary },
    /// Run was aborted
    Aborted,
    /// Run hit a fatal error
    Error { message: String },
}

/// Phases of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Discovering,
    Fingerprinting,
    Finished,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Discovering => write!(f, "Discovering"),
            RunPhase::Fingerprinting => write!(f, "Fingerprinting"),
            RunPhase::Finished => write!(f, "Finished"),
        }
    }
}
