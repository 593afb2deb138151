//! Work items that flow between pipeline stages, and the run summary.

use super::hasher::DigestValue;
use serde::{Deserialize, Serialize, Serializer};
use std::path::{Path, PathBuf};

/// A regular file found by the scanner. Input to the read stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileTask {
    pub path: PathBuf,
}

impl FileTask {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl From<PathBuf> for FileTask {
    fn from(path: PathBuf) -> Self {
        Self { path }
    }
}

/// File contents read from disk. Input to the hash stage.
///
/// Only created on a successful read; the bytes move through the pipeline
/// without being copied.
#[derive(Debug)]
pub struct ContentTask {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// One line of the report
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Serialized lossily, as the text report does with `display()`, so a
    /// non-UTF-8 name never fails a record.
    #[serde(serialize_with = "serialize_path_lossy")]
    pub path: PathBuf,
    pub digest: DigestValue,
}

fn serialize_path_lossy<P, S>(path: &P, serializer: S) -> Result<S::Ok, S::Error>
where
    P: AsRef<Path>,
    S: Serializer,
{
    serializer.serialize_str(&path.as_ref().to_string_lossy())
}

/// Counts returned to the caller once a run has fully drained.
///
/// `discovered == processed + skipped` holds for every completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Files handed to the first stage
    pub discovered: usize,
    /// Records written to the report
    pub processed: usize,
    /// Files dropped because they could not be read or hashed
    pub skipped: usize,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl RunSummary {
    /// Whether every discovered file is accounted for
    pub fn is_balanced(&self) -> bool {
        self.discovered == self.processed + self.skipped
    }
}
