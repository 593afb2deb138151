//! # Scanner Module
//!
//! Discovers the regular files under a root directory.
//!
//! Traversal is all-or-nothing: any error while walking (missing root,
//! unreadable directory) fails the whole scan before any file is hashed.
//!
//! ## Example
//! ```rust,ignore
//! use file_fingerprint::core::scanner::{FileScanner, ScanConfig, WalkDirScanner};
//!
//! let scanner = WalkDirScanner::new(ScanConfig::default())?;
//! let result = scanner.scan(Path::new("/data"))?;
//! println!("{} files", result.files.len());
//! ```

mod filter;
mod walker;

pub use filter::PathFilter;
pub use walker::{ScanConfig, WalkDirScanner};

use crate::core::types::FileTask;
use crate::error::DiscoveryError;
use crate::events::EventSender;
use std::path::Path;

/// Result of a scan
#[derive(Debug, Default)]
pub struct ScanResult {
    /// One task per regular file, in traversal order
    pub files: Vec<FileTask>,
    /// Directories entered, including the root
    pub directories_scanned: usize,
}

/// Trait for file discovery
///
/// Implement this trait to feed the engine from somewhere other than a
/// directory walk (e.g., a fixed list in tests).
pub trait FileScanner: Send + Sync {
    /// Walk `root` and return every regular file under it
    fn scan(&self, root: &Path) -> Result<ScanResult, DiscoveryError> {
        self.scan_with_events(root, &crate::events::null_sender())
    }

    /// Walk with progress reporting via events
    fn scan_with_events(
        &self,
        root: &Path,
        events: &EventSender,
    ) -> Result<ScanResult, DiscoveryError>;
}

/// Scanner that returns a fixed list of files
#[derive(Debug, Clone, Default)]
pub struct StaticScanner {
    files: Vec<FileTask>,
}

impl StaticScanner {
    pub fn new(files: Vec<FileTask>) -> Self {
        Self { files }
    }
}

impl FileScanner for StaticScanner {
    fn scan_with_events(
        &self,
        _root: &Path,
        _events: &EventSender,
    ) -> Result<ScanResult, DiscoveryError> {
        Ok(ScanResult {
            files: self.files.clone(),
            directories_scanned: 0,
        })
    }
}
