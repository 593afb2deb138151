//! Directory walking implementation using walkdir.

use super::{filter::PathFilter, FileScanner, ScanResult};
use crate::core::types::FileTask;
use crate::error::DiscoveryError;
use crate::events::{DiscoverEvent, DiscoverProgress, Event, EventSender};
use std::io;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Configuration for the directory scanner
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Whether to include hidden files and directories
    pub include_hidden: bool,
    /// Maximum directory depth (None = unlimited)
    pub max_depth: Option<usize>,
    /// Regex patterns; matching paths are not reported or descended into
    pub exclude: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            include_hidden: true,
            max_depth: None,
            exclude: Vec::new(),
        }
    }
}

/// Scanner implementation using the walkdir crate
#[derive(Debug, Clone)]
pub struct WalkDirScanner {
    config: ScanConfig,
    filter: PathFilter,
}

impl WalkDirScanner {
    /// Create a scanner. Fails if an exclude pattern is not a valid regex.
    pub fn new(config: ScanConfig) -> Result<Self, DiscoveryError> {
        let filter = PathFilter::new()
            .with_hidden(config.include_hidden)
            .with_excludes(&config.exclude)?;

        Ok(Self { config, filter })
    }
}

impl FileScanner for WalkDirScanner {
    fn scan_with_events(
        &self,
        root: &Path,
        events: &EventSender,
    ) -> Result<ScanResult, DiscoveryError> {
        if !root.exists() {
            return Err(DiscoveryError::RootNotFound {
                path: root.to_path_buf(),
            });
        }
        if !root.is_dir() {
            return Err(DiscoveryError::NotADirectory {
                path: root.to_path_buf(),
            });
        }

        events.send(Event::Discover(DiscoverEvent::Started {
            root: root.to_path_buf(),
        }));

        let mut walker = WalkDir::new(root).follow_links(self.config.follow_symlinks);
        if let Some(depth) = self.config.max_depth {
            walker = walker.max_depth(depth);
        }

        let mut result = ScanResult::default();
        let entries = walker
            .into_iter()
            .filter_entry(|entry| self.filter.should_include(entry.path(), entry.depth() == 0));

        for entry in entries {
            let entry = entry.map_err(|e| walk_error(root, e))?;
            let file_type = entry.file_type();

            if file_type.is_dir() {
                result.directories_scanned += 1;
                events.send(Event::Discover(DiscoverEvent::Progress(DiscoverProgress {
                    directories_scanned: result.directories_scanned,
                    files_found: result.files.len(),
                    current_path: entry.path().to_path_buf(),
                })));
                continue;
            }

            // Sockets, fifos and devices are not fingerprinted. An unfollowed
            // symlink counts when it resolves to a regular file; links to
            // directories are never descended.
            let regular = file_type.is_file()
                || (file_type.is_symlink() && entry.path().is_file());
            if regular {
                result.files.push(FileTask::from(entry.into_path()));
            }
        }

        debug!(
            root = %root.display(),
            files = result.files.len(),
            directories = result.directories_scanned,
            "Scan complete"
        );
        events.send(Event::Discover(DiscoverEvent::Completed {
            total_files: result.files.len(),
        }));

        Ok(result)
    }
}

fn walk_error(root: &Path, error: walkdir::Error) -> DiscoveryError {
    let path = error
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    let message = error.to_string();
    let source = error
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, message));
    DiscoveryError::Walk { path, source }
}
