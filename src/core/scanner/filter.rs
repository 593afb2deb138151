//! Path filtering for the scanner.

use crate::error::DiscoveryError;
use regex::Regex;
use std::path::Path;

/// Decides which directory entries the scanner descends into or reports
#[derive(Debug, Clone)]
pub struct PathFilter {
    /// Exclude patterns, matched against the full path
    exclude: Vec<Regex>,
    /// Whether to include entries whose name starts with '.'
    include_hidden: bool,
}

impl PathFilter {
    /// Accept everything, hidden entries included
    pub fn new() -> Self {
        Self {
            exclude: Vec::new(),
            include_hidden: true,
        }
    }

    pub fn with_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Add exclude patterns. Fails on the first invalid pattern.
    pub fn with_excludes<I, S>(mut self, patterns: I) -> Result<Self, DiscoveryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let regex = Regex::new(pattern).map_err(|e| DiscoveryError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
            self.exclude.push(regex);
        }
        Ok(self)
    }

    /// Check whether an entry (file or directory) should be kept.
    ///
    /// `is_root` entries are always kept so a hidden root still scans.
    pub fn should_include(&self, path: &Path, is_root: bool) -> bool {
        if is_root {
            return true;
        }

        if !self.include_hidden {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    return false;
                }
            }
        }

        let text = path.to_string_lossy();
        !self.exclude.iter().any(|re| re.is_match(&text))
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new()
    }
}
