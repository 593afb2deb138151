//! # Pipeline Module
//!
//! Orchestrates a fingerprinting run as four stages.
//!
//! ## Pipeline Stages
//! 1. **Discover** - bulk push of every file, then close the read input
//! 2. **Read** - load file bytes (unreadable files are skipped)
//! 3. **Hash** - fingerprint the bytes
//! 4. **Write** - single writer appends records to the report
//!
//! ## Shutdown
//! Each stage closes its output only after all of its workers have seen
//! their input closed and empty, so the run ends exactly when the writer
//! has drained the last record. [`AbortHandle`] closes every queue at once.

mod abort;
mod executor;

pub use abort::{AbortHandle, WatchGuard};
pub use executor::{Pipeline, PipelineBuilder, PipelineConfig, DEFAULT_QUEUE_CAPACITY};
pub(crate) use executor::{report_skip, ProgressSink};
