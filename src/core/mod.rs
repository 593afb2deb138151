//! # Core Module
//!
//! The front-end agnostic fingerprinting engine.
//!
//! ## Modules
//! - `queue` - Blocking, closable FIFO shared between threads
//! - `pool` - Fixed-size worker pool over a queue
//! - `stage` - One pipeline stage: input queue, workers, transform, output
//! - `pipeline` - Discover → Read → Hash → Write
//! - `strategy` - Sequential, threaded, pool and pipeline runs
//! - `scanner` - Discovers regular files under a root
//! - `hasher` - Content fingerprint functions
//! - `reporter` - Writes records to the report

pub mod hasher;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod reporter;
pub mod scanner;
pub mod stage;
pub mod strategy;
pub mod types;

// Re-export commonly used types
pub use hasher::{DigestValue, FingerprintAlgorithm, Fingerprinter};
pub use pipeline::{AbortHandle, Pipeline, PipelineConfig};
pub use queue::WorkQueue;
pub use reporter::{ReportFormat, ResultSink};
pub use strategy::{fingerprint_tree, RunOptions, Strategy};
pub use types::{FileTask, ResultRecord, RunSummary};
