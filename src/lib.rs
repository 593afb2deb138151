//! # File Fingerprint
//!
//! Walks a directory tree and writes one content fingerprint per regular
//! file to a report.
//!
//! ## Architecture
//! The library is split into a core engine and presentation layers:
//! - `core` - Queues, worker pool, pipeline stages and execution strategies
//! - `events` - Event-driven progress reporting
//! - `error` - Error types per pipeline phase
//! - `cli` - Command-line interface (binary only)

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{FingerprintError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point. `RUST_LOG` wins
/// over `default_directive` when set. Calling it twice is a no-op.
pub fn init_tracing(default_directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
