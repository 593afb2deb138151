//! # fingerprint CLI
//!
//! Command-line interface for the file fingerprinting engine.
//!
//! ## Usage
//! ```bash
//! fingerprint hash ~/data
//! fingerprint hash ~/data --strategy pool --output hashes.txt --verbose
//! ```

mod cli;

use file_fingerprint::Result;

fn main() -> Result<()> {
    cli::run()
}
