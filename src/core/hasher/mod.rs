//! # Hasher Module
//!
//! Computes content fingerprints for file bytes.
//!
//! ## Supported Algorithms
//! - **xxh3-64** - Default. Fast, non-cryptographic
//! - **xxh3-128** - Wider digest, same speed class
//!
//! The engine only relies on determinism: identical bytes always give the
//! same [`DigestValue`]. Collision resistance is not assumed.
//!
//! ## Example
//! ```rust,ignore
//! use file_fingerprint::core::hasher::{Fingerprinter, Xxh3Fingerprinter};
//!
//! let digest = Xxh3Fingerprinter.digest(b"hello")?;
//! println!("{}", digest.to_hex());
//! ```

use crate::error::HashError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use xxhash_rust::xxh3::{xxh3_128, xxh3_64};

/// A fingerprint value, stored as big-endian bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DigestValue(Vec<u8>);

impl DigestValue {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hexadecimal rendering used in reports
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Parse the hexadecimal form produced by [`to_hex`](Self::to_hex)
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() % 2 != 0 {
            return None;
        }
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
            .collect::<Option<Vec<u8>>>()
            .map(Self)
    }
}

impl From<u64> for DigestValue {
    fn from(value: u64) -> Self {
        Self(value.to_be_bytes().to_vec())
    }
}

impl From<u128> for DigestValue {
    fn from(value: u128) -> Self {
        Self(value.to_be_bytes().to_vec())
    }
}

impl From<DigestValue> for String {
    fn from(digest: DigestValue) -> Self {
        digest.to_hex()
    }
}

impl TryFrom<String> for DigestValue {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DigestValue::from_hex(&value).ok_or_else(|| format!("invalid hex digest: {value}"))
    }
}

impl fmt::Display for DigestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The injected fingerprint function.
///
/// Implementations must be deterministic. An `Err` is treated like an
/// unreadable file: the file is skipped and counted.
pub trait Fingerprinter: Send + Sync {
    /// Compute the digest of `bytes`
    fn digest(&self, bytes: &[u8]) -> Result<DigestValue, HashError>;

    /// Short algorithm name for logs and summaries
    fn name(&self) -> &'static str;
}

impl<F: Fingerprinter + ?Sized> Fingerprinter for Arc<F> {
    fn digest(&self, bytes: &[u8]) -> Result<DigestValue, HashError> {
        (**self).digest(bytes)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// xxh3 with a 64-bit output
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh3Fingerprinter;

impl Fingerprinter for Xxh3Fingerprinter {
    fn digest(&self, bytes: &[u8]) -> Result<DigestValue, HashError> {
        Ok(DigestValue::from(xxh3_64(bytes)))
    }

    fn name(&self) -> &'static str {
        "xxh3-64"
    }
}

/// xxh3 with a 128-bit output
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh3_128Fingerprinter;

impl Fingerprinter for Xxh3_128Fingerprinter {
    fn digest(&self, bytes: &[u8]) -> Result<DigestValue, HashError> {
        Ok(DigestValue::from(xxh3_128(bytes)))
    }

    fn name(&self) -> &'static str {
        "xxh3-128"
    }
}

/// Available fingerprint algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FingerprintAlgorithm {
    #[default]
    Xxh3,
    Xxh3_128,
}

impl FingerprintAlgorithm {
    /// Build a shareable fingerprinter for this algorithm
    pub fn build(self) -> Arc<dyn Fingerprinter> {
        match self {
            FingerprintAlgorithm::Xxh3 => Arc::new(Xxh3Fingerprinter),
            FingerprintAlgorithm::Xxh3_128 => Arc::new(Xxh3_128Fingerprinter),
        }
    }
}

impl fmt::Display for FingerprintAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FingerprintAlgorithm::Xxh3 => write!(f, "xxh3-64"),
            FingerprintAlgorithm::Xxh3_128 => write!(f, "xxh3-128"),
        }
    }
}

/// Attach the file path to a fingerprinter failure
pub(crate) fn digest_for(
    fingerprinter: &dyn Fingerprinter,
    path: &std::path::Path,
    bytes: &[u8],
) -> Result<DigestValue, HashError> {
    fingerprinter.digest(bytes).map_err(|e| match e {
        HashError::ComputationFailed { reason, .. } => HashError::ComputationFailed {
            path: PathBuf::from(path),
            reason,
        },
    })
}
