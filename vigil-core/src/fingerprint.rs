//! Content fingerprinting.
//!
//! A fingerprint is the SHA3-256 digest of the raw image bytes and is the
//! only identity used for caching, coalescing and review lookups. Upload
//! metadata (file name, content type, upload id) never contributes to it.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::error::{ModerationError, Result};

/// Length of a hex-encoded SHA3-256 digest.
const SHA3_256_HEX_LEN: usize = 64;

/// Hash algorithm used to derive a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FingerprintAlgorithm {
    Sha3_256,
}

impl std::fmt::Display for FingerprintAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sha3_256 => write!(f, "sha3-256"),
        }
    }
}

/// Deterministic identity of an image's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentFingerprint {
    /// Lowercase hex digest
    pub hash: String,
    pub algorithm: FingerprintAlgorithm,
}

impl ContentFingerprint {
    /// Hex digest, used as the storage key.
    pub fn as_str(&self) -> &str {
        &self.hash
    }

    /// Parse a fingerprint previously rendered with [`ContentFingerprint::as_str`].
    pub fn from_hex(hex_digest: &str) -> Result<Self> {
        let normalized = hex_digest.trim().to_ascii_lowercase();
        if normalized.len() != SHA3_256_HEX_LEN || hex::decode(&normalized).is_err() {
            return Err(ModerationError::Validation(format!(
                "Invalid fingerprint: expected {SHA3_256_HEX_LEN} hex characters"
            )));
        }
        Ok(Self {
            hash: normalized,
            algorithm: FingerprintAlgorithm::Sha3_256,
        })
    }
}

impl std::fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hash)
    }
}

/// Compute the fingerprint of raw image bytes.
pub fn fingerprint(bytes: &[u8]) -> ContentFingerprint {
    let mut hasher = Sha3_256::new();
    hasher.update(bytes);
    ContentFingerprint {
        hash: hex::encode(hasher.finalize()),
        algorithm: FingerprintAlgorithm::Sha3_256,
    }
}
