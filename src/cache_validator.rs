use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Cached JSON payload stored with its SHA-256 checksum.
///
/// Entries whose checksum no longer matches are dropped on read and the
/// caller refetches from the assistant service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCacheEntry {
    /// Serialized payload.
    pub data: String,
    /// SHA-256 of `data`, hex encoded.
    pub checksum: String,
}

impl ValidatedCacheEntry {
    pub fn new(data: String) -> Self {
        let checksum = compute_checksum(&data);
        Self { data, checksum }
    }

    /// Serializes `value` into a new entry.
    pub fn wrap<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_string(value)?))
    }

    pub fn is_valid(&self) -> bool {
        compute_checksum(&self.data) == self.checksum
    }

    /// Returns the payload if the checksum matches and it still parses as `T`.
    pub fn unwrap_validated<T: DeserializeOwned>(&self) -> Option<T> {
        if !self.is_valid() {
            tracing::warn!(
                "Cache validation failed: checksum mismatch. Expected: {}, Data length: {}",
                self.checksum,
                self.data.len()
            );
            return None;
        }
        serde_json::from_str(&self.data).ok()
    }
}

fn compute_checksum(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cache key for a request: hashed so tokens and filters never sit in memory verbatim.
pub fn cache_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
