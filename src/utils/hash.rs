//! Content hashing shared by cache keys and artifact integrity checks.
//!
//! All digests are SHA-256 rendered as lowercase hexadecimal.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Incremental SHA-256 hasher over one or more byte streams.
///
/// Each part fed through [`ContentHasher::update_part`] is length-prefixed,
/// so `["ab", "c"]` and `["a", "bc"]` produce different digests.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    /// Create an empty hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes without framing.
    pub fn update(&mut self, bytes: &[u8]) -> &mut Self {
        self.inner.update(bytes);
        self
    }

    /// Feed one framed part: its length as a little-endian u64, then its bytes.
    pub fn update_part(&mut self, bytes: &[u8]) -> &mut Self {
        self.inner.update((bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
        self
    }

    /// Consume the hasher and return the hex digest.
    pub fn finalize(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// Hex SHA-256 of a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Hex SHA-256 over several framed parts.
pub fn hash_parts<T: AsRef<[u8]>>(parts: &[T]) -> String {
    let mut hasher = ContentHasher::new();
    for part in parts {
        hasher.update_part(part.as_ref());
    }
    hasher.finalize()
}

/// Hex SHA-256 of a file's content.
pub async fn hash_file(path: &Path) -> Result<String> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("Cannot read file for hashing: {}", path.display()))?;
    Ok(hash_bytes(&content))
}

/// Integrity string in the `sha256:<hex>` format.
pub fn sha256_integrity(bytes: &[u8]) -> String {
    format!("sha256:{}", hash_bytes(bytes))
}
