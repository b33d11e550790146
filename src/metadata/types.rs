//! Block metadata types

use chrono::Utc;
use sha2::{Digest, Sha256};

/// Per-block bookkeeping held by the block manager
///
/// Metadata is ephemeral: after a restart it is rebuilt from the block
/// files, so timestamps are re-stamped, digests recomputed from current
/// content, and access counts reset. The master holds the authoritative
/// placement state.
#[derive(Debug, Clone)]
pub struct BlockMetadata {
    pub block_id: u64,

    /// Current logical size in bytes (may be < `BLOCK_SIZE`)
    pub size: u64,

    /// ISO-8601 UTC creation timestamp with millisecond precision
    pub created_at: String,

    /// Lowercase hex SHA-256 of the last written slice
    ///
    /// For writes at a non-zero offset this covers the written bytes, not
    /// the merged block image, so it is a diagnostic and is not verified
    /// on read.
    pub content_digest: String,

    /// Number of reads since this record was created
    pub access_count: u64,
}

impl BlockMetadata {
    pub fn new(block_id: u64, size: u64, created_at: String, content_digest: String) -> Self {
        Self {
            block_id,
            size,
            created_at,
            content_digest,
            access_count: 0,
        }
    }
}

/// Current time as ISO-8601 UTC with millisecond precision
pub fn current_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Lowercase hex SHA-256 digest of `data`
pub fn content_digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_matches_known_vector() {
        // SHA256("xyz")
        assert_eq!(
            content_digest(b"xyz"),
            "3608bca1e44ea6c4d268eb6db02260269892c0b42b86bbf1e77a6fa16c3c9282"
        );
        // SHA256("")
        assert_eq!(
            content_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_timestamp_shape() {
        let ts = current_timestamp();
        // e.g. 2024-06-01T12:34:56.789Z
        assert_eq!(ts.len(), 24);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
        assert_eq!(&ts[19..20], ".");
    }

    #[test]
    fn test_metadata_starts_unaccessed() {
        let meta = BlockMetadata::new(7, 3, current_timestamp(), content_digest(b"xyz"));
        assert_eq!(meta.block_id, 7);
        assert_eq!(meta.size, 3);
        assert_eq!(meta.access_count, 0);
    }
}
