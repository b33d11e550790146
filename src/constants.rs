//! Global constants for BlockFS
//!
//! This module centralizes commonly used constants across the codebase
//! to improve maintainability and reduce duplication.

/// Block size in bytes: 64 KiB
///
/// This is the unit of replication and caching. It must match the value
/// the master uses when slicing file writes into blocks; a data node with
/// a different `BLOCK_SIZE` would reject writes the master considers valid.
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Prefix of block files under the blocks directory
pub const BLOCK_FILE_PREFIX: &str = "blk_";

/// Extension of block files under the blocks directory
pub const BLOCK_FILE_EXT: &str = ".img";

/// Background flusher check interval in milliseconds
///
/// The flusher samples the dirty page count at this period. It also bounds
/// how long the flusher takes to observe a shutdown request.
pub const FLUSHER_INTERVAL_MS: u64 = 100;

/// Dirty page threshold as a fraction of cache capacity
///
/// When the number of dirty pages reaches `ceil(capacity * ratio)`, the
/// background flusher writes all dirty pages back to disk. This bounds the
/// worst-case shutdown flush and spreads write-back over time.
pub const DIRTY_PAGE_THRESHOLD_RATIO: f64 = 0.4;

/// Interval between periodic statistics reports from the daemon, in seconds
pub const STATS_REPORT_INTERVAL_SECS: u64 = 30;

/// Build the file name for a block id (`blk_<id>.img`)
pub fn block_file_name(block_id: u64) -> String {
    format!("{}{}{}", BLOCK_FILE_PREFIX, block_id, BLOCK_FILE_EXT)
}

/// Parse a block id out of a `blk_<id>.img` file name
///
/// Returns `None` for files that do not follow the block naming scheme.
pub fn parse_block_file_name(name: &str) -> Option<u64> {
    let stem = name
        .strip_prefix(BLOCK_FILE_PREFIX)?
        .strip_suffix(BLOCK_FILE_EXT)?;
    stem.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_file_name_round_trip() {
        assert_eq!(block_file_name(42), "blk_42.img");
        assert_eq!(parse_block_file_name("blk_42.img"), Some(42));
        assert_eq!(parse_block_file_name("blk_0.img"), Some(0));
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        assert_eq!(parse_block_file_name("blk_.img"), None);
        assert_eq!(parse_block_file_name("blk_12img"), None);
        assert_eq!(parse_block_file_name("block_12.img"), None);
        assert_eq!(parse_block_file_name("blk_abc.img"), None);
        assert_eq!(parse_block_file_name("blk_-3.img"), None);
    }
}
