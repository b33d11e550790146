//! Block inventory and metadata management
//!
//! `BlockManager` wraps the block store with an in-memory inventory: one
//! [`BlockMetadata`] record per block, created on first write, refreshed on
//! every write, and removed on delete. At startup the blocks directory is
//! scanned so the inventory reflects the files that survived a restart.
//!
//! One mutex protects the inventory for the duration of each public
//! operation, so the public API is serializable per call.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;

use super::types::{content_digest, current_timestamp, BlockMetadata};
use crate::cache::{CacheStats, PolicyKind};
use crate::constants::{parse_block_file_name, BLOCK_SIZE};
use crate::storage::{AccessStats, BlockStore, StorageError};

/// Metadata management errors
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Block not found: {0}")]
    NotFound(u64),

    #[error("Data length {} exceeds block size {}", .0, BLOCK_SIZE)]
    DataTooLarge(usize),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Block inventory over a write-back block store
pub struct BlockManager {
    blocks: Mutex<HashMap<u64, BlockMetadata>>,
    store: BlockStore,
}

impl BlockManager {
    /// Create a manager over `blocks_dir` and load the existing inventory
    pub fn new<P: AsRef<Path>>(
        blocks_dir: P,
        cache_enabled: bool,
        cache_capacity: u64,
        policy: PolicyKind,
    ) -> MetadataResult<Self> {
        let blocks_dir = blocks_dir.as_ref().to_path_buf();
        let store = BlockStore::new(&blocks_dir, cache_enabled, cache_capacity, policy)?;

        let manager = Self {
            blocks: Mutex::new(HashMap::new()),
            store,
        };
        manager.load_existing_blocks(&blocks_dir);
        Ok(manager)
    }

    /// Scan the blocks directory and rebuild the inventory
    ///
    /// Creation times are not recovered from the file system: records are
    /// stamped "now" and digests recomputed from current content. Blocks
    /// that fail to load are logged and skipped.
    fn load_existing_blocks(&self, blocks_dir: &Path) {
        let entries = match std::fs::read_dir(blocks_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(dir = %blocks_dir.display(), error = %e, "failed to scan blocks directory");
                return;
            }
        };

        let mut blocks = self.blocks.lock();
        let mut loaded = 0u64;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(block_id) = name.to_str().and_then(parse_block_file_name) else {
                continue;
            };

            match self.store.read_block_from_disk(block_id) {
                Ok(data) => {
                    let meta = BlockMetadata::new(
                        block_id,
                        data.len() as u64,
                        current_timestamp(),
                        content_digest(&data),
                    );
                    tracing::debug!(block_id, size = meta.size, "loaded block");
                    blocks.insert(block_id, meta);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(block_id, error = %e, "failed to load block, skipping");
                }
            }
        }

        if loaded > 0 {
            tracing::info!(loaded, "recovered block inventory from disk");
        }
    }

    /// Write `data` at `offset` into the block, updating its metadata
    ///
    /// The digest covers the written slice only, not the merged block
    /// image.
    pub fn write_block(
        &self,
        block_id: u64,
        data: &[u8],
        offset: u64,
        sync: bool,
    ) -> MetadataResult<()> {
        if data.len() > BLOCK_SIZE {
            tracing::warn!(
                block_id,
                length = data.len(),
                "rejecting write larger than a block"
            );
            return Err(MetadataError::DataTooLarge(data.len()));
        }

        let mut blocks = self.blocks.lock();
        self.store.write_block(block_id, offset, data, sync)?;

        let new_size = blocks
            .get(&block_id)
            .map_or(0, |m| m.size)
            .max(offset + data.len() as u64);
        let meta = BlockMetadata::new(
            block_id,
            new_size,
            current_timestamp(),
            content_digest(data),
        );
        tracing::debug!(
            block_id,
            size = meta.size,
            digest = %&meta.content_digest[..8],
            "wrote block"
        );
        blocks.insert(block_id, meta);
        Ok(())
    }

    /// Read up to `length` bytes at `offset`, bumping the access counter
    pub fn read_block(&self, block_id: u64, offset: u64, length: u64) -> MetadataResult<Vec<u8>> {
        let mut blocks = self.blocks.lock();
        let meta = blocks
            .get_mut(&block_id)
            .ok_or(MetadataError::NotFound(block_id))?;
        meta.access_count += 1;

        let data = self.store.read_block(block_id, offset, length)?;
        tracing::debug!(block_id, offset, length, bytes = data.len(), "read block");
        Ok(data)
    }

    /// Delete the block and its metadata
    pub fn delete_block(&self, block_id: u64) -> MetadataResult<()> {
        let mut blocks = self.blocks.lock();
        if !blocks.contains_key(&block_id) {
            return Err(MetadataError::NotFound(block_id));
        }

        self.store.delete_block(block_id)?;
        blocks.remove(&block_id);
        tracing::debug!(block_id, "deleted block");
        Ok(())
    }

    /// Whether the block is in the inventory
    ///
    /// Answers from metadata, which can lag disk presence if recovery
    /// skipped a block; the disk-backed check lives on the block store.
    pub fn block_exists(&self, block_id: u64) -> bool {
        self.blocks.lock().contains_key(&block_id)
    }

    pub fn get_block_metadata(&self, block_id: u64) -> Option<BlockMetadata> {
        self.blocks.lock().get(&block_id).cloned()
    }

    /// Every block id currently known, for heartbeat inventory reports
    pub fn list_blocks(&self) -> Vec<u64> {
        self.blocks.lock().keys().copied().collect()
    }

    /// Sum of recorded block sizes in bytes
    pub fn total_storage_used(&self) -> u64 {
        self.blocks.lock().values().map(|m| m.size).sum()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.lock().len()
    }

    // Diagnostics and background-flusher hooks; these bypass the metadata
    // lock since they only touch the cache.

    pub fn dirty_page_count(&self) -> u64 {
        self.store.dirty_page_count()
    }

    pub fn cache_capacity(&self) -> u64 {
        self.store.cache_capacity()
    }

    pub fn cache_enabled(&self) -> bool {
        self.store.cache_enabled()
    }

    pub fn flush_dirty_pages(&self) -> u64 {
        self.store.flush_dirty()
    }

    pub fn flush_all(&self) {
        self.store.flush_all()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.store.cache_stats()
    }

    pub fn disk_stats(&self) -> AccessStats {
        self.store.disk_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::types::content_digest;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> BlockManager {
        BlockManager::new(dir.path(), true, 16, PolicyKind::Lru).unwrap()
    }

    #[test]
    fn test_write_creates_metadata() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);

        mgr.write_block(1, b"hello", 0, false).unwrap();

        let meta = mgr.get_block_metadata(1).unwrap();
        assert_eq!(meta.block_id, 1);
        assert_eq!(meta.size, 5);
        assert_eq!(meta.content_digest, content_digest(b"hello"));
        assert_eq!(meta.access_count, 0);
        assert!(mgr.block_exists(1));
    }

    #[test]
    fn test_read_bumps_access_count() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);

        mgr.write_block(1, b"hello", 0, false).unwrap();
        assert_eq!(mgr.read_block(1, 0, 0).unwrap(), b"hello");
        assert_eq!(mgr.read_block(1, 0, 2).unwrap(), b"he");
        assert_eq!(mgr.get_block_metadata(1).unwrap().access_count, 2);
    }

    #[test]
    fn test_read_unknown_block_fails() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        assert!(matches!(
            mgr.read_block(9, 0, 0),
            Err(MetadataError::NotFound(9))
        ));
    }

    #[test]
    fn test_partial_write_grows_size_and_digests_slice() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);

        mgr.write_block(1, b"AAAAAAAAAA", 0, false).unwrap();
        mgr.write_block(1, b"BBB", 3, false).unwrap();

        let meta = mgr.get_block_metadata(1).unwrap();
        // Size reflects the merged image; digest covers the written slice.
        assert_eq!(meta.size, 10);
        assert_eq!(meta.content_digest, content_digest(b"BBB"));

        mgr.write_block(1, b"DDD", 12, false).unwrap();
        assert_eq!(mgr.get_block_metadata(1).unwrap().size, 15);
        assert_eq!(mgr.read_block(1, 0, 0).unwrap().len(), 15);
    }

    #[test]
    fn test_oversize_write_rejected() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);

        let data = vec![0u8; BLOCK_SIZE + 1];
        assert!(matches!(
            mgr.write_block(1, &data, 0, false),
            Err(MetadataError::DataTooLarge(_))
        ));
        assert!(!mgr.block_exists(1));

        let data = vec![0u8; 10];
        assert!(matches!(
            mgr.write_block(1, &data, (BLOCK_SIZE - 5) as u64, false),
            Err(MetadataError::Storage(StorageError::ExceedsBlockSize { .. }))
        ));
    }

    #[test]
    fn test_delete_removes_metadata() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);

        mgr.write_block(1, b"x", 0, false).unwrap();
        mgr.delete_block(1).unwrap();
        assert!(!mgr.block_exists(1));
        assert!(mgr.get_block_metadata(1).is_none());
        assert!(matches!(
            mgr.delete_block(1),
            Err(MetadataError::NotFound(1))
        ));
    }

    #[test]
    fn test_inventory_and_storage_used() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);

        mgr.write_block(1, b"aaaa", 0, false).unwrap();
        mgr.write_block(2, b"bb", 0, false).unwrap();
        mgr.write_block(3, b"c", 0, false).unwrap();

        let mut ids = mgr.list_blocks();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(mgr.total_storage_used(), 7);
        assert_eq!(mgr.block_count(), 3);
    }

    #[test]
    fn test_startup_scan_recovers_blocks() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("blk_7.img"), b"xyz").unwrap();
        std::fs::write(dir.path().join("blk_8.img"), b"pq").unwrap();
        // Foreign files are ignored.
        std::fs::write(dir.path().join("notes.txt"), b"skip me").unwrap();
        std::fs::write(dir.path().join("blk_bad.img"), b"skip me too").unwrap();

        let mgr = manager(&dir);

        assert_eq!(mgr.block_count(), 2);
        assert_eq!(mgr.read_block(7, 0, 0).unwrap(), b"xyz");

        let meta = mgr.get_block_metadata(7).unwrap();
        assert_eq!(meta.size, 3);
        assert_eq!(meta.content_digest, content_digest(b"xyz"));
        assert_eq!(mgr.total_storage_used(), 5);
    }

    #[test]
    fn test_restart_preserves_flushed_writes() {
        let dir = TempDir::new().unwrap();
        {
            let mgr = manager(&dir);
            mgr.write_block(1, b"v1", 0, false).unwrap();
            mgr.write_block(1, b"v2", 0, false).unwrap();
            // Manager drop flushes the dirty page through the store.
        }

        let mgr = manager(&dir);
        assert_eq!(mgr.read_block(1, 0, 0).unwrap(), b"v2");
        assert_eq!(mgr.get_block_metadata(1).unwrap().size, 2);
    }
}
