//! Block store: write-back caching over the disk layer
//!
//! Coordinates the page cache and the disk store. Callers address byte
//! ranges inside blocks; the cache and disk only ever see whole blocks, so
//! partial access is implemented here as read-modify-write over full block
//! images. Concentrating that complexity in one place keeps the layers
//! below trivially block-addressable.
//!
//! With the cache enabled, writes to existing blocks are write-back: the
//! updated image is cached dirty and reaches disk on eviction, background
//! flush, or shutdown. Writes that create a block go through to disk first
//! so the block file exists, then cache the image clean. With the cache
//! disabled every write goes straight to disk.

use std::path::Path;
use std::sync::Arc;

use super::disk::{AccessStats, DiskStore};
use super::error::{StorageError, StorageResult};
use crate::cache::{CacheStats, PageCache, PolicyKind};
use crate::constants::BLOCK_SIZE;

/// Write-back block store
///
/// The eviction callback owns a cloned handle to the disk store; the cache
/// itself never owns the disk.
pub struct BlockStore {
    disk: Arc<DiskStore>,
    cache: Option<PageCache>,
}

impl BlockStore {
    /// Create a block store over `blocks_dir`
    ///
    /// When `cache_enabled`, a page cache with the given policy and
    /// capacity (in pages) is installed and its eviction callback persists
    /// dirty pages with an fsync. Write-back failures inside the callback
    /// are logged and the page content is lost; pinning pages on error
    /// would let dirty memory grow without bound.
    pub fn new<P: AsRef<Path>>(
        blocks_dir: P,
        cache_enabled: bool,
        cache_capacity: u64,
        policy: PolicyKind,
    ) -> StorageResult<Self> {
        let disk = Arc::new(DiskStore::new(blocks_dir)?);

        let cache = if cache_enabled {
            let cache = PageCache::new(policy, cache_capacity);
            let disk_handle = Arc::clone(&disk);
            cache.set_eviction_callback(Arc::new(move |block_id, data: &[u8]| {
                if let Err(e) = disk_handle.write_block(block_id, data, true) {
                    tracing::error!(
                        block_id,
                        error = %e,
                        "eviction write-back failed; evicted page content is lost"
                    );
                }
            }));
            Some(cache)
        } else {
            tracing::info!("page cache disabled; operating in disk-only mode");
            None
        };

        Ok(Self { disk, cache })
    }

    /// Write `data` into the block at `offset`
    ///
    /// The full block image is assembled first (cached copy, else disk
    /// content, else empty), zero-extended to cover the write, and spliced.
    /// The `sync` flag only applies where the write reaches disk
    /// immediately; in the write-back path durability is deferred to
    /// eviction or flush.
    pub fn write_block(
        &self,
        block_id: u64,
        offset: u64,
        data: &[u8],
        sync: bool,
    ) -> StorageResult<()> {
        if offset.saturating_add(data.len() as u64) > BLOCK_SIZE as u64 {
            return Err(StorageError::ExceedsBlockSize {
                offset,
                length: data.len(),
            });
        }
        let offset = offset as usize;

        // Assemble the current full-block image.
        let (mut image, existed) = self.load_image(block_id)?;

        if image.len() < offset + data.len() {
            image.resize(offset + data.len(), 0);
        }
        image[offset..offset + data.len()].copy_from_slice(data);

        match &self.cache {
            None => {
                // Disk-only mode. Durability comes from the replicated
                // write above this node, not from a per-op fsync.
                self.disk.write_block(block_id, &image, false)
            }
            Some(cache) if existed => {
                // Write-back: defer the disk write to eviction or flush.
                tracing::trace!(block_id, bytes = data.len(), "cached dirty page");
                cache.put(block_id, image, true);
                Ok(())
            }
            Some(cache) => {
                // First write for this block: materialize the file, then
                // cache the image clean.
                self.disk.write_block(block_id, &image, sync)?;
                cache.put(block_id, image, false);
                Ok(())
            }
        }
    }

    /// Read up to `length` bytes from the block at `offset`
    ///
    /// `length == 0` reads to the end of the block. Reading at or past the
    /// end of the stored content yields empty data.
    pub fn read_block(&self, block_id: u64, offset: u64, length: u64) -> StorageResult<Vec<u8>> {
        let image = match &self.cache {
            Some(cache) => match cache.get(block_id) {
                Some(image) => image,
                None => {
                    let image = self.disk.read_block(block_id)?;
                    cache.put(block_id, image.clone(), false);
                    image
                }
            },
            None => self.disk.read_block(block_id)?,
        };

        if offset >= image.len() as u64 {
            return Ok(Vec::new());
        }
        let offset = offset as usize;
        let end = if length == 0 {
            image.len()
        } else {
            offset.saturating_add(length as usize).min(image.len())
        };
        Ok(image[offset..end].to_vec())
    }

    /// Drop the block from cache and disk
    ///
    /// The cached page is removed without a write-back: the block is going
    /// away, so its dirty content must not resurrect the file.
    pub fn delete_block(&self, block_id: u64) -> StorageResult<()> {
        if let Some(cache) = &self.cache {
            cache.remove(block_id);
        }
        self.disk.delete_block(block_id)
    }

    /// Whether the block file exists on disk
    pub fn block_exists(&self, block_id: u64) -> bool {
        self.disk.block_exists(block_id)
    }

    /// On-disk size of the block in bytes, or 0 if absent
    ///
    /// With write-back pending this can lag the logical size; the metadata
    /// layer tracks the logical view.
    pub fn block_size(&self, block_id: u64) -> u64 {
        self.disk.block_size(block_id)
    }

    /// Read the whole block directly from disk, bypassing the cache
    ///
    /// Used by the startup scan and by consistency checks.
    pub fn read_block_from_disk(&self, block_id: u64) -> StorageResult<Vec<u8>> {
        self.disk.read_block(block_id)
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Number of dirty pages currently cached (0 without a cache)
    pub fn dirty_page_count(&self) -> u64 {
        self.cache.as_ref().map_or(0, |c| c.dirty_page_count())
    }

    /// Cache capacity in pages (0 without a cache)
    pub fn cache_capacity(&self) -> u64 {
        self.cache.as_ref().map_or(0, |c| c.capacity())
    }

    /// Write all dirty pages back and mark them clean
    pub fn flush_all(&self) {
        if let Some(cache) = &self.cache {
            cache.flush_all();
        }
    }

    /// Like [`flush_all`](Self::flush_all), returning the number flushed
    pub fn flush_dirty(&self) -> u64 {
        self.cache.as_ref().map_or(0, |c| c.flush_dirty())
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    pub fn disk_stats(&self) -> AccessStats {
        self.disk.access_stats()
    }

    fn load_image(&self, block_id: u64) -> StorageResult<(Vec<u8>, bool)> {
        if let Some(cache) = &self.cache {
            if let Some(image) = cache.get(block_id) {
                return Ok((image, true));
            }
        }
        if self.disk.block_exists(block_id) {
            return Ok((self.disk.read_block(block_id)?, true));
        }
        Ok((Vec::new(), false))
    }
}

impl Drop for BlockStore {
    fn drop(&mut self) {
        // Every committed write must be on disk once the store is gone.
        if let Some(cache) = &self.cache {
            let flushed = cache.flush_dirty();
            if flushed > 0 {
                tracing::info!(flushed, "flushed dirty pages on shutdown");
            }
        }
    }
}
