//! Low-level disk I/O for block storage
//!
//! Block-addressable design: every operation works on whole blocks only.
//! Partial reads and writes are resolved above this layer by reading the
//! whole block, modifying it in memory, and writing the whole block back.
//!
//! Not internally locked; callers must serialize access per block id. The
//! layers above hold a lock across each disk call, so this type only needs
//! atomic counters.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::{StorageError, StorageResult};
use crate::constants::block_file_name;

/// Snapshot of disk access counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessStats {
    pub total_reads: u64,
    pub total_writes: u64,
    pub total_bytes_read: u64,
    pub total_bytes_written: u64,
}

/// One file per block under a blocks directory (`blk_<id>.img`)
pub struct DiskStore {
    blocks_dir: PathBuf,

    reads: AtomicU64,
    writes: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl DiskStore {
    /// Open a disk store, creating the blocks directory if needed
    pub fn new<P: AsRef<Path>>(blocks_dir: P) -> StorageResult<Self> {
        let blocks_dir = blocks_dir.as_ref().to_path_buf();

        if !blocks_dir.exists() {
            std::fs::create_dir_all(&blocks_dir)?;
            tracing::info!(dir = %blocks_dir.display(), "created blocks directory");
        }

        Ok(Self {
            blocks_dir,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        })
    }

    /// Full path of the file backing a block
    pub fn block_path(&self, block_id: u64) -> PathBuf {
        self.blocks_dir.join(block_file_name(block_id))
    }

    pub fn blocks_dir(&self) -> &Path {
        &self.blocks_dir
    }

    /// Truncate-and-write the whole block file
    ///
    /// With `sync` the data is fsynced to stable storage before returning;
    /// without it the write stops at the OS page cache.
    pub fn write_block(&self, block_id: u64, data: &[u8], sync: bool) -> StorageResult<()> {
        let path = self.block_path(block_id);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| {
                tracing::error!(block_id, path = %path.display(), error = %e, "failed to open block file for writing");
                StorageError::Io(e)
            })?;

        file.write_all(data)?;
        file.flush()?;
        if sync {
            file.sync_all()?;
        }

        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written
            .fetch_add(data.len() as u64, Ordering::Relaxed);

        tracing::debug!(block_id, bytes = data.len(), sync, "wrote block to disk");
        Ok(())
    }

    /// Read the entire block file
    pub fn read_block(&self, block_id: u64) -> StorageResult<Vec<u8>> {
        let path = self.block_path(block_id);

        if !path.exists() {
            return Err(StorageError::BlockNotFound(block_id));
        }

        let data = std::fs::read(&path).map_err(|e| {
            tracing::error!(block_id, path = %path.display(), error = %e, "failed to read block file");
            StorageError::Io(e)
        })?;

        self.reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_read
            .fetch_add(data.len() as u64, Ordering::Relaxed);

        tracing::debug!(block_id, bytes = data.len(), "read block from disk");
        Ok(data)
    }

    /// Remove the block file; fails if it does not exist
    pub fn delete_block(&self, block_id: u64) -> StorageResult<()> {
        let path = self.block_path(block_id);

        if !path.exists() {
            return Err(StorageError::BlockNotFound(block_id));
        }

        std::fs::remove_file(&path)?;
        tracing::debug!(block_id, "deleted block file");
        Ok(())
    }

    pub fn block_exists(&self, block_id: u64) -> bool {
        self.block_path(block_id).exists()
    }

    /// Size of the block file in bytes, or 0 if absent
    pub fn block_size(&self, block_id: u64) -> u64 {
        std::fs::metadata(self.block_path(block_id))
            .map(|m| m.len())
            .unwrap_or(0)
    }

    pub fn access_stats(&self) -> AccessStats {
        AccessStats {
            total_reads: self.reads.load(Ordering::Relaxed),
            total_writes: self.writes.load(Ordering::Relaxed),
            total_bytes_read: self.bytes_read.load(Ordering::Relaxed),
            total_bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }

    pub fn reset_access_stats(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.bytes_read.store(0, Ordering::Relaxed);
        self.bytes_written.store(0, Ordering::Relaxed);
    }

    /// Fsync an existing block file without rewriting it
    ///
    /// Used by tests and recovery tooling; regular writes sync through
    /// [`write_block`](Self::write_block).
    pub fn sync_block(&self, block_id: u64) -> StorageResult<()> {
        let path = self.block_path(block_id);
        if !path.exists() {
            return Ok(());
        }
        let file = File::open(&path)?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let disk = DiskStore::new(dir.path()).unwrap();

        disk.write_block(1, b"hello disk", true).unwrap();
        assert_eq!(disk.read_block(1).unwrap(), b"hello disk");
        assert!(disk.block_exists(1));
        assert_eq!(disk.block_size(1), 10);
    }

    #[test]
    fn test_write_truncates_previous_content() {
        let dir = TempDir::new().unwrap();
        let disk = DiskStore::new(dir.path()).unwrap();

        disk.write_block(1, b"a much longer first version", false)
            .unwrap();
        disk.write_block(1, b"short", false).unwrap();
        assert_eq!(disk.read_block(1).unwrap(), b"short");
        assert_eq!(disk.block_size(1), 5);
    }

    #[test]
    fn test_read_missing_block_fails() {
        let dir = TempDir::new().unwrap();
        let disk = DiskStore::new(dir.path()).unwrap();

        match disk.read_block(42) {
            Err(StorageError::BlockNotFound(42)) => {}
            other => panic!("expected BlockNotFound, got {:?}", other.map(|d| d.len())),
        }
    }

    #[test]
    fn test_delete_block() {
        let dir = TempDir::new().unwrap();
        let disk = DiskStore::new(dir.path()).unwrap();

        disk.write_block(7, b"xyz", false).unwrap();
        disk.delete_block(7).unwrap();
        assert!(!disk.block_exists(7));
        assert_eq!(disk.block_size(7), 0);
        assert!(matches!(
            disk.delete_block(7),
            Err(StorageError::BlockNotFound(7))
        ));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let disk = DiskStore::new(&nested).unwrap();
        assert!(nested.is_dir());
        disk.write_block(1, b"x", false).unwrap();
        assert!(nested.join("blk_1.img").is_file());
    }

    #[test]
    fn test_counters_track_successful_io_only() {
        let dir = TempDir::new().unwrap();
        let disk = DiskStore::new(dir.path()).unwrap();

        disk.write_block(1, b"12345", false).unwrap();
        disk.write_block(2, b"123", true).unwrap();
        disk.read_block(1).unwrap();
        let _ = disk.read_block(99); // miss: must not count

        let stats = disk.access_stats();
        assert_eq!(stats.total_writes, 2);
        assert_eq!(stats.total_bytes_written, 8);
        assert_eq!(stats.total_reads, 1);
        assert_eq!(stats.total_bytes_read, 5);

        disk.reset_access_stats();
        assert_eq!(disk.access_stats(), AccessStats::default());
    }
}
