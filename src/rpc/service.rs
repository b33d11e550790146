//! Data-node RPC service
//!
//! Stateless translation layer: each RPC maps 1:1 onto a
//! [`BlockManager`] call and each failure is folded into the response
//! header's status plus an error string. The service also exposes the
//! dirty-page hooks the background flusher polls.

use std::sync::atomic::{AtomicU64, Ordering};

use super::messages::*;
use super::status;
use crate::metadata::{BlockManager, MetadataError};
use crate::storage::StorageError;

fn status_of(err: &MetadataError) -> i32 {
    match err {
        MetadataError::NotFound(_) => status::NOT_FOUND,
        MetadataError::DataTooLarge(_) => status::INVALID_ARGUMENT,
        MetadataError::Storage(StorageError::BlockNotFound(_)) => status::NOT_FOUND,
        MetadataError::Storage(StorageError::ExceedsBlockSize { .. }) => status::INVALID_ARGUMENT,
        MetadataError::Storage(StorageError::Io(_)) => status::IO_ERROR,
    }
}

/// RPC handlers over a single block manager
pub struct DataNodeService {
    node_id: String,
    manager: BlockManager,
    request_count: AtomicU64,
}

impl DataNodeService {
    pub fn new(node_id: String, manager: BlockManager) -> Self {
        tracing::info!(node_id = %node_id, "data node service initialized");
        Self {
            node_id,
            manager,
            request_count: AtomicU64::new(0),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn manager(&self) -> &BlockManager {
        &self.manager
    }

    /// ReadBlock: copy out a byte range of a block
    pub fn handle_read_block(
        &self,
        header: &ReadBlockRequestHeader,
    ) -> (ReadBlockResponseHeader, Vec<u8>) {
        self.request_count.fetch_add(1, Ordering::Relaxed);

        match self
            .manager
            .read_block(header.block_id, header.offset, header.length)
        {
            Ok(data) => (ReadBlockResponseHeader::success(data.len() as u64), data),
            Err(e) => {
                tracing::warn!(block_id = header.block_id, error = %e, "ReadBlock failed");
                let message = format!("Failed to read block {}: {}", header.block_id, e);
                let bytes = message.into_bytes();
                (
                    ReadBlockResponseHeader::error(status_of(&e), bytes.len() as u32),
                    bytes,
                )
            }
        }
    }

    /// WriteBlock: write a byte range into a block
    pub fn handle_write_block(
        &self,
        header: &WriteBlockRequestHeader,
        data: &[u8],
    ) -> (StatusResponseHeader, Vec<u8>) {
        self.request_count.fetch_add(1, Ordering::Relaxed);

        match self
            .manager
            .write_block(header.block_id, data, header.offset, header.sync())
        {
            Ok(()) => (StatusResponseHeader::success(), Vec::new()),
            Err(e) => {
                tracing::warn!(block_id = header.block_id, error = %e, "WriteBlock failed");
                let message = format!("Failed to write block {}: {}", header.block_id, e);
                let bytes = message.into_bytes();
                (
                    StatusResponseHeader::error(status_of(&e), bytes.len() as u32),
                    bytes,
                )
            }
        }
    }

    /// DeleteBlock: drop a block and its metadata
    pub fn handle_delete_block(
        &self,
        header: &DeleteBlockRequestHeader,
    ) -> (StatusResponseHeader, Vec<u8>) {
        self.request_count.fetch_add(1, Ordering::Relaxed);

        match self.manager.delete_block(header.block_id) {
            Ok(()) => (StatusResponseHeader::success(), Vec::new()),
            Err(e) => {
                tracing::warn!(block_id = header.block_id, error = %e, "DeleteBlock failed");
                let message = format!("Failed to delete block {}: {}", header.block_id, e);
                let bytes = message.into_bytes();
                (
                    StatusResponseHeader::error(status_of(&e), bytes.len() as u32),
                    bytes,
                )
            }
        }
    }

    /// GetBlockInfo: metadata snapshot for a block
    pub fn handle_get_block_info(
        &self,
        header: &GetBlockInfoRequestHeader,
    ) -> (GetBlockInfoResponseHeader, Vec<u8>) {
        self.request_count.fetch_add(1, Ordering::Relaxed);

        match self.manager.get_block_metadata(header.block_id) {
            Some(meta) => {
                let mut data = Vec::with_capacity(meta.created_at.len() + meta.content_digest.len());
                data.extend_from_slice(meta.created_at.as_bytes());
                data.extend_from_slice(meta.content_digest.as_bytes());
                (
                    GetBlockInfoResponseHeader::found(
                        meta.size,
                        meta.access_count,
                        meta.created_at.len() as u32,
                        meta.content_digest.len() as u32,
                    ),
                    data,
                )
            }
            None => (GetBlockInfoResponseHeader::missing(), Vec::new()),
        }
    }

    /// Heartbeat: liveness plus the current block inventory
    pub fn handle_heartbeat(&self, node_id: &str) -> (HeartbeatResponseHeader, Vec<u8>) {
        self.request_count.fetch_add(1, Ordering::Relaxed);

        let blocks = self.manager.list_blocks();
        tracing::debug!(
            from = %node_id,
            blocks = blocks.len(),
            "heartbeat"
        );
        (
            HeartbeatResponseHeader::success(blocks.len() as u64),
            encode_block_ids(&blocks),
        )
    }

    // Hooks for the background flusher.

    pub fn dirty_page_count(&self) -> u64 {
        self.manager.dirty_page_count()
    }

    pub fn cache_capacity(&self) -> u64 {
        self.manager.cache_capacity()
    }

    pub fn cache_enabled(&self) -> bool {
        self.manager.cache_enabled()
    }

    pub fn flush_dirty_pages(&self) -> u64 {
        self.manager.flush_dirty_pages()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Human-readable statistics snapshot for the periodic reporter
    pub fn statistics(&self) -> String {
        let disk = self.manager.disk_stats();
        let mut out = format!(
            "node {}: {} blocks, {} bytes stored, {} requests; disk r/w {}/{} ops, {}/{} bytes",
            self.node_id,
            self.manager.block_count(),
            self.manager.total_storage_used(),
            self.request_count(),
            disk.total_reads,
            disk.total_writes,
            disk.total_bytes_read,
            disk.total_bytes_written,
        );
        if let Some(cache) = self.manager.cache_stats() {
            out.push_str(&format!(
                "; cache[{}] {}/{} pages, {} dirty, {} hits, {} misses, {} evictions",
                cache.policy_name,
                cache.size,
                cache.capacity,
                self.manager.dirty_page_count(),
                cache.hits,
                cache.misses,
                cache.evictions,
            ));
        }
        out
    }
}
