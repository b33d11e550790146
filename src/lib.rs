//! BlockFS - Data Node for a Distributed Block File System
//!
//! BlockFS is the storage half of a small distributed file system: a
//! master tracks the directory tree and block placement, while data nodes
//! like this one persist fixed-size blocks of file content and serve them
//! over RPC. This crate implements the data node's block storage engine:
//!
//! - **Two-level storage**: an in-memory page cache backed by one on-disk
//!   file per block (`blk_<id>.img`)
//! - **Write-back caching**: updates land in the cache as dirty pages and
//!   reach disk on eviction, background flush, or shutdown
//! - **Pluggable eviction**: LRU and LFU policies, both O(1), selected at
//!   startup
//! - **Partial access**: sub-block reads and writes resolved by
//!   read-modify-write over whole-block cache entries
//! - **Bounded recovery**: a background flusher caps the number of dirty
//!   pages, bounding the shutdown flush
//!
//! # Architecture
//!
//! - **Cache Layer** ([`cache`]): page cache with pluggable LRU/LFU
//!   eviction and a dirty-page write-back callback
//! - **Storage Layer** ([`storage`]): block-addressable disk store and the
//!   write-back coordinator implementing partial reads/writes
//! - **Metadata Layer** ([`metadata`]): per-block inventory (size,
//!   timestamp, content digest, access count) rebuilt from disk at startup
//! - **RPC Layer** ([`rpc`]): `ReadBlock` / `WriteBlock` / `DeleteBlock` /
//!   `GetBlockInfo` / `Heartbeat` over length-prefixed TCP frames
//! - **Server utilities** ([`server`]): signal handling and the background
//!   dirty-page flusher
//!
//! # Example
//!
//! ```no_run
//! use blockfs::cache::PolicyKind;
//! use blockfs::metadata::BlockManager;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // A manager with a 1024-page LRU write-back cache.
//! let manager = BlockManager::new("/var/lib/blockfs/blocks", true, 1024, PolicyKind::Lru)?;
//!
//! manager.write_block(1, b"hello blocks", 0, true)?;
//! let data = manager.read_block(1, 0, 0)?;
//! assert_eq!(data, b"hello blocks");
//!
//! // Dirty pages are flushed on shutdown; force it explicitly here.
//! manager.flush_all();
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod logging;
pub mod metadata;
pub mod rpc;
pub mod server;
pub mod storage;
