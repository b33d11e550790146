//! Page cache with pluggable eviction policies
//!
//! The cache stores whole blocks as [`Page`] entries keyed by block id and
//! supports write-back caching: a page written with `dirty = true` stays in
//! memory until it is evicted or flushed, at which point the registered
//! eviction callback persists it. Two policies are provided:
//!
//! - [`LruCache`]: doubly-linked list + hash map, O(1) operations
//! - [`LfuCache`]: frequency buckets of doubly-linked lists, O(1) operations,
//!   least-recently-used tie-break within a frequency
//!
//! [`PageCache`] is a thin façade that selects a policy at construction and
//! forwards every operation, so the rest of the system never depends on a
//! concrete policy type.

pub mod lfu;
pub mod lru;
pub mod page_cache;

pub use lfu::LfuCache;
pub use lru::LruCache;
pub use page_cache::PageCache;

use std::str::FromStr;
use std::sync::Arc;

/// A cache entry: the full content of one block plus its dirty state
///
/// Invariant: a page always holds the whole block. Partial writes are
/// resolved into full-block images before they reach the cache.
#[derive(Debug, Clone)]
pub struct Page {
    /// Full byte content of the block (length <= `BLOCK_SIZE`)
    pub data: Vec<u8>,

    /// True iff the in-memory content differs from the on-disk content
    pub dirty: bool,
}

impl Page {
    pub fn new(data: Vec<u8>, dirty: bool) -> Self {
        Self { data, dirty }
    }
}

/// Write-back callback invoked when a dirty page leaves the cache
///
/// Called with the block id and the full page content while the policy lock
/// is held, so no other operation can observe the block between the
/// write-back and the removal. Failures inside the callback must be handled
/// by the callback itself (logged); the eviction proceeds regardless.
pub type EvictionCallback = Arc<dyn Fn(u64, &[u8]) + Send + Sync>;

/// Cache statistics snapshot
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Current number of cached pages
    pub size: u64,
    /// Maximum number of cached pages
    pub capacity: u64,
    /// Name of the eviction policy ("LRU", "LFU")
    pub policy_name: &'static str,
}

/// Eviction policy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// Least Recently Used
    Lru,

    /// Least Frequently Used
    Lfu,
}

impl PolicyKind {
    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::Lru => "LRU",
            PolicyKind::Lfu => "LFU",
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(PolicyKind::Lru),
            "lfu" => Ok(PolicyKind::Lfu),
            other => Err(format!("unknown cache policy: {}", other)),
        }
    }
}

/// Common contract for page cache eviction policies
///
/// Implementations are internally thread-safe: every operation takes one
/// internal mutex. Operations are O(1) and never block on I/O, with the
/// single exception of the eviction callback, which performs a synchronous
/// disk write while the mutex is held.
pub trait PagePolicy: Send + Sync {
    /// Look up a block, returning a copy of its data on a hit
    ///
    /// A hit promotes the page (LRU: most-recently-used position; LFU:
    /// frequency bump). The dirty flag is unchanged.
    fn get(&self, block_id: u64) -> Option<Vec<u8>>;

    /// Insert or update a page
    ///
    /// Updating an existing page overwrites both data and dirty flag and
    /// promotes the page. Inserting into a full cache first evicts one page
    /// according to the policy, invoking the eviction callback if the victim
    /// is dirty.
    fn put(&self, block_id: u64, data: Vec<u8>, dirty: bool);

    /// Remove a page without invoking the eviction callback
    ///
    /// Returns whether the page was present.
    fn remove(&self, block_id: u64) -> bool;

    /// Whether a page for `block_id` is cached
    fn contains(&self, block_id: u64) -> bool;

    /// Drop all pages without invoking the eviction callback
    ///
    /// Only used on shutdown paths after dirty state has been drained.
    fn clear(&self);

    /// Write every dirty page back via the eviction callback and mark it
    /// clean; pages stay cached. No-op when no callback is set.
    fn flush_all(&self);

    /// Like [`flush_all`](Self::flush_all), returning the number of pages flushed
    fn flush_dirty(&self) -> u64;

    fn stats(&self) -> CacheStats;

    fn reset_stats(&self);

    /// Number of pages whose content has not yet been written to disk
    fn dirty_page_count(&self) -> u64;

    /// Maximum number of pages
    fn capacity(&self) -> u64;

    /// Current number of pages
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn policy_name(&self) -> &'static str;

    /// Register the write-back callback for dirty evictions and flushes
    fn set_eviction_callback(&self, callback: EvictionCallback);
}
