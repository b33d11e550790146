//! Policy-selecting façade over the page cache
//!
//! `PageCache` hides the concrete eviction policy behind [`PagePolicy`] so
//! callers depend only on the cache contract. Adding another policy (ARC,
//! 2Q, TinyLFU) means extending [`PolicyKind`] and implementing the trait;
//! nothing above this module changes.

use super::{CacheStats, EvictionCallback, LfuCache, LruCache, PagePolicy, PolicyKind};

/// Page cache with a policy chosen at construction
pub struct PageCache {
    policy: Box<dyn PagePolicy>,
}

impl PageCache {
    /// Create a page cache using the given eviction policy and capacity
    /// (in pages)
    pub fn new(kind: PolicyKind, capacity: u64) -> Self {
        let policy: Box<dyn PagePolicy> = match kind {
            PolicyKind::Lru => Box::new(LruCache::new(capacity)),
            PolicyKind::Lfu => Box::new(LfuCache::new(capacity)),
        };
        tracing::info!(
            policy = policy.policy_name(),
            capacity,
            "page cache initialized"
        );
        Self { policy }
    }

    pub fn get(&self, block_id: u64) -> Option<Vec<u8>> {
        self.policy.get(block_id)
    }

    pub fn put(&self, block_id: u64, data: Vec<u8>, dirty: bool) {
        self.policy.put(block_id, data, dirty)
    }

    pub fn remove(&self, block_id: u64) -> bool {
        self.policy.remove(block_id)
    }

    pub fn contains(&self, block_id: u64) -> bool {
        self.policy.contains(block_id)
    }

    pub fn clear(&self) {
        self.policy.clear()
    }

    /// Write all dirty pages back and mark them clean; pages stay cached
    pub fn flush_all(&self) {
        self.policy.flush_all()
    }

    /// Like [`flush_all`](Self::flush_all), returning the number flushed
    pub fn flush_dirty(&self) -> u64 {
        self.policy.flush_dirty()
    }

    pub fn stats(&self) -> CacheStats {
        self.policy.stats()
    }

    pub fn reset_stats(&self) {
        self.policy.reset_stats()
    }

    pub fn dirty_page_count(&self) -> u64 {
        self.policy.dirty_page_count()
    }

    pub fn capacity(&self) -> u64 {
        self.policy.capacity()
    }

    pub fn len(&self) -> u64 {
        self.policy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policy.is_empty()
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.policy_name()
    }

    pub fn set_eviction_callback(&self, callback: EvictionCallback) {
        self.policy.set_eviction_callback(callback)
    }
}
