//! Least Recently Used page cache
//!
//! Doubly-linked list + hash map, both O(1). The list is stored in a slab:
//! nodes live in a `Vec` and link to each other by index, with a free list
//! for recycling slots. The most recently used page sits at the head, the
//! eviction victim at the tail.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{CacheStats, EvictionCallback, Page, PagePolicy};

/// Sentinel index terminating the list in both directions
const NIL: usize = usize::MAX;

struct Node {
    block_id: u64,
    page: Page,
    prev: usize,
    next: usize,
}

struct LruInner {
    /// Slab of list nodes; slots are recycled through `free`
    nodes: Vec<Node>,
    free: Vec<usize>,

    /// block id -> slab index
    map: HashMap<u64, usize>,

    /// Most recently used
    head: usize,
    /// Least recently used (eviction victim)
    tail: usize,

    num_dirty: u64,

    hits: u64,
    misses: u64,
    evictions: u64,

    /// Write-back callback for dirty evictions and flushes
    callback: Option<EvictionCallback>,
}

impl LruInner {
    /// Unlink a node from the list; its slab slot stays allocated
    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        if prev != NIL {
            self.nodes[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.nodes[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = NIL;
    }

    /// Link a detached node at the most-recently-used position
    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = old_head;
        if old_head != NIL {
            self.nodes[old_head].prev = idx;
        } else {
            self.tail = idx;
        }
        self.head = idx;
    }

    fn alloc(&mut self, block_id: u64, page: Page) -> usize {
        let node = Node {
            block_id,
            page,
            prev: NIL,
            next: NIL,
        };
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) {
        // Drop the page bytes now rather than on slot reuse.
        self.nodes[idx].page = Page::new(Vec::new(), false);
        self.free.push(idx);
    }

    /// Evict the page at the tail, writing it back first if dirty
    fn evict_lru(&mut self) {
        let idx = self.tail;
        debug_assert!(idx != NIL, "evict_lru on an empty cache");

        let block_id = self.nodes[idx].block_id;
        self.detach(idx);
        self.map.remove(&block_id);

        let page = std::mem::replace(&mut self.nodes[idx].page, Page::new(Vec::new(), false));
        if page.dirty {
            self.num_dirty -= 1;
            if let Some(cb) = self.callback.clone() {
                tracing::debug!(block_id, "LRU: writing back dirty page before eviction");
                cb(block_id, &page.data);
            }
        }

        self.free.push(idx);
        self.evictions += 1;
        tracing::trace!(block_id, "LRU: evicted page");
    }

    fn flush_dirty_pages(&mut self) -> u64 {
        let Some(cb) = self.callback.clone() else {
            tracing::debug!("LRU: flush requested but no eviction callback is set");
            return 0;
        };

        let mut flushed = 0;
        let mut idx = self.head;
        while idx != NIL {
            if self.nodes[idx].page.dirty {
                let block_id = self.nodes[idx].block_id;
                cb(block_id, &self.nodes[idx].page.data);
                self.nodes[idx].page.dirty = false;
                flushed += 1;
            }
            idx = self.nodes[idx].next;
        }
        self.num_dirty = 0;
        flushed
    }
}

/// LRU page cache, internally thread-safe
pub struct LruCache {
    capacity: u64,
    inner: Mutex<LruInner>,
}

impl LruCache {
    /// Create an LRU cache holding at most `capacity` pages
    ///
    /// # Panics
    /// Panics if `capacity` is zero; configuration validation rejects that
    /// before construction.
    pub fn new(capacity: u64) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Self {
            capacity,
            inner: Mutex::new(LruInner {
                nodes: Vec::new(),
                free: Vec::new(),
                map: HashMap::new(),
                head: NIL,
                tail: NIL,
                num_dirty: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                callback: None,
            }),
        }
    }
}

impl PagePolicy for LruCache {
    fn get(&self, block_id: u64) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        match inner.map.get(&block_id).copied() {
            Some(idx) => {
                inner.detach(idx);
                inner.push_front(idx);
                inner.hits += 1;
                Some(inner.nodes[idx].page.data.clone())
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    fn put(&self, block_id: u64, data: Vec<u8>, dirty: bool) {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.map.get(&block_id).copied() {
            let was_dirty = inner.nodes[idx].page.dirty;
            inner.nodes[idx].page = Page::new(data, dirty);
            match (was_dirty, dirty) {
                (false, true) => inner.num_dirty += 1,
                (true, false) => inner.num_dirty -= 1,
                _ => {}
            }
            inner.detach(idx);
            inner.push_front(idx);
        } else {
            if inner.map.len() as u64 >= self.capacity {
                inner.evict_lru();
            }
            let idx = inner.alloc(block_id, Page::new(data, dirty));
            inner.map.insert(block_id, idx);
            inner.push_front(idx);
            if dirty {
                inner.num_dirty += 1;
            }
        }
    }

    fn remove(&self, block_id: u64) -> bool {
        let mut inner = self.inner.lock();
        match inner.map.remove(&block_id) {
            Some(idx) => {
                inner.detach(idx);
                if inner.nodes[idx].page.dirty {
                    inner.num_dirty -= 1;
                }
                inner.release(idx);
                true
            }
            None => false,
        }
    }

    fn contains(&self, block_id: u64) -> bool {
        self.inner.lock().map.contains_key(&block_id)
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.nodes.clear();
        inner.free.clear();
        inner.map.clear();
        inner.head = NIL;
        inner.tail = NIL;
        inner.num_dirty = 0;
    }

    fn flush_all(&self) {
        self.flush_dirty();
    }

    fn flush_dirty(&self) -> u64 {
        let mut inner = self.inner.lock();
        let flushed = inner.flush_dirty_pages();
        if flushed > 0 {
            tracing::debug!(flushed, "LRU: flushed dirty pages");
        }
        flushed
    }

    fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.map.len() as u64,
            capacity: self.capacity,
            policy_name: "LRU",
        }
    }

    fn reset_stats(&self) {
        let mut inner = self.inner.lock();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }

    fn dirty_page_count(&self) -> u64 {
        self.inner.lock().num_dirty
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn len(&self) -> u64 {
        self.inner.lock().map.len() as u64
    }

    fn policy_name(&self) -> &'static str {
        "LRU"
    }

    fn set_eviction_callback(&self, callback: EvictionCallback) {
        self.inner.lock().callback = Some(callback);
        tracing::debug!("LRU: eviction callback registered");
    }
}
