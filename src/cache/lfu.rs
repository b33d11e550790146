//! Least Frequently Used page cache
//!
//! Hash map + per-frequency doubly-linked lists, all O(1). Each node carries
//! its access frequency; nodes with the same frequency form a list with the
//! most recently touched page at the head, so eviction takes the tail of the
//! lowest-frequency list (least frequently used, ties broken by recency).
//!
//! `min_freq` tracks the smallest non-empty frequency lazily: it advances
//! when an access drains its bucket and snaps back to 1 on every insert,
//! since new pages always start at frequency 1. Emptied buckets are kept in
//! the map; they are revived by the next page reaching that frequency.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{CacheStats, EvictionCallback, Page, PagePolicy};

/// Sentinel index terminating frequency lists in both directions
const NIL: usize = usize::MAX;

struct Node {
    block_id: u64,
    page: Page,
    freq: u64,
    prev: usize,
    next: usize,
}

/// One doubly-linked list of nodes sharing a frequency; MRU at the head
#[derive(Clone, Copy)]
struct FreqList {
    head: usize,
    tail: usize,
}

impl FreqList {
    const EMPTY: FreqList = FreqList {
        head: NIL,
        tail: NIL,
    };
}

struct LfuInner {
    /// Slab of nodes; slots are recycled through `free`
    nodes: Vec<Node>,
    free: Vec<usize>,

    /// block id -> slab index
    map: HashMap<u64, usize>,

    /// frequency -> list of nodes with that frequency
    freq_lists: HashMap<u64, FreqList>,

    /// Smallest frequency with a non-empty list; meaningless when empty
    min_freq: u64,

    num_dirty: u64,

    hits: u64,
    misses: u64,
    evictions: u64,

    callback: Option<EvictionCallback>,
}

impl LfuInner {
    fn freq_list_empty(&self, freq: u64) -> bool {
        self.freq_lists.get(&freq).map_or(true, |l| l.head == NIL)
    }

    /// Unlink a node from its frequency list; the slab slot stays allocated
    fn detach(&mut self, idx: usize) {
        let freq = self.nodes[idx].freq;
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        if prev != NIL {
            self.nodes[prev].next = next;
        }
        if next != NIL {
            self.nodes[next].prev = prev;
        }
        if let Some(list) = self.freq_lists.get_mut(&freq) {
            if list.head == idx {
                list.head = next;
            }
            if list.tail == idx {
                list.tail = prev;
            }
        }
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = NIL;
    }

    /// Link a detached node at the head of the list for `freq`
    fn push_front(&mut self, idx: usize, freq: u64) {
        self.nodes[idx].freq = freq;
        self.nodes[idx].prev = NIL;
        let list = self.freq_lists.entry(freq).or_insert(FreqList::EMPTY);
        let old_head = list.head;
        list.head = idx;
        if old_head == NIL {
            list.tail = idx;
        }
        self.nodes[idx].next = old_head;
        if old_head != NIL {
            self.nodes[old_head].prev = idx;
        }
    }

    /// Move a node to the next frequency, advancing `min_freq` if its old
    /// bucket drained
    fn promote(&mut self, idx: usize) {
        let old_freq = self.nodes[idx].freq;
        self.detach(idx);
        if old_freq == self.min_freq && self.freq_list_empty(old_freq) {
            self.min_freq += 1;
        }
        self.push_front(idx, old_freq + 1);
    }

    fn alloc(&mut self, block_id: u64, page: Page) -> usize {
        let node = Node {
            block_id,
            page,
            freq: 1,
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
        self.nodes[idx].page = Page::new(Vec::new(), false);
        self.free.push(idx);
    }

    /// Evict the tail of the `min_freq` list, writing it back first if dirty
    fn evict_lfu(&mut self) {
        let victim = self
            .freq_lists
            .get(&self.min_freq)
            .map(|l| l.tail)
            .unwrap_or(NIL);
        if victim == NIL {
            // Cannot happen while the size/min_freq invariants hold.
            tracing::error!(min_freq = self.min_freq, "LFU: no page to evict");
            return;
        }

        let block_id = self.nodes[victim].block_id;
        self.detach(victim);
        self.map.remove(&block_id);

        let page = std::mem::replace(&mut self.nodes[victim].page, Page::new(Vec::new(), false));
        if page.dirty {
            self.num_dirty -= 1;
            if let Some(cb) = self.callback.clone() {
                tracing::debug!(block_id, "LFU: writing back dirty page before eviction");
                cb(block_id, &page.data);
            }
        }

        self.free.push(victim);
        self.evictions += 1;
        tracing::trace!(block_id, "LFU: evicted page");
    }

    fn flush_dirty_pages(&mut self) -> u64 {
        let Some(cb) = self.callback.clone() else {
            tracing::debug!("LFU: flush requested but no eviction callback is set");
            return 0;
        };

        let indices: Vec<usize> = self.map.values().copied().collect();
        let mut flushed = 0;
        for idx in indices {
            if self.nodes[idx].page.dirty {
                let block_id = self.nodes[idx].block_id;
                cb(block_id, &self.nodes[idx].page.data);
                self.nodes[idx].page.dirty = false;
                flushed += 1;
            }
        }
        self.num_dirty = 0;
        flushed
    }
}

/// LFU page cache, internally thread-safe
pub struct LfuCache {
    capacity: u64,
    inner: Mutex<LfuInner>,
}

impl LfuCache {
    /// Create an LFU cache holding at most `capacity` pages
    ///
    /// # Panics
    /// Panics if `capacity` is zero; configuration validation rejects that
    /// before construction.
    pub fn new(capacity: u64) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Self {
            capacity,
            inner: Mutex::new(LfuInner {
                nodes: Vec::new(),
                free: Vec::new(),
                map: HashMap::new(),
                freq_lists: HashMap::new(),
                min_freq: 1,
                num_dirty: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                callback: None,
            }),
        }
    }

    #[cfg(test)]
    fn frequency_of(&self, block_id: u64) -> Option<u64> {
        let inner = self.inner.lock();
        inner.map.get(&block_id).map(|&idx| inner.nodes[idx].freq)
    }
}

impl PagePolicy for LfuCache {
    fn get(&self, block_id: u64) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        match inner.map.get(&block_id).copied() {
            Some(idx) => {
                inner.promote(idx);
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
            inner.promote(idx);
        } else {
            if inner.map.len() as u64 >= self.capacity {
                inner.evict_lfu();
            }
            let idx = inner.alloc(block_id, Page::new(data, dirty));
            inner.map.insert(block_id, idx);
            inner.push_front(idx, 1);
            // New pages start at frequency 1, so 1 is non-empty again.
            inner.min_freq = 1;
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
        inner.freq_lists.clear();
        inner.min_freq = 1;
        inner.num_dirty = 0;
    }

    fn flush_all(&self) {
        self.flush_dirty();
    }

    fn flush_dirty(&self) -> u64 {
        let mut inner = self.inner.lock();
        let flushed = inner.flush_dirty_pages();
        if flushed > 0 {
            tracing::debug!(flushed, "LFU: flushed dirty pages");
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
            policy_name: "LFU",
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
        "LFU"
    }

    fn set_eviction_callback(&self, callback: EvictionCallback) {
        self.inner.lock().callback = Some(callback);
        tracing::debug!("LFU: eviction callback registered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_evicts_lowest_frequency() {
        let cache = LfuCache::new(2);
        cache.put(1, b"one".to_vec(), false);
        cache.put(2, b"two".to_vec(), false);
        cache.get(1);
        cache.get(1);

        // 1 has frequency 3, 2 has frequency 1: inserting 3 evicts 2.
        cache.put(3, b"three".to_vec(), false);

        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
    }

    #[test]
    fn test_frequency_tracking() {
        let cache = LfuCache::new(4);
        cache.put(100, b"A".to_vec(), false);
        assert_eq!(cache.frequency_of(100), Some(1));
        cache.get(100);
        cache.get(100);
        assert_eq!(cache.frequency_of(100), Some(3));

        // Updating through put also counts as an access.
        cache.put(100, b"A2".to_vec(), true);
        assert_eq!(cache.frequency_of(100), Some(4));
    }

    #[test]
    fn test_recency_tie_break_within_frequency() {
        let cache = LfuCache::new(3);
        cache.put(1, b"a".to_vec(), false);
        cache.put(2, b"b".to_vec(), false);
        cache.put(3, b"c".to_vec(), false);

        // All at frequency 1; 1 is the least recently touched.
        cache.put(4, b"d".to_vec(), false);

        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert!(cache.contains(3));
        assert!(cache.contains(4));
    }

    #[test]
    fn test_min_freq_advances_and_resets() {
        let cache = LfuCache::new(2);
        cache.put(1, b"a".to_vec(), false);
        cache.put(2, b"b".to_vec(), false);

        // Drain frequency 1 completely.
        cache.get(1);
        cache.get(2);
        assert_eq!(cache.frequency_of(1), Some(2));
        assert_eq!(cache.frequency_of(2), Some(2));

        // Insert resets min_freq to 1, evicting the LRU of frequency 2.
        cache.put(3, b"c".to_vec(), false);
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert!(cache.contains(3));

        // 3 (frequency 1) is now the victim.
        cache.put(4, b"d".to_vec(), false);
        assert!(!cache.contains(3));
        assert!(cache.contains(2));
        assert!(cache.contains(4));
    }

    #[test]
    fn test_dirty_eviction_callback() {
        let cache = LfuCache::new(2);
        let evicted: Arc<Mutex<Vec<(u64, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let evicted = Arc::clone(&evicted);
            cache.set_eviction_callback(Arc::new(move |id, data| {
                evicted.lock().push((id, data.to_vec()));
            }));
        }

        cache.put(100, b"A".to_vec(), false);
        cache.get(100);
        cache.get(100);
        cache.put(101, b"B".to_vec(), true);
        cache.put(102, b"C".to_vec(), false);

        // 101 had the lowest frequency and was dirty.
        let evicted = evicted.lock();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0], (101, b"B".to_vec()));
        assert!(cache.contains(100));
        assert!(cache.contains(102));
    }

    #[test]
    fn test_flush_dirty_counts_and_cleans() {
        let cache = LfuCache::new(4);
        let cb: EvictionCallback = Arc::new(|_, _| {});
        cache.set_eviction_callback(cb);

        cache.put(1, b"a".to_vec(), true);
        cache.put(2, b"b".to_vec(), false);
        cache.put(3, b"c".to_vec(), true);
        assert_eq!(cache.dirty_page_count(), 2);

        assert_eq!(cache.flush_dirty(), 2);
        assert_eq!(cache.dirty_page_count(), 0);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_stats() {
        let cache = LfuCache::new(2);
        cache.put(1, b"a".to_vec(), false);
        cache.get(1);
        cache.get(9);
        cache.put(2, b"b".to_vec(), false);
        cache.put(3, b"c".to_vec(), false);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.size, 2);
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.policy_name, "LFU");

        cache.reset_stats();
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
    }
}
