//! Shared, size-bounded block cache.
//!
//! One `BlockCache` is constructed per process and handed to every directory and
//! reader by `Arc`. It maps blocks to their bytes and keeps hit/miss/eviction
//! counters per object key.
//!
//! Recency is tracked with a global logical clock: every `get` and `put` takes
//! a fresh tick, and a hit stamps the entry with it. Eviction runs inline on
//! the thread whose `put` pushes the cache over `max_heap_bytes`, removes
//! blocks in ascending stamp order until the cache is back to
//! `eviction_target_fraction * max_heap_bytes`, and never touches blocks
//! smaller than `min_evictable_size`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::block::Block;
use super::config::{
    DEFAULT_EVICTION_TARGET_FRACTION, DEFAULT_MAX_HEAP_BYTES, DEFAULT_MIN_EVICTABLE_SIZE,
};

/// Configuration for the block cache.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    /// Eviction runs once cached bytes exceed this.
    pub max_heap_bytes: u64,
    /// Blocks smaller than this are never evicted.
    pub min_evictable_size: u64,
    /// Eviction frees down to this fraction of `max_heap_bytes`.
    pub eviction_target_fraction: f64,
}

impl CacheConfig {
    /// Cached bytes an eviction pass aims for.
    pub fn target_bytes(&self) -> u64 {
        (self.max_heap_bytes as f64 * self.eviction_target_fraction) as u64
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_heap_bytes: DEFAULT_MAX_HEAP_BYTES,
            min_evictable_size: DEFAULT_MIN_EVICTABLE_SIZE,
            eviction_target_fraction: DEFAULT_EVICTION_TARGET_FRACTION,
        }
    }
}

/// Bytes of one cached block plus its last access stamp.
#[derive(Debug)]
pub struct CacheEntry {
    data: Bytes,
    access_time: AtomicU64,
}

impl CacheEntry {
    fn new(data: Bytes, access_time: u64) -> Self {
        Self {
            data,
            access_time: AtomicU64::new(access_time),
        }
    }

    /// Size of the cached bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Logical time of the last access.
    pub fn access_time(&self) -> u64 {
        self.access_time.load(Ordering::Acquire)
    }

    fn access(&self, access_time: u64) {
        self.access_time.store(access_time, Ordering::Release);
    }
}

/// Cumulative counters for one object key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileCacheStats {
    /// Block lookups served from the cache.
    pub hits: u64,
    /// Block lookups that found nothing.
    pub misses: u64,
    /// Blocks removed by eviction.
    pub evictions: u64,
}

/// Cache statistics for monitoring.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheStats {
    /// Counters per object key, sorted by key.
    pub files: BTreeMap<String, FileCacheStats>,
    /// Bytes currently cached.
    pub cached_bytes: u64,
    /// Blocks currently cached.
    pub cached_elements: u64,
    /// Eviction threshold.
    pub max_heap_bytes: u64,
}

impl CacheStats {
    /// Counters summed over all files.
    pub fn totals(&self) -> FileCacheStats {
        self.files
            .values()
            .fold(FileCacheStats::default(), |acc, s| FileCacheStats {
                hits: acc.hits + s.hits,
                misses: acc.misses + s.misses,
                evictions: acc.evictions + s.evictions,
            })
    }

    /// Cached bytes as a fraction of the eviction threshold.
    pub fn utilization(&self) -> f64 {
        if self.max_heap_bytes == 0 {
            0.0
        } else {
            self.cached_bytes as f64 / self.max_heap_bytes as f64
        }
    }
}

/// Process-wide cache of remote object blocks.
///
/// # Example
///
/// ```rust,ignore
/// let cache = Arc::new(BlockCache::new(config.cache_config()));
///
/// if let Some(bytes) = cache.get(&block) {
///     // hit: copy what the caller needs out of `bytes`
/// } else {
///     let bytes = fetch_block(&block).await?;
///     cache.put(block, bytes);
/// }
/// ```
pub struct BlockCache {
    /// Cached blocks.
    entries: DashMap<Block, CacheEntry>,

    /// Sum of the sizes of all cached blocks.
    size: AtomicU64,

    /// Number of cached blocks.
    elements: AtomicU64,

    /// Global access clock.
    clock: AtomicU64,

    /// Hit/miss/eviction counters keyed by object key.
    counters: DashMap<String, FileCacheStats>,

    /// Held by the single running eviction pass.
    eviction_lock: Mutex<()>,

    eviction_in_progress: AtomicBool,

    config: CacheConfig,
}

impl BlockCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            size: AtomicU64::new(0),
            elements: AtomicU64::new(0),
            clock: AtomicU64::new(0),
            counters: DashMap::new(),
            eviction_lock: Mutex::new(()),
            eviction_in_progress: AtomicBool::new(false),
            config,
        }
    }

    /// Look up a block.
    ///
    /// A hit stamps the entry with a fresh access time. Hit or miss, the
    /// lookup is counted against the block's object key.
    pub fn get(&self, block: &Block) -> Option<Bytes> {
        let access_time = self.tick();
        let hit = self.entries.get(block).map(|entry| {
            entry.access(access_time);
            entry.data.clone()
        });

        match hit {
            Some(data) => {
                trace!(%block, access_time, "Accessed block");
                self.record(&block.file.key, |s| s.hits += 1);
                Some(data)
            }
            None => {
                trace!(%block, access_time, "Missed block");
                self.record(&block.file.key, |s| s.misses += 1);
                None
            }
        }
    }

    /// Insert a block.
    ///
    /// If the block is already cached the existing bytes win and `false` is
    /// returned. Crossing the heap threshold runs eviction on this thread
    /// unless another pass is already running.
    pub fn put(&self, block: Block, data: Bytes) -> bool {
        let access_time = self.tick();
        let size = data.len() as u64;

        let new_size = match self.entries.entry(block) {
            Entry::Occupied(existing) => {
                warn!(block = %existing.key(), "Cache block already in memory");
                return false;
            }
            Entry::Vacant(slot) => {
                // Account before publishing so a concurrent eviction never
                // subtracts bytes that were not yet added.
                let new_size = self.size.fetch_add(size, Ordering::AcqRel) + size;
                self.elements.fetch_add(1, Ordering::AcqRel);
                trace!(block = %slot.key(), size, access_time, "Cached block");
                slot.insert(CacheEntry::new(data, access_time));
                new_size
            }
        };

        if new_size > self.config.max_heap_bytes
            && !self.eviction_in_progress.load(Ordering::Acquire)
        {
            self.evict();
        }
        true
    }

    /// Run one eviction pass, returning the number of bytes freed.
    ///
    /// Returns 0 immediately if another pass is running.
    pub fn evict(&self) -> u64 {
        let Some(_guard) = self.eviction_lock.try_lock() else {
            return 0;
        };

        self.eviction_in_progress.store(true, Ordering::Release);
        let freed = self.evict_lru();
        self.eviction_in_progress.store(false, Ordering::Release);
        freed
    }

    fn evict_lru(&self) -> u64 {
        let current = self.size.load(Ordering::Acquire);
        let bytes_to_free = current.saturating_sub(self.config.target_bytes());
        if bytes_to_free == 0 {
            return 0;
        }

        let mut candidates: Vec<(u64, Block)> = self
            .entries
            .iter()
            .filter(|e| e.value().size() >= self.config.min_evictable_size)
            .map(|e| (e.value().access_time(), e.key().clone()))
            .collect();
        candidates.sort_unstable_by_key(|(access_time, _)| *access_time);

        let mut freed = 0u64;
        let mut evicted = 0u64;
        for (_, block) in candidates {
            let Some((block, entry)) = self.entries.remove(&block) else {
                continue;
            };
            let size = entry.size();
            self.size.fetch_sub(size, Ordering::AcqRel);
            self.elements.fetch_sub(1, Ordering::AcqRel);
            self.record(&block.file.key, |s| s.evictions += 1);
            trace!(%block, size, "Evicted block");

            freed += size;
            evicted += 1;
            if freed >= bytes_to_free {
                break;
            }
        }

        debug!(
            before = current,
            freed,
            evicted,
            wanted = bytes_to_free,
            "Eviction pass finished"
        );
        freed
    }

    /// Check if a block is cached without touching counters or recency.
    pub fn contains(&self, block: &Block) -> bool {
        self.entries.contains_key(block)
    }

    /// Bytes currently cached.
    pub fn size_bytes(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Number of cached blocks.
    pub fn len(&self) -> usize {
        self.elements.load(Ordering::Acquire) as usize
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of counters and totals.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            files: self
                .counters
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            cached_bytes: self.size_bytes(),
            cached_elements: self.elements.load(Ordering::Acquire),
            max_heap_bytes: self.config.max_heap_bytes,
        }
    }

    /// Clear the per-file counters. Cached blocks are kept.
    pub fn reset_stats(&self) {
        self.counters.clear();
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn record(&self, key: &str, update: impl FnOnce(&mut FileCacheStats)) {
        if let Some(mut stats) = self.counters.get_mut(key) {
            update(&mut stats);
            return;
        }
        update(&mut self.counters.entry(key.to_string()).or_default());
    }
}

impl std::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCache")
            .field("cached_bytes", &self.size_bytes())
            .field("cached_elements", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::super::block::FileIdentity;
    use super::*;

    fn small_cache() -> BlockCache {
        BlockCache::new(CacheConfig {
            max_heap_bytes: 100,
            min_evictable_size: 10,
            eviction_target_fraction: 0.75,
        })
    }

    /// One block per file, `size` bytes each.
    fn block(key: &str, size: u64) -> Block {
        Block::new(Arc::new(FileIdentity::new("bucket", key, size)), 0, 1024)
    }

    fn bytes(size: u64) -> Bytes {
        Bytes::from(vec![7u8; size as usize])
    }

    fn assert_accounting(cache: &BlockCache) {
        let sum: u64 = cache.entries.iter().map(|e| e.value().size()).sum();
        assert_eq!(cache.size_bytes(), sum);
        assert_eq!(cache.len(), cache.entries.len());
    }

    #[test]
    fn test_cache_put_and_get() {
        let cache = small_cache();
        let b = block("a", 20);

        assert!(cache.get(&b).is_none());
        assert!(cache.put(b.clone(), bytes(20)));

        let data = cache.get(&b).unwrap();
        assert_eq!(data.len(), 20);
        assert_eq!(cache.size_bytes(), 20);
        assert_eq!(cache.len(), 1);

        let stats = cache.stats();
        assert_eq!(
            stats.files["a"],
            FileCacheStats {
                hits: 1,
                misses: 1,
                evictions: 0
            }
        );
    }

    #[test]
    fn test_cache_hit_bumps_access_time() {
        let cache = small_cache();
        let a = block("a", 20);
        let b = block("b", 20);
        cache.put(a.clone(), bytes(20));
        cache.put(b.clone(), bytes(20));

        let before = cache.entries.get(&a).unwrap().access_time();
        cache.get(&a);
        let after = cache.entries.get(&a).unwrap().access_time();
        assert!(after > before);
        assert!(after > cache.entries.get(&b).unwrap().access_time());

        // Misses advance the clock too.
        cache.get(&block("c", 20));
        cache.get(&a);
        assert!(cache.entries.get(&a).unwrap().access_time() > after + 1);
    }

    #[test]
    fn test_duplicate_put_is_dropped() {
        let cache = small_cache();
        let b = block("a", 20);
        assert!(cache.put(b.clone(), Bytes::from(vec![1u8; 20])));
        assert!(!cache.put(b.clone(), Bytes::from(vec![2u8; 20])));

        assert_eq!(cache.get(&b).unwrap()[0], 1);
        assert_eq!(cache.size_bytes(), 20);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_eviction_in_lru_order() {
        let cache = small_cache();
        let a = block("a", 30);
        let b = block("b", 30);
        let c = block("c", 30);
        let d = block("d", 30);

        cache.put(a.clone(), bytes(30));
        cache.put(b.clone(), bytes(30));
        cache.put(c.clone(), bytes(30));
        cache.get(&a);

        // 120 > 100: free down to 75, i.e. at least 45 bytes, oldest first.
        cache.put(d.clone(), bytes(30));

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(!cache.contains(&c));
        assert!(cache.contains(&d));
        assert_eq!(cache.size_bytes(), 60);
        assert_accounting(&cache);

        let stats = cache.stats();
        assert_eq!(stats.files["b"].evictions, 1);
        assert_eq!(stats.files["c"].evictions, 1);
        assert_eq!(stats.totals().evictions, 2);
    }

    #[test]
    fn test_small_blocks_are_pinned() {
        let cache = small_cache();
        let big = block("big", 40);
        cache.put(big.clone(), bytes(40));

        let small: Vec<_> = (0..15).map(|i| block(&format!("small{}", i), 5)).collect();
        for b in &small {
            cache.put(b.clone(), bytes(5));
        }

        // 115 bytes: only the 40-byte block is eligible.
        assert!(!cache.contains(&big));
        assert!(small.iter().all(|b| cache.contains(b)));
        assert_eq!(cache.size_bytes(), 75);

        // Over the threshold with nothing eligible: stays over.
        for i in 15..25 {
            cache.put(block(&format!("small{}", i), 5), bytes(5));
        }
        assert_eq!(cache.size_bytes(), 125);
        assert_eq!(cache.evict(), 0);
        assert_accounting(&cache);
    }

    #[test]
    fn test_evict_below_target_is_noop() {
        let cache = small_cache();
        cache.put(block("a", 50), bytes(50));
        assert_eq!(cache.evict(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evict_is_single_flight() {
        let cache = small_cache();
        let a = block("a", 60);
        cache.put(a.clone(), bytes(60));

        let guard = cache.eviction_lock.lock();
        cache.put(block("b", 60), bytes(60));
        assert_eq!(cache.evict(), 0);
        assert_eq!(cache.size_bytes(), 120);
        drop(guard);

        assert_eq!(cache.evict(), 60);
        assert!(!cache.contains(&a));
        assert_accounting(&cache);
    }

    #[test]
    fn test_reset_stats_keeps_blocks() {
        let cache = small_cache();
        let b = block("a", 20);
        cache.put(b.clone(), bytes(20));
        cache.get(&b);

        cache.reset_stats();
        let stats = cache.stats();
        assert!(stats.files.is_empty());
        assert_eq!(stats.cached_bytes, 20);
        assert_eq!(stats.cached_elements, 1);
        assert_eq!(stats.utilization(), 0.2);
    }

    #[test]
    fn test_concurrent_put_same_block() {
        let cache = Arc::new(small_cache());
        let b = block("race", 20);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                let b = b.clone();
                thread::spawn(move || cache.put(b, Bytes::from(vec![i as u8; 20])))
            })
            .collect();
        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|inserted| *inserted)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size_bytes(), 20);
        assert_accounting(&cache);
    }

    #[test]
    fn test_concurrent_put_with_eviction_keeps_accounting() {
        let cache = Arc::new(BlockCache::new(CacheConfig {
            max_heap_bytes: 1000,
            min_evictable_size: 10,
            eviction_target_fraction: 0.75,
        }));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let size = if i % 20 == 0 { 5 } else { 50 };
                        let b = block(&format!("t{}-{}", t, i), size);
                        cache.put(b.clone(), bytes(size));
                        cache.get(&b);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_accounting(&cache);
        cache.evict();
        assert_accounting(&cache);
        assert!(cache.size_bytes() <= 1000);
    }
}
