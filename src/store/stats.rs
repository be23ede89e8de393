//! Read accounting and stats reporting.
//!
//! Cache counters live in the cache itself; this module adds the byte counts
//! seen by readers and renders both for the hosting request handler, which logs
//! them after each request.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, enabled, trace, Level};

use super::cache::CacheStats;

/// Bytes served to callers versus bytes fetched from the remote store.
#[derive(Debug, Default)]
pub struct ReadStats {
    bytes_read: AtomicU64,
    bytes_fetched: AtomicU64,
    remote_requests: AtomicU64,
}

impl ReadStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch(&self, bytes: u64) {
        self.bytes_fetched.fetch_add(bytes, Ordering::Relaxed);
        self.remote_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values.
    pub fn snapshot(&self) -> ReadStatsSnapshot {
        ReadStatsSnapshot {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
            remote_requests: self.remote_requests.load(Ordering::Relaxed),
        }
    }

    /// Zero all counters.
    pub fn reset(&self) {
        self.bytes_read.store(0, Ordering::Relaxed);
        self.bytes_fetched.store(0, Ordering::Relaxed);
        self.remote_requests.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`ReadStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadStatsSnapshot {
    /// Bytes copied into caller buffers.
    pub bytes_read: u64,
    /// Bytes downloaded by range requests.
    pub bytes_fetched: u64,
    /// Number of range requests issued.
    pub remote_requests: u64,
}

/// Everything a request handler reports after a request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreStats {
    /// Block cache counters and totals.
    pub cache: CacheStats,
    /// Reader byte counts.
    pub reads: ReadStatsSnapshot,
}

impl StoreStats {
    /// Log a summary at debug level and, when trace is enabled, a per-file table.
    pub fn log(&self) {
        let totals = self.cache.totals();
        debug!(
            hits = totals.hits,
            misses = totals.misses,
            evictions = totals.evictions,
            cached_bytes = self.cache.cached_bytes,
            cached_elements = self.cache.cached_elements,
            bytes_read = self.reads.bytes_read,
            bytes_fetched = self.reads.bytes_fetched,
            remote_requests = self.reads.remote_requests,
            "Index store stats"
        );

        if !enabled!(Level::TRACE) {
            return;
        }
        for line in self.table() {
            trace!("{}", line);
        }
    }

    /// Per-file hit/miss/eviction table followed by the totals.
    pub fn table(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.cache.files.len() + 3);
        lines.push(format!(
            "{:<20} {:>10} {:>10} {:>10}",
            "Key", "Hits", "Misses", "Evictions"
        ));
        for (key, s) in &self.cache.files {
            lines.push(format!(
                "{:<20} {:>10} {:>10} {:>10}",
                key, s.hits, s.misses, s.evictions
            ));
        }
        lines.push(format!(
            "Total cache size={}, elements={}",
            self.cache.cached_bytes, self.cache.cached_elements
        ));
        lines.push(format!(
            "Total bytes read from S3: {}, total bytes read: {}",
            self.reads.bytes_fetched, self.reads.bytes_read
        ));
        lines
    }
}
