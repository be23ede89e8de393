//! Configuration for the S3 index store.
//!
//! All tunables are named, defaulted options. They can be built in code with the
//! `with_*` setters, deserialized from JSON, or read from the environment of the
//! hosting request handler.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::cache::CacheConfig;
use super::error::{StoreError, StoreResult};
use super::reader::BufferSizing;

/// Default block size (64 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

/// Blocks smaller than this are never evicted (32 MiB).
pub const DEFAULT_MIN_EVICTABLE_SIZE: u64 = 32 * 1024 * 1024;

/// Cached bytes above this trigger eviction (1792 MiB).
pub const DEFAULT_MAX_HEAP_BYTES: u64 = 1792 * 1024 * 1024;

/// Eviction frees down to this fraction of the heap threshold.
pub const DEFAULT_EVICTION_TARGET_FRACTION: f64 = 0.75;

/// Upper bound of the default per-reader buffer (4 MiB).
pub const DEFAULT_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// Lower bound of the default per-reader buffer.
pub const MIN_BUFFER_BYTES: usize = 8;

/// Configuration for an S3-backed index directory.
///
/// # Example
///
/// ```rust,ignore
/// let config = StoreConfig::new("my-index-bucket", "msmarco-passage")
///     .with_max_heap_bytes(512 * 1024 * 1024)
///     .with_clear_stats_after_report(true);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// S3 bucket name.
    pub bucket: String,

    /// Prefix under which the index files live.
    ///
    /// Files are listed from `{prefix}/`. An empty prefix lists the whole bucket.
    pub prefix: String,

    /// Partition granularity for caching and eviction.
    ///
    /// Default: 64 MiB
    pub block_size: u64,

    /// Cached blocks smaller than this are pinned.
    ///
    /// Default: 32 MiB
    pub min_evictable_size: u64,

    /// Eviction trigger in cached bytes.
    ///
    /// Default: 1792 MiB
    pub max_heap_bytes: u64,

    /// Fraction of `max_heap_bytes` an eviction pass frees down to.
    ///
    /// Default: 0.75
    pub eviction_target_fraction: f64,

    /// Upper bound of a reader's default buffer.
    pub default_buffer_bytes: usize,

    /// Lower bound of a reader's default buffer.
    pub min_buffer_bytes: usize,

    /// Clear cache and read stats after each report.
    pub clear_stats_after_report: bool,

    /// Custom S3 endpoint, e.g. LocalStack or MinIO.
    pub endpoint: Option<String>,

    /// AWS region; the SDK default chain is used when unset.
    pub region: Option<String>,
}

impl StoreConfig {
    /// Create a new configuration with defaults.
    ///
    /// # Arguments
    ///
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Prefix of the index files
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Build a configuration from environment variables.
    ///
    /// `INDEX_BUCKET` and `INDEX_KEY` name the index location and
    /// `CLEAR_CACHE_STATS` toggles stats clearing. The `S3_INDEX_*` variables
    /// override the numeric defaults.
    pub fn from_env() -> StoreResult<Self> {
        let mut config = Self::new(
            env::var("INDEX_BUCKET").unwrap_or_default(),
            env::var("INDEX_KEY").unwrap_or_default(),
        );

        if let Ok(raw) = env::var("CLEAR_CACHE_STATS") {
            config.clear_stats_after_report = parse_flag(&raw);
        }
        if let Some(v) = env_parse("S3_INDEX_BLOCK_SIZE")? {
            config.block_size = v;
        }
        if let Some(v) = env_parse("S3_INDEX_MIN_EVICTABLE_SIZE")? {
            config.min_evictable_size = v;
        }
        if let Some(v) = env_parse("S3_INDEX_MAX_HEAP_BYTES")? {
            config.max_heap_bytes = v;
        }
        if let Some(v) = env_parse("S3_INDEX_EVICTION_TARGET")? {
            config.eviction_target_fraction = v;
        }
        if let Some(v) = env_parse("S3_INDEX_DEFAULT_BUFFER_BYTES")? {
            config.default_buffer_bytes = v;
        }
        if let Some(v) = env_parse("S3_INDEX_MIN_BUFFER_BYTES")? {
            config.min_buffer_bytes = v;
        }
        config.endpoint = env::var("S3_INDEX_ENDPOINT").ok();
        config.region = env::var("S3_INDEX_REGION").ok();

        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from JSON, filling absent fields with defaults.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values are usable.
    pub fn validate(&self) -> StoreResult<()> {
        if self.block_size == 0 {
            return Err(StoreError::config("block_size must be positive"));
        }
        if !(self.eviction_target_fraction > 0.0 && self.eviction_target_fraction <= 1.0) {
            return Err(StoreError::config(format!(
                "eviction_target_fraction must be in (0, 1], got {}",
                self.eviction_target_fraction
            )));
        }
        if self.min_buffer_bytes == 0 || self.min_buffer_bytes > self.default_buffer_bytes {
            return Err(StoreError::config(format!(
                "min_buffer_bytes ({}) must be positive and not exceed default_buffer_bytes ({})",
                self.min_buffer_bytes, self.default_buffer_bytes
            )));
        }
        Ok(())
    }

    /// Set the block size.
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the minimum evictable block size.
    pub fn with_min_evictable_size(mut self, min_evictable_size: u64) -> Self {
        self.min_evictable_size = min_evictable_size;
        self
    }

    /// Set the eviction threshold.
    pub fn with_max_heap_bytes(mut self, max_heap_bytes: u64) -> Self {
        self.max_heap_bytes = max_heap_bytes;
        self
    }

    /// Set the post-eviction target fraction.
    pub fn with_eviction_target_fraction(mut self, fraction: f64) -> Self {
        self.eviction_target_fraction = fraction;
        self
    }

    /// Set the reader buffer bounds.
    pub fn with_buffer_bytes(mut self, min_buffer_bytes: usize, default_buffer_bytes: usize) -> Self {
        self.min_buffer_bytes = min_buffer_bytes;
        self.default_buffer_bytes = default_buffer_bytes;
        self
    }

    /// Clear stats after each report.
    pub fn with_clear_stats_after_report(mut self, clear: bool) -> Self {
        self.clear_stats_after_report = clear;
        self
    }

    /// Use a custom S3 endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Prefix passed to the object listing: `{prefix}/`, or empty for the bucket root.
    pub fn listing_prefix(&self) -> String {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", prefix)
        }
    }

    /// The part of the configuration the block cache needs.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_heap_bytes: self.max_heap_bytes,
            min_evictable_size: self.min_evictable_size,
            eviction_target_fraction: self.eviction_target_fraction,
        }
    }

    /// Bounds for reader buffer sizes.
    pub fn buffer_sizing(&self) -> BufferSizing {
        BufferSizing {
            min_bytes: self.min_buffer_bytes,
            default_bytes: self.default_buffer_bytes,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: String::new(),
            block_size: DEFAULT_BLOCK_SIZE,
            min_evictable_size: DEFAULT_MIN_EVICTABLE_SIZE,
            max_heap_bytes: DEFAULT_MAX_HEAP_BYTES,
            eviction_target_fraction: DEFAULT_EVICTION_TARGET_FRACTION,
            default_buffer_bytes: DEFAULT_BUFFER_BYTES,
            min_buffer_bytes: MIN_BUFFER_BYTES,
            clear_stats_after_report: false,
            endpoint: None,
            region: None,
        }
    }
}

/// `true` in any case is set; anything else is unset.
fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

fn env_parse<T: FromStr>(name: &str) -> StoreResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| StoreError::config(format!("{}={:?}: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}
