//! # S3 Index Store
//!
//! This module lets a search index whose files live in S3 be read as if it were
//! a local random-access directory, fetching only the byte ranges queries touch.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Directory (S3Directory | LocalDirectory)                       │
//! │  └─ list_all / file_length / open                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  RandomAccessReader (BufferedReader<S: RangeSource>)            │
//! │  └─ cursor + sequential buffer, seek / slice / clone            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  RemoteSource                                                   │
//! │  ├─ BlockPartitioner: byte range → 64 MiB blocks                │
//! │  ├─ BlockCache (shared, size-bounded, global LRU)               │
//! │  └─ ObjectStoreClient: one coalesced range GET per miss run     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let config = StoreConfig::from_env()?;
//! let client = Arc::new(S3ObjectStore::new(&config).await?);
//!
//! // One cache per process, shared by every directory.
//! let cache = Arc::new(BlockCache::new(config.cache_config()));
//! let dir = S3Directory::new(client, cache, config)?;
//!
//! for name in dir.list_all().await? {
//!     let mut input = dir.open(&name)?;
//!     let mut header = [0u8; 16];
//!     input.read(&mut header).await?;
//! }
//!
//! // After each request.
//! dir.report_stats();
//! ```

mod block;
mod cache;
mod client;
mod config;
mod directory;
mod error;
mod local;
mod reader;
#[cfg(feature = "aws")]
mod s3_client;
mod stats;

pub use block::{Block, BlockPartitioner, FileIdentity};
pub use cache::{BlockCache, CacheConfig, CacheEntry, CacheStats, FileCacheStats};
pub use client::{ListPage, ObjectStoreClient, ObjectSummary};
pub use config::{
    StoreConfig, DEFAULT_BLOCK_SIZE, DEFAULT_BUFFER_BYTES, DEFAULT_EVICTION_TARGET_FRACTION,
    DEFAULT_MAX_HEAP_BYTES, DEFAULT_MIN_EVICTABLE_SIZE, MIN_BUFFER_BYTES,
};
pub use directory::{Directory, S3Directory};
pub use error::{StoreError, StoreResult};
pub use local::{LocalDirectory, LocalReader, LocalSource};
pub use reader::{
    BufferSizing, BufferedReader, RandomAccessReader, RangeSource, RemoteReader, RemoteSource,
};
#[cfg(feature = "aws")]
pub use s3_client::S3ObjectStore;
pub use stats::{ReadStats, ReadStatsSnapshot, StoreStats};

#[cfg(test)]
pub(crate) mod mock_client;
