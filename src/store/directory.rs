//! Read-only directories of index files.
//!
//! [`Directory`] is the namespace contract the search library consumes: list the
//! files, size them, open readers over them. [`S3Directory`] serves the objects
//! under an S3 prefix through the shared block cache; the local filesystem
//! backend lives in [`super::local`].

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::block::FileIdentity;
use super::cache::BlockCache;
use super::client::ObjectStoreClient;
use super::config::StoreConfig;
use super::error::{StoreError, StoreResult};
use super::reader::{BufferedReader, RandomAccessReader, RemoteSource};
use super::stats::{ReadStats, StoreStats};

/// Namespace of index files.
///
/// Write-path operations fail with [`StoreError::Unsupported`] unless an
/// implementation overrides them.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Names of all files, sorted.
    async fn list_all(&self) -> StoreResult<Vec<String>>;

    /// Size of `name` in bytes.
    fn file_length(&self, name: &str) -> StoreResult<u64>;

    /// Reader over the whole of `name`.
    fn open(&self, name: &str) -> StoreResult<Box<dyn RandomAccessReader>>;

    /// Remove a file.
    fn delete_file(&self, _name: &str) -> StoreResult<()> {
        Err(StoreError::Unsupported {
            operation: "delete_file",
        })
    }

    /// Rename a file.
    fn rename(&self, _source: &str, _dest: &str) -> StoreResult<()> {
        Err(StoreError::Unsupported {
            operation: "rename",
        })
    }

    /// Create a file for writing.
    fn create_output(&self, _name: &str) -> StoreResult<Box<dyn Write + Send>> {
        Err(StoreError::Unsupported {
            operation: "create_output",
        })
    }

    /// Flush files to durable storage.
    fn sync(&self, _names: &[String]) -> StoreResult<()> {
        Err(StoreError::Unsupported { operation: "sync" })
    }

    /// Flush directory metadata to durable storage.
    fn sync_metadata(&self) -> StoreResult<()> {
        Err(StoreError::Unsupported {
            operation: "sync_metadata",
        })
    }
}

/// Directory over the objects under `{prefix}/` in one bucket.
///
/// The listing is fetched once, on the first [`list_all`](Directory::list_all),
/// and kept for the directory's lifetime. `file_length` and `open` fail with
/// `NotFound` until then.
///
/// Every directory sharing a cache must use the same block size.
///
/// # Example
///
/// ```rust,ignore
/// let cache = Arc::new(BlockCache::new(config.cache_config()));
/// let dir = S3Directory::new(client, cache, config)?;
///
/// let names = dir.list_all().await?;
/// let mut input = dir.open("segments_1")?;
/// let version = input.read_byte().await?;
///
/// dir.report_stats();
/// ```
pub struct S3Directory {
    client: Arc<dyn ObjectStoreClient>,
    cache: Arc<BlockCache>,
    config: StoreConfig,
    read_stats: Arc<ReadStats>,
    files: OnceCell<BTreeMap<String, Arc<FileIdentity>>>,
}

impl S3Directory {
    /// Create a directory over `config.prefix` in the client's bucket.
    ///
    /// # Errors
    ///
    /// `Config` if `config` fails [`StoreConfig::validate`].
    pub fn new(
        client: Arc<dyn ObjectStoreClient>,
        cache: Arc<BlockCache>,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        config.validate()?;
        info!(
            bucket = client.bucket(),
            prefix = %config.prefix,
            block_size = config.block_size,
            "Opening S3 index directory"
        );
        Ok(Self {
            client,
            cache,
            config,
            read_stats: Arc::new(ReadStats::new()),
            files: OnceCell::new(),
        })
    }

    /// The shared block cache.
    pub fn cache(&self) -> &Arc<BlockCache> {
        &self.cache
    }

    /// Byte counters of every reader opened from this directory.
    pub fn read_stats(&self) -> &Arc<ReadStats> {
        &self.read_stats
    }

    /// Identity of a listed file.
    pub fn file_identity(&self, name: &str) -> StoreResult<Arc<FileIdentity>> {
        self.files
            .get()
            .and_then(|files| files.get(name))
            .cloned()
            .ok_or_else(|| StoreError::not_found(name))
    }

    /// Current cache and read stats.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            cache: self.cache.stats(),
            reads: self.read_stats.snapshot(),
        }
    }

    /// Log the current stats and, if configured, clear them.
    pub fn report_stats(&self) -> StoreStats {
        let stats = self.stats();
        stats.log();
        if self.config.clear_stats_after_report {
            self.cache.reset_stats();
            self.read_stats.reset();
        }
        stats
    }

    async fn load_listing(&self) -> StoreResult<BTreeMap<String, Arc<FileIdentity>>> {
        let prefix = self.config.listing_prefix();
        let bucket = self.client.bucket().to_string();
        let mut files = BTreeMap::new();
        let mut start_after: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .client
                .list_objects(&prefix, start_after.as_deref())
                .await?;
            pages += 1;
            let last_key = page.objects.last().map(|o| o.key.clone());

            for object in page.objects {
                let Some(name) = object.key.strip_prefix(prefix.as_str()) else {
                    continue;
                };
                // Folder marker.
                if name.is_empty() {
                    continue;
                }
                let file = FileIdentity::new(&bucket, &object.key, object.size);
                files.insert(name.to_string(), Arc::new(file));
            }

            match (page.is_truncated, last_key) {
                (true, Some(key)) => start_after = Some(key),
                _ => break,
            }
        }

        info!(
            bucket = %bucket,
            prefix = %prefix,
            files = files.len(),
            pages,
            "Listed S3 index directory"
        );
        Ok(files)
    }
}

#[async_trait]
impl Directory for S3Directory {
    async fn list_all(&self) -> StoreResult<Vec<String>> {
        let files = self
            .files
            .get_or_try_init(|| self.load_listing())
            .await?;
        Ok(files.keys().cloned().collect())
    }

    fn file_length(&self, name: &str) -> StoreResult<u64> {
        Ok(self.file_identity(name)?.size)
    }

    fn open(&self, name: &str) -> StoreResult<Box<dyn RandomAccessReader>> {
        let file = self.file_identity(name)?;
        debug!(name, key = %file.key, size = file.size, "Opening S3 file");

        let description = format!("{}/{}", file.location, file.key);
        let size = file.size;
        let source = RemoteSource::new(
            self.client.clone(),
            self.cache.clone(),
            self.read_stats.clone(),
            file,
            self.config.block_size,
        );
        Ok(Box::new(BufferedReader::new(
            source,
            description,
            0,
            size,
            self.config.buffer_sizing(),
        )))
    }
}

impl std::fmt::Debug for S3Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Directory")
            .field("bucket", &self.client.bucket())
            .field("prefix", &self.config.prefix)
            .field("listed", &self.files.initialized())
            .finish()
    }
}
