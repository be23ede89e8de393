//! Object store client trait.
//!
//! This module defines the [`ObjectStoreClient`] trait, the only capability the
//! index store needs from remote storage: paginated listing and byte-range GET.
//! No write or delete is required.

use std::ops::Range;

use async_trait::async_trait;
use bytes::Bytes;

use super::error::StoreResult;

/// Key and size of one listed object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Full object key, including the listing prefix.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
}

impl ObjectSummary {
    /// Create a new summary.
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

/// One page of a listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects in ascending key order.
    pub objects: Vec<ObjectSummary>,
    /// More objects follow after the last key of this page.
    pub is_truncated: bool,
}

/// Abstraction over the read side of an object store bound to one bucket.
///
/// Implementations:
/// - Production: [`S3ObjectStore`](super::S3ObjectStore) over aws-sdk-s3
/// - Testing: an in-memory mock
///
/// Timeouts and retries are the implementation's business; callers treat every
/// error as final.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Bucket (store location) this client reads from.
    fn bucket(&self) -> &str;

    /// List one page of objects under `prefix`.
    ///
    /// # Arguments
    ///
    /// * `prefix` - Key prefix to list under
    /// * `start_after` - Return only keys strictly greater than this
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let mut cursor = None;
    /// loop {
    ///     let page = client.list_objects("index/", cursor.as_deref()).await?;
    ///     // ... consume page.objects
    ///     if !page.is_truncated { break; }
    ///     cursor = page.objects.last().map(|o| o.key.clone());
    /// }
    /// ```
    async fn list_objects(&self, prefix: &str, start_after: Option<&str>) -> StoreResult<ListPage>;

    /// Read a byte range from an object.
    ///
    /// # Arguments
    ///
    /// * `key` - Object key
    /// * `range` - Byte range to read (start inclusive, end exclusive)
    ///
    /// # Returns
    ///
    /// The bytes of the range. A short response is returned as-is; callers
    /// check the length.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Object doesn't exist
    /// - Range is invalid
    /// - Network/permission issues
    async fn get_range(&self, key: &str, range: Range<u64>) -> StoreResult<Bytes>;
}
