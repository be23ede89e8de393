//! Mock object store for testing.
//!
//! In-memory [`ObjectStoreClient`] with S3-like listing semantics, a request
//! log for asserting coalescing, and fault injection for short responses.

use std::collections::BTreeMap;
use std::ops::Range;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use super::client::{ListPage, ObjectStoreClient, ObjectSummary};
use super::error::{StoreError, StoreResult};

/// Default number of keys per listing page.
const DEFAULT_PAGE_SIZE: usize = 1000;

/// In-memory mock object store bound to one bucket.
///
/// # Example
///
/// ```rust,ignore
/// let mock = MockObjectStore::new("bucket");
/// mock.put("index/segments_1", "hello");
///
/// let partial = mock.get_range("index/segments_1", 0..2).await?;
/// assert_eq!(&partial[..], b"he");
/// assert_eq!(mock.requests().len(), 1);
/// ```
pub struct MockObjectStore {
    bucket: String,
    /// Storage for objects: key -> data
    objects: RwLock<BTreeMap<String, Bytes>>,
    page_size: usize,
    /// Every `get_range` call, in order.
    requests: Mutex<Vec<(String, Range<u64>)>>,
    /// Cap on the bytes returned by `get_range`.
    truncate_to: Mutex<Option<usize>>,
    list_calls: Mutex<usize>,
}

impl MockObjectStore {
    /// Create a new empty mock store.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
            requests: Mutex::new(Vec::new()),
            truncate_to: Mutex::new(None),
            list_calls: Mutex::new(0),
        }
    }

    /// Limit listing pages to `page_size` keys.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Store an object.
    pub fn put(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.objects.write().insert(key.into(), data.into());
    }

    /// Return at most `limit` bytes from every range request.
    pub fn set_truncate_responses(&self, limit: Option<usize>) {
        *self.truncate_to.lock() = limit;
    }

    /// Range requests issued so far.
    pub fn requests(&self) -> Vec<(String, Range<u64>)> {
        self.requests.lock().clone()
    }

    /// Ranges requested so far, without keys.
    pub fn requested_ranges(&self) -> Vec<Range<u64>> {
        self.requests
            .lock()
            .iter()
            .map(|(_, range)| range.clone())
            .collect()
    }

    /// Forget recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    /// Number of listing pages served.
    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock()
    }
}

#[async_trait]
impl ObjectStoreClient for MockObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(&self, prefix: &str, start_after: Option<&str>) -> StoreResult<ListPage> {
        *self.list_calls.lock() += 1;
        let objects = self.objects.read();
        let mut matching = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| start_after.map_or(true, |after| key.as_str() > after))
            .map(|(key, data)| ObjectSummary::new(key.clone(), data.len() as u64));

        let page: Vec<ObjectSummary> = matching.by_ref().take(self.page_size).collect();
        let is_truncated = matching.next().is_some();
        Ok(ListPage {
            objects: page,
            is_truncated,
        })
    }

    async fn get_range(&self, key: &str, range: Range<u64>) -> StoreResult<Bytes> {
        self.requests.lock().push((key.to_string(), range.clone()));

        let objects = self.objects.read();
        let data = objects.get(key).ok_or_else(|| {
            StoreError::remote("get_range", key, format!("NoSuchKey: {}", key))
        })?;

        let start = range.start as usize;
        let end = range.end as usize;
        if start > end || end > data.len() {
            return Err(StoreError::invalid_range(
                key,
                range.start,
                range.end.saturating_sub(range.start),
                data.len() as u64,
            ));
        }

        let end = match *self.truncate_to.lock() {
            Some(limit) => end.min(start + limit),
            None => end,
        };
        Ok(data.slice(start..end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_range_request() {
        let client = MockObjectStore::new("bucket");
        client.put("test/file.txt", "hello world");

        let data = client.get_range("test/file.txt", 0..5).await.unwrap();
        assert_eq!(&data[..], b"hello");

        let data = client.get_range("test/file.txt", 6..11).await.unwrap();
        assert_eq!(&data[..], b"world");

        assert_eq!(client.requested_ranges(), vec![0..5, 6..11]);
    }

    #[tokio::test]
    async fn test_mock_not_found_and_invalid_range() {
        let client = MockObjectStore::new("bucket");
        client.put("test/file.txt", "hello");

        let result = client.get_range("nonexistent", 0..1).await;
        assert!(matches!(result, Err(StoreError::Remote { .. })));

        let result = client.get_range("test/file.txt", 0..100).await;
        assert!(matches!(result, Err(StoreError::InvalidRange { .. })));
    }

    #[tokio::test]
    async fn test_mock_truncated_response() {
        let client = MockObjectStore::new("bucket");
        client.put("f", "hello world");
        client.set_truncate_responses(Some(3));

        let data = client.get_range("f", 2..9).await.unwrap();
        assert_eq!(&data[..], b"llo");
    }

    #[tokio::test]
    async fn test_mock_listing_pages() {
        let client = MockObjectStore::new("bucket").with_page_size(2);
        for name in ["a", "b", "c"] {
            client.put(format!("idx/{}", name), name);
        }
        client.put("other/x", "x");

        let page = client.list_objects("idx/", None).await.unwrap();
        let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["idx/a", "idx/b"]);
        assert!(page.is_truncated);

        let page = client.list_objects("idx/", Some("idx/b")).await.unwrap();
        assert_eq!(page.objects, vec![ObjectSummary::new("idx/c", 1)]);
        assert!(!page.is_truncated);
        assert_eq!(client.list_calls(), 2);
    }
}
