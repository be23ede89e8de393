//! aws-sdk-s3 backed object store client.

use std::ops::Range;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::trace;

use super::client::{ListPage, ObjectStoreClient, ObjectSummary};
use super::config::StoreConfig;
use super::error::{StoreError, StoreResult};

/// [`ObjectStoreClient`] over one S3 bucket.
///
/// Retries and timeouts come from the SDK's configuration.
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from the SDK's default credential and region chain.
    ///
    /// `config.region` overrides the region. A custom `config.endpoint` (LocalStack,
    /// MinIO) switches to path-style addressing.
    pub async fn new(config: &StoreConfig) -> StoreResult<Self> {
        if config.bucket.is_empty() {
            return Err(StoreError::config("bucket name cannot be empty"));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self::from_client(
            Client::from_conf(builder.build()),
            config.bucket.clone(),
        ))
    }

    /// Wrap an already configured SDK client.
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStoreClient for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(&self, prefix: &str, start_after: Option<&str>) -> StoreResult<ListPage> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_start_after(start_after.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                StoreError::remote("list_objects", prefix, DisplayErrorContext(&e).to_string())
            })?;

        let objects = resp
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                let size = object.size().unwrap_or(0).max(0) as u64;
                Some(ObjectSummary::new(key, size))
            })
            .collect::<Vec<_>>();

        trace!(prefix, start_after = ?start_after, objects = objects.len(), "Listed S3 page");
        Ok(ListPage {
            objects,
            is_truncated: resp.is_truncated().unwrap_or(false),
        })
    }

    async fn get_range(&self, key: &str, range: Range<u64>) -> StoreResult<Bytes> {
        if range.is_empty() {
            return Ok(Bytes::new());
        }

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(format!("bytes={}-{}", range.start, range.end - 1))
            .send()
            .await
            .map_err(|e| StoreError::remote("get_range", key, DisplayErrorContext(&e).to_string()))?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::remote("get_range", key, e.to_string()))?;
        Ok(data.into_bytes())
    }
}
