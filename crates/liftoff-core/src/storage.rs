//! Artifact download from object storage.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::types::ArtifactRef;

/// Source of artifact bytes.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Stream the artifact into `sink`, returning the number of bytes written.
    ///
    /// A missing object fails with [`StorageError::NotFound`].
    async fn fetch(
        &self,
        artifact: &ArtifactRef,
        sink: &mut tokio::fs::File,
    ) -> Result<u64, StorageError>;
}

/// [`ArtifactSource`] backed by `object_store`.
///
/// One store is kept per bucket. Buckets without a registered store get an
/// Amazon S3 client built from [`StorageConfig`] and the standard AWS
/// environment variables on first use.
pub struct ObjectStoreSource {
    config: StorageConfig,
    stores: DashMap<String, Arc<dyn ObjectStore>>,
}

impl ObjectStoreSource {
    /// Create a source that builds S3 clients on demand.
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            stores: DashMap::new(),
        }
    }

    /// Serve `bucket` from a pre-configured store.
    #[must_use]
    pub fn with_store(self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.insert(bucket.into(), store);
        self
    }

    fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        if let Some(store) = self.stores.get(bucket) {
            return Ok(store.value().clone());
        }

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

        if let Some(endpoint) = &self.config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(self.config.allow_http || endpoint.starts_with("http://"));
        }
        if let Some(region) = &self.config.region {
            builder = builder.with_region(region);
        }
        if let Some(key_id) = &self.config.access_key_id {
            builder = builder.with_access_key_id(key_id);
        }
        if let Some(secret) = &self.config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }

        let store: Arc<dyn ObjectStore> = Arc::new(
            builder
                .build()
                .map_err(|e| StorageError::ClientCreation(e.to_string()))?,
        );

        info!(bucket = %bucket, "S3 client created");
        self.stores.insert(bucket.to_owned(), store.clone());
        Ok(store)
    }
}

fn classify(err: object_store::Error) -> StorageError {
    match err {
        object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
        other => StorageError::backend(other.to_string()),
    }
}

#[async_trait]
impl ArtifactSource for ObjectStoreSource {
    async fn fetch(
        &self,
        artifact: &ArtifactRef,
        sink: &mut tokio::fs::File,
    ) -> Result<u64, StorageError> {
        let store = self.store_for(artifact.bucket())?;
        let path =
            ObjectPath::parse(artifact.key()).map_err(|e| StorageError::InvalidPath(e.to_string()))?;

        debug!(bucket = %artifact.bucket(), key = %artifact.key(), "fetching artifact");

        let result = store.get(&path).await.map_err(classify)?;
        let mut stream = result.into_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(classify)?;
            sink.write_all(&chunk).await?;
            #[allow(clippy::as_conversions)]
            let len = chunk.len() as u64;
            written += len;
        }
        sink.flush().await?;

        Ok(written)
    }
}
