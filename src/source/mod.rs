//! Log object source backed by the `object_store` crate
//!
//! Edge log objects are named `<distribution>.<YYYY-MM-DD-HH>.<unique>.gz`;
//! the date segment decides which [`DayBucket`] the object's records go to.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{ObjectStore, path::Path as StoragePath};
use std::sync::Arc;
use thiserror::Error;

use crate::bucket::DayBucket;
use crate::config::{SourceConfig, SourceProvider};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Source misconfigured: {0}")]
    Misconfigured(String),
}

/// Source result type
pub type Result<T> = std::result::Result<T, SourceError>;

/// A listed object and the day its name points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub key: String,
    pub date_hint: Option<DayBucket>,
    pub size: u64,
}

impl ObjectRef {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        let key = key.into();
        let date_hint = date_hint_from_key(&key);
        Self {
            key,
            date_hint,
            size,
        }
    }
}

/// Extract the day from `.../<dist>.<YYYY-MM-DD-HH>.<unique>.gz`
pub fn date_hint_from_key(key: &str) -> Option<DayBucket> {
    let filename = key.rsplit('/').next()?;
    let stamp = filename.split('.').nth(1)?;
    let (date, _hour) = stamp.rsplit_once('-')?;
    date.parse().ok()
}

#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Objects under `prefix`, sorted by key
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectRef>>;

    async fn fetch_bytes(&self, key: &str) -> Result<Bytes>;

    /// Object content as a chunk stream; defaults to a single chunk
    async fn fetch_stream(&self, key: &str) -> Result<BoxStream<'static, Result<Bytes>>> {
        let bytes = self.fetch_bytes(key).await?;
        Ok(stream::once(async move { Ok(bytes) }).boxed())
    }

    /// Remove a fully ingested object
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Object source wrapping any object_store backend
#[derive(Clone)]
pub struct ObjectStoreSource {
    store: Arc<dyn ObjectStore>,
    pub name: String,
}

impl ObjectStoreSource {
    /// Create new source with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// Create in-memory source for testing/development
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "edgelog-memory")
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        match config.provider {
            SourceProvider::S3 => {
                let bucket = config.bucket.as_deref().ok_or_else(|| {
                    SourceError::Misconfigured("S3 source needs a bucket".to_string())
                })?;
                let mut builder = AmazonS3Builder::new().with_bucket_name(bucket);
                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if let Some(access_key) = &config.access_key {
                    builder = builder.with_access_key_id(access_key);
                }
                if let Some(secret_key) = &config.secret_key {
                    builder = builder.with_secret_access_key(secret_key);
                }
                Ok(Self::new(Arc::new(builder.build()?), bucket))
            }
            SourceProvider::Local => {
                let root = config.root.as_ref().ok_or_else(|| {
                    SourceError::Misconfigured("local source needs a root directory".to_string())
                })?;
                let store = LocalFileSystem::new_with_prefix(root)?;
                Ok(Self::new(Arc::new(store), root.display().to_string()))
            }
            SourceProvider::Memory => Ok(Self::in_memory()),
        }
    }

    /// Upload bytes; used to seed local and in-memory sources
    pub async fn put(&self, key: &str, data: impl Into<Bytes>) -> Result<()> {
        let path = StoragePath::from(key);
        let data: Bytes = data.into();
        let size = data.len();
        self.store.put(&path, data.into()).await?;
        tracing::debug!(key, size, "Uploaded to source");
        Ok(())
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ObjectSource for ObjectStoreSource {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectRef>> {
        let prefix = (!prefix.is_empty()).then(|| StoragePath::from(prefix));
        let mut objects: Vec<ObjectRef> = self
            .store
            .list(prefix.as_ref())
            .map_ok(|meta| ObjectRef::new(meta.location.to_string(), meta.size))
            .try_collect()
            .await?;
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        tracing::info!(source = %self.name, objects = objects.len(), "Listed objects");
        Ok(objects)
    }

    async fn fetch_bytes(&self, key: &str) -> Result<Bytes> {
        let path = StoragePath::from(key);
        let bytes = self.store.get(&path).await?.bytes().await?;

        tracing::debug!(key, size = bytes.len(), "Downloaded from source");
        Ok(bytes)
    }

    async fn fetch_stream(&self, key: &str) -> Result<BoxStream<'static, Result<Bytes>>> {
        let path = StoragePath::from(key);
        let result = self.store.get(&path).await?;
        Ok(result.into_stream().map_err(SourceError::from).boxed())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = StoragePath::from(key);
        self.store.delete(&path).await?;
        tracing::info!(key, "Deleted source object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_hint_from_key() {
        assert_eq!(
            date_hint_from_key("logs/cdn.example.com/E2ABC.2023-05-01-07.a1b2c3d4.gz"),
            DayBucket::from_ymd(2023, 5, 1)
        );
        assert_eq!(
            date_hint_from_key("E2ABC.2023-12-31-23.ffff.gz"),
            DayBucket::from_ymd(2023, 12, 31)
        );
        assert_eq!(date_hint_from_key("logs/readme.txt"), None);
        assert_eq!(date_hint_from_key("E2ABC.not-a-date-00.gz"), None);
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_filtered() {
        let source = ObjectStoreSource::in_memory();
        source.put("logs/E1.2023-05-02-00.b.gz", b"b".to_vec()).await.unwrap();
        source.put("logs/E1.2023-05-01-00.a.gz", b"a".to_vec()).await.unwrap();
        source.put("other/E1.2023-05-01-00.c.gz", b"c".to_vec()).await.unwrap();

        let objects = source.list_objects("logs").await.unwrap();
        let keys: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["logs/E1.2023-05-01-00.a.gz", "logs/E1.2023-05-02-00.b.gz"]);
        assert_eq!(objects[0].date_hint, DayBucket::from_ymd(2023, 5, 1));
        assert_eq!(objects[0].size, 1);

        assert_eq!(source.list_objects("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_and_delete() {
        let source = ObjectStoreSource::in_memory();
        source.put("k.2023-05-01-00.x.gz", b"payload".to_vec()).await.unwrap();

        let bytes = source.fetch_bytes("k.2023-05-01-00.x.gz").await.unwrap();
        assert_eq!(&bytes[..], b"payload");

        let chunks: Vec<Bytes> = source
            .fetch_stream("k.2023-05-01-00.x.gz")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), b"payload");

        source.delete("k.2023-05-01-00.x.gz").await.unwrap();
        assert!(!source.exists("k.2023-05-01-00.x.gz").await.unwrap());
    }

    #[test]
    fn test_from_config_requires_bucket() {
        let config = SourceConfig {
            provider: SourceProvider::S3,
            ..SourceConfig::default()
        };
        assert!(matches!(
            ObjectStoreSource::from_config(&config),
            Err(SourceError::Misconfigured(_))
        ));
    }
}
