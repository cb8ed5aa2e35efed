//! Object storage for release artifacts.
//!
//! hkdist keeps two stores: the dist store holding gzipped executables
//! (`{cmd}-{ver}-{plat}.gz`) and the patch store holding hkdiff files keyed
//! by their SHA-1. Both are accessed through [`ObjectStore`]; clients
//! download straight from the URL returned by [`ObjectStore::url`].

pub mod s3;

use crate::error::{HkError, Result, StorageError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

pub use s3::S3Storage;

/// Trait for object storage operations
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object, replacing any previous content
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;

    /// Fetch a whole object
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Check if an object exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete an object
    async fn delete(&self, key: &str) -> Result<()>;

    /// Public download URL of an object
    fn url(&self, key: &str) -> String;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Reject keys that could escape the store or need URL escaping
pub fn validate_key(key: &str) -> Result<()> {
    let ok = !key.is_empty()
        && !key.starts_with('/')
        && !key.split('/').any(|part| part.is_empty() || part == "." || part == "..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '/'));
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidPath {
            path: key.to_string(),
        }
        .into())
    }
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// File system storage implementation
#[derive(Debug)]
pub struct FilesystemStorage {
    base_path: PathBuf,
    public_url: Option<String>,
}

impl FilesystemStorage {
    /// Create a new filesystem storage rooted at `base_path`
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        if !base_path.exists() {
            std::fs::create_dir_all(&base_path).map_err(StorageError::from)?;
        }

        Ok(Self {
            base_path,
            public_url: None,
        })
    }

    /// Serve objects from `public_url` instead of `file://` URLs
    pub fn with_public_url(mut self, public_url: impl Into<String>) -> Self {
        self.public_url = Some(public_url.into());
        self
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl ObjectStore for FilesystemStorage {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(StorageError::from)?;
        }

        // Write then rename so readers never see a partial object; every put
        // gets its own temp file
        let mut tmp = path.clone().into_os_string();
        tmp.push(format!(".{}.partial", uuid::Uuid::new_v4().simple()));
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, &data).await.map_err(StorageError::from)?;
        fs::rename(&tmp, &path).await.map_err(StorageError::from)?;

        tracing::debug!(key, size = data.len(), "Stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::not_found(key).into()
            } else {
                HkError::Storage(e.into())
            }
        })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Ok(fs::try_exists(&path).await.map_err(StorageError::from)?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::not_found(key).into()
            } else {
                HkError::Storage(e.into())
            }
        })
    }

    fn url(&self, key: &str) -> String {
        match &self.public_url {
            Some(base) => join_url(base, key),
            None => format!("file://{}", self.base_path.join(key).display()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

/// Where an object store lives and how it is exposed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `s3://bucket[/prefix]` or a local directory
    pub location: String,
    /// Base URL clients download from; derived from the location when unset
    pub public_url: Option<String>,
    /// S3 region (defaults to the AWS environment, then us-east-1)
    pub region: Option<String>,
    /// Custom S3 endpoint for S3-compatible services
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub force_path_style: bool,
}

impl StorageConfig {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Default::default()
        }
    }

    pub fn with_public_url(mut self, public_url: impl Into<String>) -> Self {
        self.public_url = Some(public_url.into());
        self
    }

    /// Split an `s3://bucket/prefix` location, `None` for filesystem locations
    pub fn s3_location(&self) -> Option<(String, Option<String>)> {
        let rest = self.location.strip_prefix("s3://")?;
        let rest = rest.trim_end_matches('/');
        match rest.split_once('/') {
            Some((bucket, prefix)) => Some((bucket.to_string(), Some(prefix.to_string()))),
            None => Some((rest.to_string(), None)),
        }
    }
}

/// Open the store described by `config`
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    if config.location.is_empty() {
        return Err(HkError::config("object store location is empty"));
    }

    if let Some((bucket, prefix)) = config.s3_location() {
        if bucket.is_empty() {
            return Err(HkError::config(format!(
                "bad s3 location {:?}",
                config.location
            )));
        }
        let store = S3Storage::new(&bucket, prefix, config).await?;
        return Ok(Arc::new(store));
    }

    let mut store = FilesystemStorage::new(&config.location)?;
    if let Some(public_url) = &config.public_url {
        store = store.with_public_url(public_url.clone());
    }
    Ok(Arc::new(store))
}
