//! S3 object store.

use super::{join_url, validate_key, ObjectStore, StorageConfig};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ChecksumAlgorithm, ObjectCannedAcl};
use aws_sdk_s3::Client;
use tracing::instrument;

/// Objects in an S3 bucket, published world-readable
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    public_url: String,
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

impl S3Storage {
    pub async fn new(bucket: &str, prefix: Option<String>, config: &StorageConfig) -> Result<Self> {
        if config.access_key_id.is_some() != config.secret_access_key.is_some() {
            return Err(crate::HkError::config(
                "s3 config requires both access_key_id and secret_access_key when either is set",
            ));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if shared.region().is_none() {
            builder = builder.region(aws_config::Region::new("us-east-1"));
        }
        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            let credentials = aws_sdk_s3::config::Credentials::new(
                key_id.clone(),
                secret.clone(),
                None,
                None,
                "hkdist-config",
            );
            builder = builder.credentials_provider(credentials);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        let prefix = prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        let public_url = match &config.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => match (&config.endpoint, config.force_path_style) {
                (Some(endpoint), true) => join_url(endpoint, bucket),
                _ => format!("https://{}.s3.amazonaws.com", bucket),
            },
        };

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
            prefix,
            public_url,
        })
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, key),
            None => key.to_string(),
        }
    }

    fn map_sdk_error<E>(err: SdkError<E>, key: &str) -> crate::HkError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if let SdkError::ServiceError(ref service_err) = err
            && service_err.raw().status().as_u16() == 404
        {
            return StorageError::not_found(key).into();
        }
        StorageError::backend("s3", DisplayErrorContext(&err).to_string()).into()
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        validate_key(key)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .acl(ObjectCannedAcl::PublicRead)
            .content_disposition("attachment")
            .checksum_algorithm(ChecksumAlgorithm::Sha256)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        validate_key(key)?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::backend("s3", e.to_string()))?
            .into_bytes();
        Ok(bytes.to_vec())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = Self::map_sdk_error(err, key);
                if err.is_not_found() { Ok(false) } else { Err(err) }
            }
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete(&self, key: &str) -> Result<()> {
        if !self.exists(key).await? {
            return Err(StorageError::not_found(key).into());
        }
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;
        Ok(())
    }

    fn url(&self, key: &str) -> String {
        join_url(&self.public_url, &self.full_key(key))
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StorageConfig {
        StorageConfig {
            location: "s3://hkdist".to_string(),
            region: Some("us-east-1".to_string()),
            access_key_id: Some("test".to_string()),
            secret_access_key: Some("test".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_default_public_url() {
        let store = S3Storage::new("hkdist", None, &config()).await.unwrap();
        assert_eq!(
            store.url("hk-3-linux-amd64.gz"),
            "https://hkdist.s3.amazonaws.com/hk-3-linux-amd64.gz"
        );
    }

    #[tokio::test]
    async fn test_prefix_and_custom_url() {
        let mut cfg = config();
        cfg.public_url = Some("https://cdn.example.com/".to_string());
        let store = S3Storage::new("hkpatch", Some("/patches/".to_string()), &cfg)
            .await
            .unwrap();
        assert_eq!(store.url("abc"), "https://cdn.example.com/patches/abc");
    }

    #[tokio::test]
    async fn test_path_style_endpoint_url() {
        let mut cfg = config();
        cfg.endpoint = Some("http://localhost:9000".to_string());
        cfg.force_path_style = true;
        let store = S3Storage::new("hkdist", None, &cfg).await.unwrap();
        assert_eq!(store.url("k"), "http://localhost:9000/hkdist/k");
    }

    #[tokio::test]
    async fn test_half_credentials_rejected() {
        let mut cfg = config();
        cfg.secret_access_key = None;
        assert!(S3Storage::new("hkdist", None, &cfg).await.is_err());
    }
}
