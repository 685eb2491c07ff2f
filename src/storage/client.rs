use super::BlobStore;
use crate::convert::mime::detect_image_mime;
use crate::models::StorageConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::Region, Client as S3Client};

pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let credentials = aws_sdk_s3::config::Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "image-saver-static",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        // Self-hosted stores (MinIO and friends) need path-style addressing
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .build();

        Ok(Self {
            client: S3Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::StoreFetch {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| Error::StoreFetch {
                key: key.to_string(),
                reason: format!("Failed to read body: {}", e),
            })?;

        Ok(bytes.to_vec())
    }

    async fn store(&self, key: &str, data: &[u8]) -> Result<()> {
        let body = ByteStream::from(data.to_vec());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(detect_image_mime(data))
            .send()
            .await
            .map_err(|e| Error::StoreUpload {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::StoreDelete {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}
