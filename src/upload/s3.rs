use crate::config::S3Config;
use crate::error::{BackupError, Result};
use crate::upload::{BackupMetadata, BackupUploader};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::{BehaviorVersion, Credentials, Region};
use s3::primitives::ByteStream;
use std::path::Path;
use tracing::debug;

/// Uploads dump archives to an S3-compatible object store (AWS, DigitalOcean
/// Spaces, MinIO, ...).
pub struct S3Uploader {
    config: S3Config,
}

impl S3Uploader {
    pub fn new(config: &S3Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    async fn client(&self) -> s3::Client {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(&self.config.endpoint)
            .region(Region::new(self.config.region.clone()))
            .credentials_provider(Credentials::new(
                &self.config.access_key_id,
                &self.config.secret_access_key,
                None,
                None,
                "Static",
            ))
            .load()
            .await;

        // Path-style addressing for non-AWS S3-compatible stores.
        let conf = s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();
        s3::Client::from_conf(conf)
    }
}

#[async_trait]
impl BackupUploader for S3Uploader {
    async fn upload(&self, metadata: &BackupMetadata, file_path: &Path) -> Result<()> {
        let key = format!("{}{}", self.config.prefix, metadata.filename);
        debug!(
            "Uploading {} ({} bytes, taken {}) to s3://{}/{}",
            file_path.display(),
            metadata.file_size,
            metadata.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.config.bucket,
            key
        );

        let client = self.client().await;
        let body = ByteStream::from_path(file_path).await.map_err(|e| {
            BackupError::Upload(format!("failed to read {}: {}", file_path.display(), e))
        })?;

        let mut request = client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .body(body)
            // Declared so downstream consumers decompress correctly.
            .content_type("application/gzip")
            .content_encoding("gzip");
        if let Some(hash) = &metadata.file_hash {
            request = request.metadata("sha256", hash.as_str());
        }

        request.send().await.map_err(|e| {
            BackupError::Upload(format!(
                "failed to upload to s3://{}/{}: {}",
                self.config.bucket, key, e
            ))
        })?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "S3"
    }
}
