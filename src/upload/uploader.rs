use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct BackupMetadata {
    pub filename: String,
    pub file_size: u64,
    pub file_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Ships a finished dump off-site. Implementations fail loudly; the dump
/// executor decides that an upload failure is non-fatal.
#[async_trait]
pub trait BackupUploader: Send + Sync {
    async fn upload(&self, metadata: &BackupMetadata, file_path: &Path) -> Result<()>;
    fn name(&self) -> &'static str;
}
