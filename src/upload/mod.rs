mod s3;
mod uploader;

pub use s3::S3Uploader;
pub use uploader::{BackupMetadata, BackupUploader};

use crate::config::AppConfig;
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub fn create_uploaders(config: &AppConfig) -> Vec<Box<dyn BackupUploader>> {
    let mut uploaders: Vec<Box<dyn BackupUploader>> = Vec::new();

    if let Some(s3_config) = &config.s3 {
        uploaders.push(Box::new(S3Uploader::new(s3_config)));
    }

    uploaders
}

pub fn calculate_sha256(file_path: &Path) -> Result<String> {
    let file = File::open(file_path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
