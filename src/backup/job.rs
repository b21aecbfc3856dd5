use crate::backup::{naming, retention};
use crate::config::AppConfig;
use crate::database::ConnectionParams;
use crate::error::{BackupError, Result};
use crate::upload::{self, BackupMetadata, BackupUploader};
use chrono::{Local, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

const DUMP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Even a dump of an empty database exceeds this once gzipped; anything
/// smaller is a truncated or failed dump.
const MIN_DUMP_SIZE_BYTES: u64 = 100;

/// Outcome of one dump attempt. `run_backup` never returns `Err`; every
/// failure mode ends up in here.
#[derive(Debug, Clone, Serialize)]
pub struct BackupResult {
    pub success: bool,

    pub filename: Option<String>,

    pub file_path: Option<PathBuf>,

    pub file_size: Option<u64>,

    pub duration_ms: u64,

    pub uploaded_to_s3: bool,

    pub error: Option<String>,
}

impl BackupResult {
    fn failure(error: String, duration_ms: u64) -> Self {
        Self {
            success: false,
            filename: None,
            file_path: None,
            file_size: None,
            duration_ms,
            uploaded_to_s3: false,
            error: Some(error),
        }
    }
}

/// Produces one compressed dump of the configured database, shipping it to
/// the uploaders built from the configuration.
pub async fn run_backup(config: &AppConfig) -> BackupResult {
    let uploaders = upload::create_uploaders(config);
    run_backup_with_uploaders(config, &uploaders).await
}

/// `run_backup` with an explicit uploader set.
///
/// A failed off-site upload does not fail the backup; local success is the
/// primary guarantee. Retention pruning runs after every successful dump.
pub async fn run_backup_with_uploaders(
    config: &AppConfig,
    uploaders: &[Box<dyn BackupUploader>],
) -> BackupResult {
    let started = Instant::now();

    let database_url = match &config.database_url {
        Some(url) => url,
        None => {
            return BackupResult::failure("DATABASE_URL is not configured".to_string(), 0);
        }
    };

    if let Err(e) = fs::create_dir_all(&config.backup.dir) {
        return BackupResult::failure(
            format!("Failed to create backup directory: {}", e),
            elapsed_ms(started),
        );
    }

    let conn = match ConnectionParams::from_url(database_url, config.production) {
        Ok(conn) => conn,
        Err(e) => return BackupResult::failure(e.to_string(), elapsed_ms(started)),
    };

    let filename = naming::backup_filename(Local::now());
    let file_path = config.backup.dir.join(&filename);

    info!("Starting database backup: {}", filename);

    let file_size = match dump_to_file(&conn, &file_path).await {
        Ok(size) => size,
        Err(e) => {
            remove_partial(&file_path);
            return BackupResult::failure(e.to_string(), elapsed_ms(started));
        }
    };

    let uploaded_to_s3 = upload_offsite(uploaders, &file_path, &filename, file_size).await;

    if let Err(e) = retention::prune_old_backups(&config.backup.dir, config.backup.retention_days) {
        warn!("Retention pruning failed: {}", e);
    }

    let duration_ms = elapsed_ms(started);
    info!(
        "Backup completed: {} ({:.2} MB in {} ms)",
        filename,
        file_size as f64 / 1024.0 / 1024.0,
        duration_ms
    );

    BackupResult {
        success: true,
        filename: Some(filename),
        file_path: Some(file_path),
        file_size: Some(file_size),
        duration_ms,
        uploaded_to_s3,
        error: None,
    }
}

/// Runs `pg_dump`, streaming its stdout through gzip straight into `dest`.
/// Returns the validated size of the finished file.
async fn dump_to_file(conn: &ConnectionParams, dest: &Path) -> Result<u64> {
    let mut cmd = Command::new("pg_dump");
    cmd.arg("--no-owner").arg("--no-privileges");
    conn.apply_to(&mut cmd);

    run_dump_command(cmd, dest).await?;
    validate_dump_size(dest)
}

/// Spawns the dump command and gzips its stdout into `dest`, enforcing the
/// hard timeout. stderr is drained while stdout is copied; the child blocks
/// once the stderr pipe fills.
async fn run_dump_command(mut cmd: Command, dest: &Path) -> Result<()> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| BackupError::Database(format!("failed to spawn pg_dump: {}", e)))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| BackupError::Database("failed to capture pg_dump stdout".to_string()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| BackupError::Database("failed to capture pg_dump stderr".to_string()))?;

    let child_ref = &mut child;
    let dest_path = dest.to_path_buf();
    let stream = async move {
        let copy = async {
            let file = File::create(&dest_path)?;
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            let mut buf = vec![0u8; 64 * 1024];

            loop {
                let n = stdout.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                encoder.write_all(&buf[..n])?;
            }
            encoder.finish()?.flush()?;
            Ok::<(), BackupError>(())
        };
        let drain = async {
            let mut err_out = Vec::new();
            let _ = stderr.read_to_end(&mut err_out).await;
            err_out
        };

        let (copied, err_out) = tokio::join!(copy, drain);
        copied?;

        let status = child_ref.wait().await?;
        if !status.success() {
            return Err(BackupError::Database(format!(
                "pg_dump exited with {}: {}",
                status,
                String::from_utf8_lossy(&err_out).trim()
            )));
        }
        Ok(())
    };

    let outcome = timeout(DUMP_TIMEOUT, stream).await;
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            let _ = child.kill().await;
            Err(BackupError::Database(format!(
                "pg_dump timed out after {} seconds",
                DUMP_TIMEOUT.as_secs()
            )))
        }
    }
}

fn validate_dump_size(path: &Path) -> Result<u64> {
    let size = fs::metadata(path)?.len();
    if size < MIN_DUMP_SIZE_BYTES {
        return Err(BackupError::Validation(format!(
            "dump file is only {} bytes; output looks truncated",
            size
        )));
    }
    Ok(size)
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to remove partial backup {}: {}", path.display(), e);
        }
    }
}

async fn upload_offsite(
    uploaders: &[Box<dyn BackupUploader>],
    path: &Path,
    filename: &str,
    file_size: u64,
) -> bool {
    if uploaders.is_empty() {
        return false;
    }

    let metadata = BackupMetadata {
        filename: filename.to_string(),
        file_size,
        file_hash: upload::calculate_sha256(path).ok(),
        timestamp: Utc::now(),
    };

    let mut all_succeeded = true;
    for uploader in uploaders {
        match uploader.upload(&metadata, path).await {
            Ok(()) => info!("Uploaded {} to {}", filename, uploader.name()),
            Err(e) => {
                // Local backup success is the primary guarantee.
                warn!(
                    "Off-site upload to {} failed, keeping local backup: {}",
                    uploader.name(),
                    e
                );
                all_succeeded = false;
            }
        }
    }
    all_succeeded
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use tempfile::tempdir;

    struct RejectedUploader;

    #[async_trait::async_trait]
    impl BackupUploader for RejectedUploader {
        async fn upload(&self, _metadata: &BackupMetadata, _file_path: &Path) -> Result<()> {
            Err(BackupError::Upload("bucket rejected the object".to_string()))
        }

        fn name(&self) -> &'static str {
            "rejected"
        }
    }

    struct AcceptingUploader;

    #[async_trait::async_trait]
    impl BackupUploader for AcceptingUploader {
        async fn upload(&self, _metadata: &BackupMetadata, _file_path: &Path) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "accepting"
        }
    }

    // Puts a pg_dump stand-in first on PATH that emits enough incompressible
    // output to pass the size check.
    fn install_fake_pg_dump(bin_dir: &Path) {
        use std::os::unix::fs::PermissionsExt;

        let script = bin_dir.join("pg_dump");
        fs::write(&script, "#!/bin/sh\nhead -c 4096 /dev/urandom\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let path = std::env::var("PATH").unwrap_or_default();
        std::env::set_var("PATH", format!("{}:{}", bin_dir.display(), path));
    }

    #[tokio::test]
    async fn test_missing_database_url_fails_before_io() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.backup.dir = dir.path().join("never-created");

        let result = run_backup(&config).await;

        assert!(!result.success);
        assert_eq!(result.duration_ms, 0);
        assert!(result.error.unwrap().contains("DATABASE_URL"));
        assert!(result.filename.is_none());
        assert!(!result.uploaded_to_s3);
        assert!(!config.backup.dir.exists());
    }

    #[tokio::test]
    async fn test_unparsable_url_leaves_no_file_behind() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database_url = Some("not a connection string".to_string());
        config.backup.dir = dir.path().to_path_buf();

        let result = run_backup(&config).await;

        assert!(!result.success);
        assert!(result.error.is_some());
        let leftover = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn test_stderr_chatter_does_not_stall_the_dump() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("backup_2024-01-01_03-00-00.sql.gz");

        // Several pipe buffers worth of stderr before stdout closes.
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg("head -c 262144 /dev/zero >&2; head -c 4096 /dev/urandom");

        let outcome = timeout(Duration::from_secs(20), run_dump_command(cmd, &dest))
            .await
            .expect("dump stalled while the child wrote to stderr");
        outcome.unwrap();
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn test_failed_upload_does_not_downgrade_a_successful_dump() {
        let bin = tempdir().unwrap();
        install_fake_pg_dump(bin.path());

        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database_url = Some("postgres://user:pw@localhost:5432/app".to_string());
        config.backup.dir = dir.path().to_path_buf();

        let failing: Vec<Box<dyn BackupUploader>> = vec![Box::new(RejectedUploader)];
        let result = run_backup_with_uploaders(&config, &failing).await;
        assert!(result.success, "dump should succeed: {:?}", result.error);
        assert!(!result.uploaded_to_s3);
        assert!(result.error.is_none());
        assert!(result.filename.is_some());
        assert!(result.file_size.unwrap() >= MIN_DUMP_SIZE_BYTES);

        let working: Vec<Box<dyn BackupUploader>> = vec![Box::new(AcceptingUploader)];
        let result = run_backup_with_uploaders(&config, &working).await;
        assert!(result.success, "dump should succeed: {:?}", result.error);
        assert!(result.uploaded_to_s3);
    }

    #[test]
    fn test_validate_dump_size_rejects_undersized_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backup_2024-01-01_03-00-00.sql.gz");

        fs::write(&path, b"gz").unwrap();
        assert!(validate_dump_size(&path).is_err());

        fs::write(&path, vec![0u8; 200]).unwrap();
        assert_eq!(validate_dump_size(&path).unwrap(), 200);
    }

    #[test]
    fn test_backup_result_serializes_for_the_admin_api() {
        let result = BackupResult::failure("boom".to_string(), 5);
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "boom");
        assert_eq!(value["duration_ms"], 5);
        assert_eq!(value["uploaded_to_s3"], false);
    }

    #[test]
    fn test_remove_partial_is_quiet_on_missing_file() {
        let dir = tempdir().unwrap();
        remove_partial(&dir.path().join("backup_gone.sql.gz"));
    }
}
