use crate::backup::naming;
use crate::config::AppConfig;
use crate::database::ConnectionParams;
use crate::error::{BackupError, Result};
use flate2::read::GzDecoder;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::info;

// Restores are typically slower than dumps.
const RESTORE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Serialize)]
pub struct RestoreResult {
    pub success: bool,
    pub error: Option<String>,
}

impl RestoreResult {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }
}

/// Restores the database from a named local dump file.
///
/// Destructive: the decompressed dump is applied to the live database with no
/// pre-restore snapshot. The filename is validated against traversal and the
/// backup naming pattern before the filesystem is touched.
pub async fn restore_backup(config: &AppConfig, filename: &str) -> RestoreResult {
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return RestoreResult::failure(format!("Invalid backup filename: {}", filename));
    }
    if !naming::is_backup_filename(filename) {
        return RestoreResult::failure(format!("Not a backup archive: {}", filename));
    }

    let path = config.backup.dir.join(filename);
    if !path.exists() {
        return RestoreResult::failure(format!("Backup file not found: {}", filename));
    }

    let database_url = match &config.database_url {
        Some(url) => url,
        None => return RestoreResult::failure("DATABASE_URL is not configured".to_string()),
    };

    let conn = match ConnectionParams::from_url(database_url, config.production) {
        Ok(conn) => conn,
        Err(e) => return RestoreResult::failure(e.to_string()),
    };

    info!("Restoring database from {}", filename);
    match run_restore_process(&conn, &path).await {
        Ok(()) => {
            info!("Restore from {} completed", filename);
            RestoreResult {
                success: true,
                error: None,
            }
        }
        Err(e) => RestoreResult::failure(e.to_string()),
    }
}

/// Decompresses the dump and pipes it into `psql`.
async fn run_restore_process(conn: &ConnectionParams, path: &Path) -> Result<()> {
    let mut cmd = Command::new("psql");
    // -X skips psqlrc, ON_ERROR_STOP aborts on the first failed statement.
    cmd.arg("-X").arg("-q").arg("-v").arg("ON_ERROR_STOP=1");
    conn.apply_to(&mut cmd);

    feed_dump_to_command(cmd, path).await
}

/// Feeds the gzip-decoded dump to the restore command's stdin, enforcing the
/// hard timeout. stderr is drained while stdin is written; the child blocks
/// once the stderr pipe fills.
async fn feed_dump_to_command(mut cmd: Command, path: &Path) -> Result<()> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| BackupError::Database(format!("failed to spawn psql: {}", e)))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| BackupError::Database("failed to open psql stdin".to_string()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| BackupError::Database("failed to capture psql stderr".to_string()))?;

    let child_ref = &mut child;
    let source = path.to_path_buf();
    let feed = async move {
        let write = async {
            let file = File::open(&source)?;
            let mut decoder = GzDecoder::new(BufReader::new(file));
            let mut buf = vec![0u8; 64 * 1024];

            loop {
                let n = decoder.read(&mut buf).map_err(|e| {
                    BackupError::Compression(format!("failed to decompress dump: {}", e))
                })?;
                if n == 0 {
                    break;
                }
                stdin.write_all(&buf[..n]).await?;
            }
            drop(stdin);
            Ok::<(), BackupError>(())
        };
        let drain = async {
            let mut err_out = Vec::new();
            let _ = stderr.read_to_end(&mut err_out).await;
            err_out
        };

        let (written, err_out) = tokio::join!(write, drain);

        // A failed psql closes stdin early; its exit status and stderr carry
        // the real cause, not the broken-pipe write error.
        let status = child_ref.wait().await?;
        if !status.success() {
            return Err(BackupError::Database(format!(
                "psql exited with {}: {}",
                status,
                String::from_utf8_lossy(&err_out).trim()
            )));
        }
        written?;
        Ok(())
    };

    let outcome = timeout(RESTORE_TIMEOUT, feed).await;
    match outcome {
        Ok(result) => result,
        Err(_) => {
            let _ = child.kill().await;
            Err(BackupError::Database(format!(
                "psql timed out after {} seconds",
                RESTORE_TIMEOUT.as_secs()
            )))
        }
    }
}
