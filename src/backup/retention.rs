use crate::backup::naming;
use crate::error::Result;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

/// Deletes backup-pattern files whose mtime is older than
/// `now - retention_days`. Idempotent; a missing directory is a no-op.
pub fn prune_old_backups(dir: &Path, retention_days: u32) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let cutoff = SystemTime::now() - Duration::from_secs(u64::from(retention_days) * 86_400);
    let mut removed = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !naming::is_backup_filename(name) {
            continue;
        }

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                warn!("Skipping {} during pruning: {}", name, e);
                continue;
            }
        };

        if is_expired(modified, cutoff) {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to prune {}: {}", name, e),
            }
        }
    }

    if removed > 0 {
        info!("Pruned {} expired backup file(s)", removed);
    }
    Ok(removed)
}

fn is_expired(modified: SystemTime, cutoff: SystemTime) -> bool {
    modified < cutoff
}
