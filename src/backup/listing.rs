use crate::backup::naming;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Descriptor of a dump file on disk. `created` is derived from the
/// filesystem modification time, not from the file content.
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub filename: String,
    pub size: u64,
    pub created: DateTime<Utc>,
}

/// Enumerates backup-pattern files in `dir`, most recent first.
/// A missing directory yields an empty list.
pub fn list_backups(dir: &Path) -> Result<Vec<BackupInfo>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut backups = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !naming::is_backup_filename(name) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!("Skipping {} during listing: {}", name, e);
                continue;
            }
        };
        let modified = match metadata.modified() {
            Ok(t) => t,
            Err(e) => {
                warn!("Skipping {} during listing: {}", name, e);
                continue;
            }
        };

        backups.push(BackupInfo {
            filename: name.to_string(),
            size: metadata.len(),
            created: DateTime::<Utc>::from(modified),
        });
    }

    sort_most_recent_first(&mut backups);
    Ok(backups)
}

fn sort_most_recent_first(backups: &mut [BackupInfo]) {
    backups.sort_by(|a, b| b.created.cmp(&a.created));
}
