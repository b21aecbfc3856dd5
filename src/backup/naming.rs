use chrono::{DateTime, Local};

pub const BACKUP_PREFIX: &str = "backup_";
pub const BACKUP_SUFFIX: &str = ".sql.gz";

/// Builds the artifact name for a dump taken at `now`, e.g.
/// `backup_2024-01-01_03-00-00.sql.gz`. The timestamp keeps second
/// granularity and avoids colons and periods so the name is portable.
pub fn backup_filename(now: DateTime<Local>) -> String {
    format!(
        "{}{}{}",
        BACKUP_PREFIX,
        now.format("%Y-%m-%d_%H-%M-%S"),
        BACKUP_SUFFIX
    )
}

/// The filename pattern is the only contract identifying backup artifacts;
/// listing, pruning and restore validation all go through this check.
pub fn is_backup_filename(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX)
        && name.ends_with(BACKUP_SUFFIX)
        && name.len() > BACKUP_PREFIX.len() + BACKUP_SUFFIX.len()
}
