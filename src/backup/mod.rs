pub mod job;
pub mod listing;
pub mod naming;
pub mod restore;
pub mod retention;
pub mod scheduler;

pub use job::{run_backup, run_backup_with_uploaders, BackupResult};
pub use listing::{list_backups, BackupInfo};
pub use restore::{restore_backup, RestoreResult};
pub use scheduler::{start_backup_scheduler, stop_backup_scheduler, SchedulerHandle};
