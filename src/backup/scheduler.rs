use crate::backup::job::{self, BackupResult};
use crate::config::AppConfig;
use crate::error::{BackupError, Result};
use crate::web::{AppState, SchedulerStatus};
use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::select;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Owned handle to the recurring backup trigger. Dropping it does not stop
/// the task; call [`SchedulerHandle::stop`]. The admin state keeps at most
/// one live handle per process.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Registers the recurring backup trigger. Returns `None`, with a distinct
/// diagnostic for each condition, when the feature flag is off, no connection
/// string is configured, or the cron expression does not validate.
pub fn start_backup_scheduler(
    config: Arc<AppConfig>,
    state: Arc<AppState>,
) -> Option<SchedulerHandle> {
    if !config.backup.enabled {
        info!("Automatic backups are disabled (set BACKUP_ENABLED=true to enable)");
        return None;
    }
    if config.database_url.is_none() {
        warn!("DATABASE_URL is not configured; backup scheduler will not start");
        return None;
    }
    let schedule = match parse_cron(&config.backup.cron) {
        Ok(schedule) => schedule,
        Err(e) => {
            error!(
                "Invalid BACKUP_CRON expression '{}': {}",
                config.backup.cron, e
            );
            return None;
        }
    };

    let (shutdown, mut rx) = watch::channel(false);
    let cron = config.backup.cron.clone();
    let task = tokio::spawn(async move {
        info!("Backup scheduler started with schedule '{}'", cron);

        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!(
                    "Schedule '{}' has no upcoming firing, scheduler exiting",
                    cron
                );
                break;
            };
            state
                .update_scheduler(SchedulerStatus {
                    running: true,
                    next_run: Some(next),
                    cron: Some(cron.clone()),
                })
                .await;

            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            select! {
                _ = tokio::time::sleep(wait) => {}
                _ = rx.changed() => break,
            }

            // Scheduled and manual runs share one lock.
            let result = {
                let _guard = state.run_lock.lock().await;
                job::run_backup(&config).await
            };
            log_outcome(&result);
            state.record_backup(&result).await;
        }

        state.update_scheduler(SchedulerStatus::default()).await;
        info!("Backup scheduler stopped");
    });

    Some(SchedulerHandle { shutdown, task })
}

/// Cancels the recurring trigger and waits for the task to wind down.
pub async fn stop_backup_scheduler(handle: SchedulerHandle) {
    handle.stop().await;
}

fn log_outcome(result: &BackupResult) {
    if result.success {
        info!(
            "Scheduled backup completed: {} in {} ms",
            result.filename.as_deref().unwrap_or("<unnamed>"),
            result.duration_ms
        );
    } else {
        // An individual failed firing never stops future firings.
        error!(
            "Scheduled backup failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
}

/// Operators configure standard 5-field cron expressions; the `cron` crate
/// wants a seconds field, so one is prepended. 6/7-field input passes
/// through unchanged.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let trimmed = expr.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    };
    Schedule::from_str(&normalized).map_err(BackupError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_state(config: &Arc<AppConfig>) -> Arc<AppState> {
        AppState::new(config.clone())
    }

    #[test]
    fn test_parse_cron_five_field() {
        assert!(parse_cron("0 3 * * *").is_ok());
        assert!(parse_cron("*/5 * * * *").is_ok());
    }

    #[test]
    fn test_parse_cron_six_field_passthrough() {
        assert!(parse_cron("0 0 3 * * *").is_ok());
        assert!(parse_cron("* * * * * *").is_ok());
    }

    #[test]
    fn test_parse_cron_rejects_malformed() {
        assert!(parse_cron("invalid").is_err());
        assert!(parse_cron("0 3 * *").is_err());
        assert!(parse_cron("61 3 * * *").is_err());
    }

    #[tokio::test]
    async fn test_start_is_a_noop_when_disabled() {
        let config = Arc::new(AppConfig::default());
        let state = test_state(&config);
        assert!(start_backup_scheduler(config, state).is_none());
    }

    #[tokio::test]
    async fn test_start_requires_database_url() {
        let mut config = AppConfig::default();
        config.backup.enabled = true;
        let config = Arc::new(config);
        let state = test_state(&config);
        assert!(start_backup_scheduler(config, state).is_none());
    }

    #[tokio::test]
    async fn test_start_rejects_malformed_cron() {
        let mut config = AppConfig::default();
        config.backup.enabled = true;
        config.database_url = Some("postgres://app@localhost/app".to_string());
        config.backup.cron = "whenever".to_string();
        let config = Arc::new(config);
        let state = test_state(&config);
        assert!(start_backup_scheduler(config, state).is_none());
    }

    #[tokio::test]
    async fn test_stop_cancels_future_firings() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.backup.enabled = true;
        config.backup.cron = "* * * * * *".to_string();
        config.backup.dir = dir.path().to_path_buf();
        // Unparsable URL: each firing fails fast without spawning pg_dump.
        config.database_url = Some("not a connection string".to_string());
        let config = Arc::new(config);
        let state = test_state(&config);

        let handle =
            start_backup_scheduler(config.clone(), state.clone()).expect("scheduler started");

        tokio::time::sleep(Duration::from_millis(2200)).await;
        let fired = state.history.read().await.len();
        assert!(fired >= 1, "scheduler should have fired at least once");

        handle.stop().await;
        assert!(!state.scheduler.read().await.running);

        let after_stop = state.history.read().await.len();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(
            state.history.read().await.len(),
            after_stop,
            "no firings may occur after stop"
        );
    }

    #[tokio::test]
    async fn test_stop_right_after_start() {
        let mut config = AppConfig::default();
        config.backup.enabled = true;
        config.database_url = Some("postgres://app@localhost/app".to_string());
        let config = Arc::new(config);
        let state = test_state(&config);

        let handle = start_backup_scheduler(config, state).expect("scheduler started");
        stop_backup_scheduler(handle).await;
    }
}
