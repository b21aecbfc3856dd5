use crate::backup::job::BackupResult;
use crate::backup::scheduler::SchedulerHandle;
use crate::config::AppConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, Default)]
pub struct SchedulerStatus {
    pub running: bool,

    pub next_run: Option<DateTime<Utc>>,

    pub cron: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupEntry {
    pub timestamp: DateTime<Utc>,

    pub filename: Option<String>,

    pub success: bool,

    pub file_size: u64,

    pub duration_ms: u64,

    pub uploaded_to_s3: bool,

    pub error: Option<String>,
}

pub struct AppState {
    pub config: Arc<AppConfig>,

    pub scheduler: RwLock<SchedulerStatus>,

    pub history: RwLock<Vec<BackupEntry>>,

    /// Serializes manual and scheduled dump/restore invocations; the backup
    /// directory is the only shared mutable resource.
    pub run_lock: Mutex<()>,

    /// At most one live recurring trigger per process.
    pub scheduler_handle: Mutex<Option<SchedulerHandle>>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>) -> Arc<Self> {
        Arc::new(Self {
            config,
            scheduler: RwLock::new(SchedulerStatus::default()),
            history: RwLock::new(Vec::new()),
            run_lock: Mutex::new(()),
            scheduler_handle: Mutex::new(None),
        })
    }

    pub fn check_credentials(&self, username: &str, password: &str) -> bool {
        !self.config.web.username.is_empty()
            && self.config.web.username == username
            && self.config.web.password == password
    }

    pub async fn update_scheduler(&self, status: SchedulerStatus) {
        let mut scheduler = self.scheduler.write().await;
        *scheduler = status;
    }

    pub async fn record_backup(&self, result: &BackupResult) {
        let entry = BackupEntry {
            timestamp: Utc::now(),
            filename: result.filename.clone(),
            success: result.success,
            file_size: result.file_size.unwrap_or(0),
            duration_ms: result.duration_ms,
            uploaded_to_s3: result.uploaded_to_s3,
            error: result.error.clone(),
        };

        let mut history = self.history.write().await;
        history.insert(0, entry);
        if history.len() > HISTORY_LIMIT {
            history.truncate(HISTORY_LIMIT);
        }
    }
}
