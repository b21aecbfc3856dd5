use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub enabled: bool,
    pub cron: String,
    pub retention_days: u32,
    pub dir: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: "0 3 * * *".to_string(),
            retention_days: 7,
            dir: PathBuf::from("backups"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub prefix: String,
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub enabled: bool,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
            username: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub backup: BackupConfig,
    pub s3: Option<S3Config>,
    pub web: WebConfig,
    pub production: bool,
}
