mod types;

pub use types::*;

use std::env;
use std::path::PathBuf;
use tracing::warn;

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Tests feed a
    /// map here instead of mutating process-wide environment variables.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let backup = BackupConfig {
            enabled: get("BACKUP_ENABLED").map(|v| parse_bool(&v)).unwrap_or(false),
            cron: get("BACKUP_CRON")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "0 3 * * *".to_string()),
            retention_days: get("BACKUP_RETENTION_DAYS")
                .and_then(|v| match v.trim().parse::<u32>() {
                    Ok(n) => Some(n),
                    Err(_) => {
                        warn!("Ignoring unparsable BACKUP_RETENTION_DAYS value '{}'", v);
                        None
                    }
                })
                .unwrap_or(7),
            dir: get("BACKUP_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("backups")),
        };

        let web = WebConfig {
            enabled: get("BACKUP_WEB_ENABLED").map(|v| parse_bool(&v)).unwrap_or(false),
            port: get("BACKUP_WEB_PORT")
                .and_then(|v| v.trim().parse::<u16>().ok())
                .unwrap_or(8080),
            username: get("BACKUP_WEB_USERNAME").unwrap_or_default(),
            password: get("BACKUP_WEB_PASSWORD").unwrap_or_default(),
        };

        Self {
            database_url: get("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            backup,
            s3: s3_from_lookup(&get),
            web,
            production: get("APP_ENV").map(|v| v.trim() == "production").unwrap_or(false),
        }
    }
}

fn s3_from_lookup<F>(get: &F) -> Option<S3Config>
where
    F: Fn(&str) -> Option<String>,
{
    let bucket = get("BACKUP_S3_BUCKET").filter(|v| !v.trim().is_empty())?;

    let endpoint = get("S3_ENDPOINT");
    let region = get("S3_REGION");
    let access_key_id = get("S3_ACCESS_KEY_ID");
    let secret_access_key = get("S3_SECRET_ACCESS_KEY");

    match (endpoint, region, access_key_id, secret_access_key) {
        (Some(endpoint), Some(region), Some(access_key_id), Some(secret_access_key)) => {
            Some(S3Config {
                bucket,
                prefix: get("BACKUP_S3_PREFIX").unwrap_or_else(|| "backups/".to_string()),
                endpoint,
                region,
                access_key_id,
                secret_access_key,
            })
        }
        _ => {
            warn!(
                "BACKUP_S3_BUCKET is set but S3 credentials are incomplete; off-site upload disabled"
            );
            None
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
