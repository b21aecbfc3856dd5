use std::fmt;
use std::io;
#[derive(Debug)]
pub enum BackupError {
    Config(String),
    Database(String),
    Compression(String),
    Upload(String),
    Validation(String),
    Io(io::Error),
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupError::Config(msg) => write!(f, "Configuration error: {}", msg),
            BackupError::Database(msg) => write!(f, "Database error: {}", msg),
            BackupError::Compression(msg) => write!(f, "Compression error: {}", msg),
            BackupError::Upload(msg) => write!(f, "Upload error: {}", msg),
            BackupError::Validation(msg) => write!(f, "Validation error: {}", msg),
            BackupError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for BackupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackupError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for BackupError {
    fn from(err: io::Error) -> Self {
        BackupError::Io(err)
    }
}

impl From<url::ParseError> for BackupError {
    fn from(err: url::ParseError) -> Self {
        BackupError::Config(format!("invalid connection string: {}", err))
    }
}

impl From<cron::error::Error> for BackupError {
    fn from(err: cron::error::Error) -> Self {
        BackupError::Config(format!("invalid cron expression: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
