use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("ImageJ is not configured: {0}")]
    NotConfigured(String),
    #[error("process error: {0}")]
    Launch(String),
    #[error("task {0} has already been started")]
    AlreadyStarted(u64),
    #[error("task {0} not found")]
    UnknownTask(u64),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("memory must be between {min} and {max} MB, got {value}")]
    MemoryOutOfRange { value: u64, min: u64, max: u64 },
    #[error("stack memory must be between {min} and {max} MB, got {value}")]
    StackMemoryOutOfRange { value: u64, min: u64, max: u64 },
    #[error("missing HOME environment variable")]
    MissingHomeDirectory,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("temporary file error: {0}")]
    TempFile(#[from] tempfile::PersistError),
}
