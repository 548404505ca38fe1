use algo_platform_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// A single benchmarked run that did not complete. Never fatal to a harness pass.
#[derive(Debug, Error)]
pub enum ExecutionFailure {
    #[error("failed to start: {0}")]
    Spawn(String),
    #[error("exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("panicked: {0}")]
    Panicked(String),
    #[error("raised: {0}")]
    Raised(String),
    #[error("no measurement report: {0}")]
    MalformedReport(String),
    #[error("no entry point for code {0:?}")]
    UnknownEntry(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that stop a harness pass before or while it starts.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid benchmark config: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
