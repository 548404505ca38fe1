use thiserror::Error;

/// Errors surfaced by the registry, metrics store and maintenance pass.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed or referentially invalid input (unknown category, blank name, ...).
    #[error("validation error: {0}")]
    Validation(String),
    /// Reference to an algorithm, version or category that does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A cascading delete step failed and its transaction was rolled back.
    #[error("consistency error: {0}")]
    Consistency(String),
    /// The store file exists but one or more required tables are absent.
    #[error("schema missing: {0}")]
    SchemaMissing(String),
    /// The store file does not exist or cannot be opened.
    #[error("store unreachable: {0}")]
    Unreachable(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
