use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Store error: {0}")]
    Store(String),
    #[error("AI service error: {0}")]
    Ai(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
