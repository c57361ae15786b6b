//! Error types for landing

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LandingError>;

#[derive(Error, Debug)]
pub enum LandingError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
