//! Error types for skiff

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkiffError>;

#[derive(Error, Debug)]
pub enum SkiffError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Gateway unreachable: {0}")]
    Gateway(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
