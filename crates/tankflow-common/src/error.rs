//! Error types for tankflow

use thiserror::Error;

/// Result type alias for tankflow operations
pub type Result<T> = std::result::Result<T, TankflowError>;

/// Main error type for tankflow
#[derive(Error, Debug)]
pub enum TankflowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
