//! Error types for terratin

use thiserror::Error;

/// Main error type for terratin operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Result type alias for terratin operations
pub type Result<T> = std::result::Result<T, Error>;
