//! Error types for seqsync core

use thiserror::Error;

/// Core error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid element ID: {0}")]
    InvalidId(String),

    #[error("Invalid site ID: {0}")]
    InvalidSite(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Lamport clock exhausted")]
    ClockExhausted,

    #[error("Element sequence exhausted for site {0}")]
    SequenceExhausted(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;
