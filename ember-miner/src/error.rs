//! Common error types for ember-miner.
//!
//! A centralized Error enum using thiserror, with conversions from the
//! underlying error types used throughout the crate. Share-submission
//! outcomes have their own sentinel enum in [`crate::work`] because the
//! orchestrator classifies them rather than propagating them.

use thiserror::Error;

/// Main error type for miner operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from tokio or std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Compute backend errors (device acquisition, kernel execution)
    #[error("Compute error: {0}")]
    Compute(String),

    /// Device lifecycle errors (work delivery to a stopped device, etc.)
    #[error("Device error: {0}")]
    Device(String),

    /// Work source errors (fetch path)
    #[error("Work source error: {0}")]
    Source(String),

    /// Stats API errors
    #[error("API error: {0}")]
    Api(String),
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
