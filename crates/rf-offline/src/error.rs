//! Error types for offline processing

use rf_core::RfError;
use thiserror::Error;

/// Offline processing errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OfflineError {
    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("No valid output buffer")]
    NoValidOutput,

    #[error("Output buffer `{0}` does not exist")]
    MissingOutput(String),

    #[error("Already processing")]
    AlreadyProcessing,

    #[error("Job cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("Failed to read audio file: {0}")]
    ReadError(String),

    #[error("Failed to write output file: {0}")]
    WriteError(String),

    #[error(transparent)]
    Core(#[from] RfError),
}

/// Result type for offline operations
pub type OfflineResult<T> = Result<T, OfflineError>;
