//! Error types for rf-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RfError {
    #[error("Buffer does not exist")]
    BufferMissing,

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid resize: {frames} frames x {channels} channels at {sample_rate} Hz")]
    InvalidResize {
        frames: usize,
        channels: usize,
        sample_rate: f64,
    },

    #[error("Unknown parameter: {0}")]
    UnknownParam(String),

    #[error("Parameter `{name}` is not a {expected} parameter")]
    ParamType { name: String, expected: &'static str },

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),
}

/// Result type alias
pub type RfResult<T> = Result<T, RfError>;
