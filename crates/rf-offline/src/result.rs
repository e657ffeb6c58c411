//! Job outcome reporting

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::OfflineError;

/// Outcome severity, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Status {
    #[default]
    Ok,
    Warning,
    Error,
    Cancelled,
}

/// Status plus accumulated messages
///
/// Warnings accumulate without aborting; the first hard error is kept
/// for callers that want the typed cause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessResult {
    status: Status,
    messages: Vec<String>,
    error: Option<OfflineError>,
}

impl ProcessResult {
    /// Empty successful result
    pub fn ok() -> Self {
        Self::default()
    }

    /// Result carrying one warning
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            status: Status::Warning,
            messages: vec![message.into()],
            error: None,
        }
    }

    /// Terminal cancelled result
    pub fn cancelled() -> Self {
        Self::failure(OfflineError::Cancelled)
    }

    /// Result for a hard failure
    pub fn failure(error: OfflineError) -> Self {
        let status = match error {
            OfflineError::Cancelled => Status::Cancelled,
            _ => Status::Error,
        };
        Self {
            status,
            messages: vec![error.to_string()],
            error: Some(error),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Ok or Warning
    pub fn is_ok(&self) -> bool {
        self.status <= Status::Warning
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == Status::Cancelled
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// All messages joined for display
    pub fn message(&self) -> String {
        self.messages.join("; ")
    }

    pub fn error(&self) -> Option<&OfflineError> {
        self.error.as_ref()
    }

    /// Raise the status; never lowers it
    pub fn escalate(&mut self, status: Status) {
        self.status = self.status.max(status);
    }

    pub fn add_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Record a warning and keep going
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.escalate(Status::Warning);
        self.add_message(message);
    }

    /// Fold `other` in: most severe status wins, messages keep their order
    pub fn merge(&mut self, other: ProcessResult) {
        if other.status > self.status || self.error.is_none() {
            if let Some(error) = other.error {
                self.error = Some(error);
            }
        }
        self.escalate(other.status);
        self.messages.extend(other.messages);
    }

    /// Convert to `Result`, keeping warnings on success
    pub fn into_result(self) -> Result<Vec<String>, OfflineError> {
        match (self.status, self.error) {
            (Status::Ok | Status::Warning, _) => Ok(self.messages),
            (Status::Cancelled, _) => Err(OfflineError::Cancelled),
            (Status::Error, Some(error)) => Err(error),
            (Status::Error, None) => Err(OfflineError::ProcessingFailed(self.messages.join("; "))),
        }
    }
}

impl From<OfflineError> for ProcessResult {
    fn from(error: OfflineError) -> Self {
        Self::failure(error)
    }
}

impl fmt::Display for ProcessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.messages.is_empty() {
            write!(f, "{:?}", self.status)
        } else {
            write!(f, "{:?}: {}", self.status, self.message())
        }
    }
}
