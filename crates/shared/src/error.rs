use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A non-success response from the hosted backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("backend responded with {status}: {message}")]
pub struct BackendError {
    pub status: u16,
    pub message: String,
}

impl BackendError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// The storage API reports a missing object as a 400 whose body says
    /// "not found", so both shapes count.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
            || (self.status == 400 && self.message.to_ascii_lowercase().contains("not found"))
    }

    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }
}

/// JSON error body returned by both the REST and the storage endpoints.
///
/// The REST layer reports `message`, the storage layer `error`/`message`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

impl BackendErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.message.or(self.error).or(self.details)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("'{value}' is not a valid {kind}")]
pub struct ParseLabelError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseLabelError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
