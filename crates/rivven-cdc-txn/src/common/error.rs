//! Error types for transaction bookkeeping
//!
//! Only protocol-shape violations (caller misuse of control messages or
//! transaction boundaries) surface as hard failures. Configuration and
//! identity-resolution problems are logged and degrade to ungrouped
//! processing instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error categories for metrics and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Collaborator contract violations (wrong message kind, bad boundaries)
    Protocol,
    /// Configuration errors (invalid or unreadable settings)
    Configuration,
    /// Serialization errors (JSON)
    Serialization,
    /// I/O errors
    Io,
    /// Other/unknown errors
    Other,
}

/// Transaction bookkeeping errors
#[derive(Error, Debug)]
pub enum CdcError {
    /// A row-data accessor was invoked on a transaction control message
    #[error("Operation '{0}' is invalid for a control message")]
    InvalidForControlMessage(&'static str),

    /// A transaction could not be opened because the begin message has no id
    #[error("Begin message carries no transaction id")]
    MissingTransactionId,

    /// Transaction boundaries arrived in an impossible order
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CdcError {
    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check whether this error signals a collaborator contract violation.
    ///
    /// Protocol errors are fatal to the calling path and must not be retried.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidForControlMessage(_) | Self::MissingTransactionId | Self::InvalidState(_)
        )
    }

    /// Get the error category for metrics and alerting.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidForControlMessage(_) => ErrorCategory::Protocol,
            Self::MissingTransactionId => ErrorCategory::Protocol,
            Self::InvalidState(_) => ErrorCategory::Protocol,
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Json(_) => ErrorCategory::Serialization,
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// Get a metric-safe error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidForControlMessage(_) => "invalid_for_control_message",
            Self::MissingTransactionId => "missing_transaction_id",
            Self::InvalidState(_) => "invalid_state",
            Self::Config(_) => "config_error",
            Self::Json(_) => "json_error",
            Self::Io(_) => "io_error",
        }
    }
}

/// Result type for transaction bookkeeping operations
pub type Result<T> = std::result::Result<T, CdcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CdcError::InvalidForControlMessage("table");
        assert!(err.to_string().contains("table"));
        assert!(err.to_string().contains("control message"));

        let err = CdcError::invalid_state("commit without begin");
        assert!(err.to_string().contains("Invalid state"));
    }

    #[test]
    fn test_protocol_violation() {
        assert!(CdcError::InvalidForControlMessage("new_tuple").is_protocol_violation());
        assert!(CdcError::MissingTransactionId.is_protocol_violation());
        assert!(CdcError::invalid_state("x").is_protocol_violation());
        assert!(!CdcError::config("bad file").is_protocol_violation());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            CdcError::MissingTransactionId.category(),
            ErrorCategory::Protocol
        );
        assert_eq!(
            CdcError::config("x").category(),
            ErrorCategory::Configuration
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(CdcError::from(io).category(), ErrorCategory::Io);
    }

    #[test]
    fn test_error_code() {
        assert_eq!(
            CdcError::InvalidForControlMessage("table").error_code(),
            "invalid_for_control_message"
        );
        assert_eq!(CdcError::config("x").error_code(), "config_error");
    }
}
