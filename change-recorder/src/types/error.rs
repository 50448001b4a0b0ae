//! Unified error type for the recorder
//!
//! Errors fall in two groups:
//! - contract violations by the consumer (replaying twice, acknowledging
//!   nothing, peeking an empty queue, using a recorder after shutdown)
//! - recoverable storage failures, which never stop the live pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum RecorderError {
    #[error("Notification queue is empty")]
    EmptyQueue,

    #[error("No delivered notification is awaiting acknowledgement")]
    DoubleAcknowledge,

    #[error("A delivered notification is still awaiting acknowledgement")]
    ReplayWhileAwaiting,

    #[error("Recorder has been shut down")]
    Closed,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Corrupt recorder store: {0}")]
    StoreCorrupt(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Consumer already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Consumer not found: {0}")]
    ConsumerNotFound(String),
}

impl RecorderError {
    /// Misuse of the replay/acknowledge protocol by the consumer.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::EmptyQueue | Self::DoubleAcknowledge | Self::ReplayWhileAwaiting | Self::Closed
        )
    }

    /// Errors after which the in-memory state is still authoritative.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::StoreCorrupt(_))
    }
}

impl From<std::io::Error> for RecorderError {
    fn from(err: std::io::Error) -> Self {
        RecorderError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for RecorderError {
    fn from(err: toml::de::Error) -> Self {
        RecorderError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for RecorderError {
    fn from(err: serde_json::Error) -> Self {
        RecorderError::Parse(err.to_string())
    }
}

impl From<rusqlite::Error> for RecorderError {
    fn from(err: rusqlite::Error) -> Self {
        RecorderError::Persistence(err.to_string())
    }
}

impl From<r2d2::Error> for RecorderError {
    fn from(err: r2d2::Error) -> Self {
        RecorderError::Persistence(err.to_string())
    }
}

/// Result type alias using RecorderError
pub type Result<T> = std::result::Result<T, RecorderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(RecorderError::ReplayWhileAwaiting.is_contract_violation());
        assert!(RecorderError::DoubleAcknowledge.is_contract_violation());
        assert!(!RecorderError::DoubleAcknowledge.is_recoverable());

        let err = RecorderError::Persistence("disk full".to_string());
        assert!(err.is_recoverable());
        assert!(!err.is_contract_violation());
    }

    #[test]
    fn test_error_serialization() {
        let json = serde_json::to_string(&RecorderError::StoreCorrupt("bad checksum".into())).unwrap();
        assert_eq!(json, r#"{"type":"StoreCorrupt","message":"bad checksum"}"#);
    }
}
