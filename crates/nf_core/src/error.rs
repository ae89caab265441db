use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of outbound call failure kinds. Retry tables are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connect failure, timeout or broken transport.
    Connectivity,
    /// The upstream answered with a non-success status.
    BadResponse,
    /// The upstream answered but the body could not be decoded.
    InvalidPayload,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Connectivity => "connectivity",
            FailureKind::BadResponse => "bad_response",
            FailureKind::InvalidPayload => "invalid_payload",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection failed: {0}")]
    Connectivity(String),

    #[error("Bad response (HTTP {status}): {message}")]
    BadResponse { status: u16, message: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("State store error: {0}")]
    State(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl Error {
    pub fn connectivity(message: impl Into<String>) -> Self {
        Error::Connectivity(message.into())
    }

    pub fn bad_response(status: u16, message: impl Into<String>) -> Self {
        Error::BadResponse {
            status,
            message: message.into(),
        }
    }

    /// The retry-table key for this failure, if it is an outbound call failure.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Error::Connectivity(_) => Some(FailureKind::Connectivity),
            Error::BadResponse { .. } => Some(FailureKind::BadResponse),
            Error::InvalidPayload(_) => Some(FailureKind::InvalidPayload),
            _ => None,
        }
    }

    /// True when the storage layer itself is gone rather than a single write failing.
    pub fn is_systemic(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_classification() {
        assert_eq!(
            Error::connectivity("timed out").failure_kind(),
            Some(FailureKind::Connectivity)
        );
        assert_eq!(
            Error::bad_response(503, "unavailable").failure_kind(),
            Some(FailureKind::BadResponse)
        );
        assert_eq!(
            Error::InvalidPayload("eof".into()).failure_kind(),
            Some(FailureKind::InvalidPayload)
        );
        assert_eq!(Error::Storage("locked".into()).failure_kind(), None);
    }

    #[test]
    fn test_only_unavailable_storage_is_systemic() {
        assert!(Error::StorageUnavailable("pool closed".into()).is_systemic());
        assert!(!Error::Storage("constraint".into()).is_systemic());
        assert!(!Error::connectivity("reset").is_systemic());
    }

    #[test]
    fn test_bad_response_message() {
        let err = Error::bad_response(429, "slow down");
        assert_eq!(err.to_string(), "Bad response (HTTP 429): slow down");
    }
}
