//! Error types for jam-sync operations
//!
//! Only the API client, the storage backends and configuration parsing return
//! these. The Feature Resolver and the Service Status Channel fold every
//! failure into tri-state values and never hand a `SyncError` to consumers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Unauthorized (status {0})")]
    Unauthorized(u16),

    #[error("Endpoint not found: {0}")]
    NotFound(String),

    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("Unexpected content type: {0}")]
    UnexpectedContentType(String),

    #[error("Websocket error: {0}")]
    WebSocket(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage lock poisoned")]
    Poisoned,
}

impl SyncError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 | 403 => Self::Unauthorized(status),
            404 => Self::NotFound(message.into()),
            _ => Self::UnexpectedStatus {
                status,
                message: message.into(),
            },
        }
    }

    /// Whether the backend rejected the bearer credential
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(SyncError::from_status(401, "x").is_unauthorized());
        assert!(SyncError::from_status(403, "x").is_unauthorized());
        assert!(SyncError::from_status(404, "/features").is_not_found());
        assert!(matches!(
            SyncError::from_status(502, "bad gateway"),
            SyncError::UnexpectedStatus { status: 502, .. }
        ));
    }
}
