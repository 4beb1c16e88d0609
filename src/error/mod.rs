//! Error types for Tether.

use thiserror::Error;

/// Primary error type for all Tether operations.
#[derive(Error, Debug)]
pub enum TetherError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("HTTP error (status {status}): {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Network,
    Timeout,
    Server,
    Http,
    Configuration,
    Serialization,
    Storage,
    Transport,
    Unknown,
}

impl TetherError {
    /// Create an HTTP status error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::Network(_) => ErrorCategory::Network,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Http { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Http,
            },
            Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether the periodic timers may reasonably succeed where this failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
                | ErrorCategory::Transport
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TetherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_maps_to_category() {
        assert_eq!(
            TetherError::http(401, "unauthorized").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            TetherError::http(503, "unavailable").category(),
            ErrorCategory::Server
        );
        assert_eq!(
            TetherError::http(404, "missing").category(),
            ErrorCategory::Http
        );
    }

    #[test]
    fn retryable_covers_transient_failures_only() {
        assert!(TetherError::Timeout(500).is_retryable());
        assert!(TetherError::Transport("reset".into()).is_retryable());
        assert!(!TetherError::Configuration("bad".into()).is_retryable());
        assert!(!TetherError::http(401, "nope").is_retryable());
    }

    #[test]
    fn http_error_display_includes_status() {
        let err = TetherError::http(400, "bad request");
        assert_eq!(err.to_string(), "HTTP error (status 400): bad request");
    }
}
