use thiserror::Error;

use crate::error::TetherError;

/// Authorization and credential errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Request rejected with status {status}")]
    Rejected { status: u16 },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    /// Raised by [`crate::beacon::Broadcaster`] implementations.
    #[error("Broadcast error: {0}")]
    Broadcast(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<AuthError> for TetherError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Rejected { status } => {
                TetherError::http(status, "authorization server rejected the request")
            }
            AuthError::Io(message) => TetherError::Storage(message),
            other => TetherError::Authentication(other.to_string()),
        }
    }
}
