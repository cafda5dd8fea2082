//! Error taxonomy surfaced by the transport adapters.

use thiserror::Error;

/// Result type alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Transient failure reaching the server; retrying is the caller's choice.
    #[error("network error: {0}")]
    Network(String),

    #[error("server rejected request ({status}): {message}")]
    ServerRejected { status: u16, message: String },

    /// Wrong or expired one-time code. Requires fresh entry, not a retry.
    #[error("invalid or expired one-time code")]
    InvalidCode,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::ServerRejected {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Whether the same request may succeed if issued again unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Protocol(err.to_string());
        }

        match err.status() {
            Some(status) if status.as_u16() == 404 => Self::NotFound(err.to_string()),
            Some(status) => Self::rejected(status.as_u16(), err.to_string()),
            None => Self::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("malformed payload: {err}"))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Network(format!("channel error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_transient() {
        assert!(TransportError::network("reset").is_transient());
        assert!(!TransportError::InvalidCode.is_transient());
        assert!(!TransportError::rejected(429, "slow down").is_transient());
        assert!(!TransportError::not_found("chat 9").is_transient());
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            TransportError::rejected(422, "bad email").to_string(),
            "server rejected request (422): bad email"
        );
        assert_eq!(
            TransportError::InvalidCode.to_string(),
            "invalid or expired one-time code"
        );
    }
}
