// src/types.rs
//! Crate-wide error type.
//!
//! Connection-level failures (`Tls`, `Connection`, `WebSocket`) end the current
//! connect cycle. Everything else is local to one session or one request and is
//! turned into a response payload or a log line by the caller.

use crate::config::settings::ConfigError;

/// Error types for agent operations
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Stream not connected")]
    NotConnected,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("PTY error: {0}")]
    Pty(String),

    #[error("Unknown operation: {0}")]
    UnknownAction(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Shutdown requested")]
    Cancelled,
}

impl AgentError {
    /// Whether this error ends the current connect cycle.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            AgentError::Tls(_)
                | AgentError::Connection(_)
                | AgentError::WebSocket(_)
                | AgentError::NotConnected
        )
    }
}

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_level_classification() {
        assert!(AgentError::Tls("missing ca.pem".into()).is_connection_level());
        assert!(AgentError::Connection("refused".into()).is_connection_level());
        assert!(!AgentError::SessionNotFound("s1".into()).is_connection_level());
        assert!(!AgentError::UnknownAction("rename".into()).is_connection_level());
    }

    #[test]
    fn test_error_messages() {
        let err = AgentError::SessionNotFound("s1".to_string());
        assert_eq!(err.to_string(), "Session not found: s1");

        let err = AgentError::UnknownAction("rename".to_string());
        assert_eq!(err.to_string(), "Unknown operation: rename");

        let err = AgentError::Execution("failed to start /bin/missing".to_string());
        assert_eq!(err.to_string(), "Execution error: failed to start /bin/missing");
    }
}
