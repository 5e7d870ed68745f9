//! Error types for the relay
//!
//! Defines per-session connection errors, hub submission errors and the
//! application-level error used by the connection handler and binary.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Everything here ends the connection it occurred on. None of it reaches
/// the hub loop.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error during the upgrade
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The hub loop is gone
    #[error(transparent)]
    Hub(#[from] HubError),

    /// Identity could not be resolved
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Invalid server configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Connection adapter errors
///
/// Every variant is terminal for the session that hit it.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Inbound payload was not a valid message
    #[error("decode failure: {0}")]
    Decode(#[from] serde_json::Error),

    /// Peer closed, or the adapter was closed locally
    #[error("connection closed")]
    Closed,

    /// Underlying transport failed
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}

impl ConnectionError {
    /// True for malformed inbound payloads, false for transport-level ends
    pub fn is_decode(&self) -> bool {
        matches!(self, ConnectionError::Decode(_))
    }
}

/// Outcome of a non-blocking delivery to one member's outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Queue at capacity, message dropped for this member
    #[error("outbound queue full")]
    Full,

    /// Outbound pump already gone
    #[error("outbound queue closed")]
    Closed,
}

/// Hub submission errors
#[derive(Debug, Error)]
pub enum HubError {
    /// The hub loop has stopped and no longer accepts commands
    #[error("hub unavailable")]
    Unavailable,
}

/// Identity resolution errors
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("unknown token")]
    UnknownToken,

    #[error("identity rejected: {0}")]
    Rejected(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
