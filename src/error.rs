//! Centralized error types for the Talky gateway

use crate::auth::RejectReason;
use thiserror::Error;

/// Gateway error types
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration is malformed or incomplete (fatal at startup)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Credentials were checked and explicitly refused
    #[error("Authentication rejected: {0}")]
    AuthRejected(RejectReason),

    /// The verification mechanism itself failed (identity store down, etc.)
    #[error("Authentication mechanism failed: {0}")]
    AuthMechanism(String),

    /// The chat backend could not be reached or refused the handshake
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Malformed upgrade request
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    /// Whether this error should terminate the whole process.
    ///
    /// Only configuration errors are fatal; everything else is contained
    /// at the session boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, GatewayError>;
