//! Dispatcher error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by an outbound transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No channel could be opened.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    /// The transport refused or rolled back the message.
    #[error("Send rejected: {0}")]
    Rejected(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Why one event of a commit did not reach the transport.
///
/// Kept as plain data so reports can be broadcast to any number of
/// subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The transport answered with a failure.
    #[error("Transport failed: {0}")]
    Transport(String),

    /// The transport did not answer in time.
    #[error("Timed out after {after:?}")]
    Timeout { after: Duration },
}

impl From<TransportError> for DeliveryError {
    fn from(e: TransportError) -> Self {
        DeliveryError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(e: serde_json::Error) -> Self {
        DeliveryError::Serialization(e.to_string())
    }
}
