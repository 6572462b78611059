//! Domain error types.

use common::AggregateId;
use event_store::{EventStoreError, Version};
use thiserror::Error;

use crate::aggregate::AggregateError;
use crate::customer::CustomerError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Another writer appended to the stream since it was loaded. Reload the
    /// aggregate and try again.
    #[error(
        "Concurrent modification of {aggregate_id}: loaded at {expected:?}, stream at {actual:?}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Option<Version>,
        actual: Option<Version>,
    },

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    NotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// The stored history cannot be replayed.
    #[error("Corrupt stream {aggregate_id}: {reason}")]
    CorruptStream {
        aggregate_id: AggregateId,
        reason: String,
    },

    #[error("Aggregate error: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("Customer error: {0}")]
    Customer(#[from] CustomerError),

    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(EventStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Whether repeating the command against a freshly loaded aggregate may
    /// succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::ConcurrencyConflict { .. })
    }
}

impl From<EventStoreError> for DomainError {
    fn from(e: EventStoreError) -> Self {
        match e {
            EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => DomainError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            },
            EventStoreError::CorruptStream { aggregate_id, .. } => DomainError::CorruptStream {
                aggregate_id,
                reason: e.to_string(),
            },
            other => DomainError::EventStore(other),
        }
    }
}
