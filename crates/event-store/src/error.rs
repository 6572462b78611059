use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors that can occur when interacting with the event log.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The stream was not at the version the writer expected, or another
    /// writer got the next version first.
    #[error(
        "Concurrency conflict for aggregate {aggregate_id}: expected version {expected:?}, found {actual:?}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Option<Version>,
        actual: Option<Version>,
    },

    /// The batch handed to `append` cannot form a commit.
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// A fetched range is not a contiguous run of versions.
    #[error("Corrupt stream {aggregate_id}: expected version {expected}, found {found}")]
    CorruptStream {
        aggregate_id: AggregateId,
        expected: Version,
        found: Version,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
