//! Event log client for the customer event store.
//!
//! - [`EventStore`]: append commits, read stream ranges, snapshots, and the
//!   dispatch bookkeeping used for redelivery
//! - [`InMemoryEventStore`] and [`PostgresEventStore`] implementations
//! - [`DispatchingEventStore`]: forwards every new [`Commit`] to a
//!   [`DispatchCommits`] implementation

pub mod commit;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use commit::{Commit, CommitId};
pub use common::AggregateId;
pub use dispatch::{DispatchCommits, DispatchError, DispatchLedger, DispatchingEventStore, Handoff};
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream, ExpectedVersion};
