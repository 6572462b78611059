//! Delivery of committed events to an outbound queue.
//!
//! - [`CommitDispatcher`]: bounded queue plus worker task; implements
//!   [`event_store::DispatchCommits`] so a [`event_store::DispatchingEventStore`]
//!   can hand it every new commit
//! - [`deliver_commit`]: per-event transactional delivery with timeouts
//! - [`Transport`] / [`Channel`] with [`InMemoryTransport`] and
//!   [`PostgresQueueTransport`]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod postgres;
pub mod transport;

pub use config::DispatcherConfig;
pub use dispatcher::{
    CommitDispatcher, DeliveryFailure, DispatchReport, DispatchWorkerHandle, deliver_commit,
};
pub use error::{DeliveryError, TransportError};
pub use message::OutboundMessage;
pub use postgres::PostgresQueueTransport;
pub use transport::{Channel, InMemoryTransport, Transport};
