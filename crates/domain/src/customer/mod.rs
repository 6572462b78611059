//! Customer aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod value_objects;

pub use aggregate::Customer;
pub use commands::*;
pub use events::{
    AddressChanged, ContactChanged, CustomerCreated, CustomerDeleted, CustomerEvent,
    PersonChanged,
};
pub use service::CustomerService;
pub use value_objects::{Address, Contact, LifecycleState, Person};

use common::AggregateId;
use thiserror::Error;

/// Business-rule violations rejected before any event is produced.
#[derive(Debug, Error)]
pub enum CustomerError {
    /// The customer was deleted; closed customers accept no changes.
    #[error("Customer {aggregate_id} is closed")]
    Closed { aggregate_id: AggregateId },

    #[error("Customer {aggregate_id} already exists")]
    AlreadyCreated { aggregate_id: AggregateId },

    #[error("{field} is required")]
    Required { field: &'static str },
}
