//! Domain layer for the customer event store.
//!
//! This crate provides:
//! - [`AggregateRoot`], the generic driver folding typed events into an
//!   [`Aggregate`] state struct with strict version checks
//! - [`Reconstructor`], rebuilding aggregates from snapshot plus replay
//! - [`CommandHandler`], persisting what intent operations record
//! - the [`Customer`] aggregate and its [`CustomerService`]

pub mod aggregate;
pub mod command;
pub mod customer;
pub mod error;
pub mod reconstruct;

pub use aggregate::{Aggregate, AggregateError, AggregateRoot, DomainEvent, SnapshotPolicy};
pub use command::{CommandHandler, CommandResult};
pub use customer::{
    Address, ChangeAddress, ChangeContact, ChangePerson, Contact, CreateCustomer, Customer,
    CustomerError, CustomerEvent, CustomerService, DeleteCustomer, LifecycleState, Person,
};
pub use error::DomainError;
pub use reconstruct::Reconstructor;
