//! Read models and projections for the query side.
//!
//! - [`Projection`] trait for processing events into read models, with
//!   [`StreamPositions`] making delivery idempotent per stream
//! - [`ProjectionProcessor`] for feeding events and commits to projections
//! - [`CustomerDirectoryView`], a list view of customers
//! - [`CustomerQueries`], customer details read from the reconstructed
//!   aggregate

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, StreamPositions};
pub use read_model::ReadModel;
pub use views::{CustomerDirectoryView, CustomerQueries, CustomerReadModel, CustomerSummary};
