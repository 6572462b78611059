//! Read model views for the query side.

pub mod customer_details;
pub mod customer_directory;

pub use customer_details::{CustomerQueries, CustomerReadModel};
pub use customer_directory::{CustomerDirectoryView, CustomerSummary};
