//! Outbound relay: wires the PostgreSQL event log to the commit dispatcher
//! and keeps redelivering commits whose hand-off did not complete.

pub mod config;
pub mod error;
pub mod relay;

pub use config::{LogFormat, RelayConfig};
pub use error::{RelayError, Result};
pub use relay::Relay;
