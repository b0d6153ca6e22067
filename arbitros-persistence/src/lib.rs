//! Persistence Layer (PL, §4.12): a Postgres-backed relational store reached through a
//! non-blocking bounded write channel, plus synchronous read projections for the control
//! plane.

pub mod channel;
pub mod error;
pub mod pg;
pub mod records;

pub use channel::WriteChannel;
pub use error::PersistenceError;
pub use pg::{PersistenceLayer, DEFAULT_CHANNEL_CAPACITY};
pub use records::OperationRecord;
