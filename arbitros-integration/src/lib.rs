//! Low-level primitives shared by every Arbitros crate: the cross-component error taxonomy,
//! exact-decimal helpers, publish-epoch snapshots, a priority-aware rate limiter, and the
//! channel plumbing used to wire engines together without cyclic ownership.

pub mod channel;
pub mod decimal;
pub mod error;
pub mod rate_limit;
pub mod snapshot;
pub mod time;

pub use error::{ErrorKind, Unrecoverable};
pub use rate_limit::{Priority, RateLimiter};
pub use snapshot::{PublishEpoch, Published, Snapshot};
