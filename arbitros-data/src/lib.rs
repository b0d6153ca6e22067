//! Market Data Service (MDS, §4.2): one supervised poll loop per exchange publishing
//! immutable, epoch-stamped ticker snapshots into a shared map that the rest of the system
//! reads without ever blocking a poll loop.

pub mod poll;
pub mod service;
pub mod snapshot_map;

pub use poll::{PollTarget, DEFAULT_POLL_INTERVAL, RECONNECT_AFTER_CONSECUTIVE_FAILURES};
pub use service::MarketDataService;
pub use snapshot_map::{MarketKey, SnapshotMap};
