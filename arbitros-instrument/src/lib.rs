//! Core identity types shared by every Arbitros component: exchange identifiers, assets,
//! symbols, and the per-exchange capability record that centralises fee schedules and
//! withdraw/deposit support.

pub mod asset;
pub mod capabilities;
pub mod exchange;
pub mod symbol;

pub use asset::AssetId;
pub use capabilities::{Exchange, ExchangeCapabilities};
pub use exchange::{ExchangeId, ExchangeIndex};
pub use symbol::Symbol;
