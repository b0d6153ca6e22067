//! Control Plane (CP, §4.13): the transport-neutral command/query surface over the strategy
//! pool, evolution scheduler, signal dispatcher and fund allocator. Every command returns a
//! [`types::CommandResponse`] regardless of which transport (REST, CLI, etc.) eventually wraps
//! it. [`status::SystemStatusOwner`] is the single writer of [`types::SystemStatus`] (§9); every
//! other component submits [`types::StatusUpdate`] messages instead of mutating shared state.

pub mod commands;
pub mod status;
pub mod types;

pub use commands::ControlPlane;
pub use status::{SystemStatusHandle, SystemStatusOwner};
pub use types::{AccountBalance, AccountInfo, CommandResponse, FundClassBalance, StatusUpdate, SystemStatus};
