use serde::{Deserialize, Serialize};
use std::fmt;

/// Error taxonomy shared across every Arbitros component, independent of which concrete error
/// type a given call site returns. Every component-level error carries one of these kinds so
/// that callers, loggers and [`crate::Unrecoverable`] implementations can classify failures
/// uniformly without matching on component-specific variants.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
pub enum ErrorKind {
    /// Recoverable network failure; retry with backoff is the caller's policy.
    TransientNetwork,
    /// Exchange rate limit hit; adapter-level throttling applies.
    RateLimited,
    /// Exchange credentials rejected; fatal for that exchange until reconfigured.
    AuthFailed,
    /// Order or withdrawal rejected for lack of funds.
    InsufficientFunds,
    /// Exchange rejected an order for a reason other than funds (e.g. min-notional).
    Rejected,
    /// A previously detected opportunity no longer holds by the time of execution.
    OpportunityStale,
    /// An on-chain transfer failed outright.
    TransferFailed,
    /// An on-chain transfer did not confirm within its allotted wait.
    TransferTimeout,
    /// Configuration failed validation at startup.
    ConfigInvalid,
    /// The persistence layer is unreachable.
    PersistenceUnavailable,
    /// A strategy's internal logic faulted; the strategy is quarantined, not the process.
    StrategyInternal,
    /// A broken invariant; the owning task is restarted by its supervisor.
    InvariantViolation,
}

impl ErrorKind {
    /// Whether this kind is worth a caller-side retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientNetwork | ErrorKind::RateLimited)
    }

    /// Whether this kind should terminate the owning task rather than be recorded and
    /// continued past, per §7's propagation rule.
    pub fn is_fatal_to_task(&self) -> bool {
        matches!(self, ErrorKind::InvariantViolation)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::Rejected => "rejected",
            ErrorKind::OpportunityStale => "opportunity_stale",
            ErrorKind::TransferFailed => "transfer_failed",
            ErrorKind::TransferTimeout => "transfer_timeout",
            ErrorKind::ConfigInvalid => "config_invalid",
            ErrorKind::PersistenceUnavailable => "persistence_unavailable",
            ErrorKind::StrategyInternal => "strategy_internal",
            ErrorKind::InvariantViolation => "invariant_violation",
        };
        write!(f, "{s}")
    }
}

/// Implemented by channel/send errors to tell [`crate::channel::ChannelTxDroppable`] whether a
/// failure means the receiver is gone for good.
pub trait Unrecoverable {
    fn is_unrecoverable(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_are_exactly_network_and_rate_limit() {
        for kind in [
            ErrorKind::TransientNetwork,
            ErrorKind::RateLimited,
        ] {
            assert!(kind.is_retryable());
        }
        for kind in [
            ErrorKind::InsufficientFunds,
            ErrorKind::Rejected,
            ErrorKind::AuthFailed,
        ] {
            assert!(!kind.is_retryable());
        }
    }

    #[test]
    fn only_invariant_violation_is_fatal_to_task() {
        assert!(ErrorKind::InvariantViolation.is_fatal_to_task());
        assert!(!ErrorKind::TransferFailed.is_fatal_to_task());
    }
}
