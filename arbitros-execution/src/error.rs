use arbitros_integration::ErrorKind;

/// Error returned by every [`crate::client::ExchangeClient`] operation. Carries the §7
/// [`ErrorKind`] classification plus a human-readable detail for logs.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ExecutionError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn transient(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientNetwork, detail)
    }

    pub fn rate_limited(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, detail)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::TransientNetwork, "operation cancelled")
    }
}

/// Distinguished symbol-unknown failure, reported via [`ExecutionError::kind`] as
/// [`ErrorKind::Rejected`] with detail carrying this marker so callers can match on it.
pub const SYMBOL_UNKNOWN: &str = "symbol_unknown";
pub const DISABLED: &str = "disabled";
pub const ADDRESS_REJECTED: &str = "address_rejected";
pub const ASSET_NOT_SUPPORTED: &str = "asset_not_supported";
pub const MIN_NOTIONAL: &str = "min_notional";
