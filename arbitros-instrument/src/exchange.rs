use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor,
)]
pub struct ExchangeIndex(pub usize);

impl ExchangeIndex {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ExchangeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExchangeIndex({})", self.0)
    }
}

/// Unique identifier for a venue Arbitros can trade on.
///
/// `Mock` is the in-process test double used by integration tests and by the simulation
/// engine's paper-trading fills; it carries no network behaviour.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename = "exchange", rename_all = "snake_case")]
pub enum ExchangeId {
    Binance,
    Okx,
    Bitget,
    Mock,
}

impl ExchangeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Binance => "binance",
            ExchangeId::Okx => "okx",
            ExchangeId::Bitget => "bitget",
            ExchangeId::Mock => "mock",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn de_exchange_id_is_snake_case() {
        assert_eq!(
            serde_json::from_str::<ExchangeId>(r#""okx""#).unwrap(),
            ExchangeId::Okx
        );
    }
}
