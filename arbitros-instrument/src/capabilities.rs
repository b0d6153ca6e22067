use crate::{exchange::ExchangeId, symbol::Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-exchange fee schedule and supported operations. Centralises what §9 calls out as
/// "ad-hoc fee percentages hard-coded in modules": every component that needs a fee or a
/// capability check reads it from here rather than embedding its own constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeCapabilities {
    pub can_withdraw: bool,
    pub can_deposit: bool,
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
    pub symbols: Vec<Symbol>,
}

impl ExchangeCapabilities {
    pub fn supports(&self, symbol: &Symbol) -> bool {
        self.symbols.contains(symbol)
    }
}

/// An exchange's identity and capabilities, as created at boot from configuration.
/// Immutable thereafter: capability changes require a process restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub id: ExchangeId,
    pub capabilities: ExchangeCapabilities,
}

impl Exchange {
    pub fn new(id: ExchangeId, capabilities: ExchangeCapabilities) -> Self {
        Self { id, capabilities }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;
    use rust_decimal_macros::dec;

    #[test]
    fn supports_checks_listed_symbols_only() {
        let caps = ExchangeCapabilities {
            can_withdraw: true,
            can_deposit: true,
            maker_fee: dec!(0.001),
            taker_fee: dec!(0.001),
            symbols: vec![Symbol::new("BTC", "USDT")],
        };
        assert!(caps.supports(&Symbol::new("BTC", "USDT")));
        assert!(!caps.supports(&Symbol::new("ETH", "USDT")));
    }
}
