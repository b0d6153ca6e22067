use crate::asset::AssetId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A tradeable pair on one exchange, eg/ `BTC/USDT`. `base` is the asset bought/sold; `quote`
/// is the asset it is priced in.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub base: AssetId,
    pub quote: AssetId,
}

impl Symbol {
    pub fn new(base: impl Into<AssetId>, quote: impl Into<AssetId>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[error("symbol `{0}` is not in BASE/QUOTE form")]
pub struct SymbolParseError(String);

impl FromStr for Symbol {
    type Err = SymbolParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once('/')
            .ok_or_else(|| SymbolParseError(s.to_string()))?;
        if base.is_empty() || quote.is_empty() {
            return Err(SymbolParseError(s.to_string()));
        }
        Ok(Symbol::new(base, quote))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_base_quote_pair() {
        let sym: Symbol = "BTC/USDT".parse().unwrap();
        assert_eq!(sym.base.as_str(), "BTC");
        assert_eq!(sym.quote.as_str(), "USDT");
        assert_eq!(sym.to_string(), "BTC/USDT");
    }

    #[test]
    fn rejects_malformed_symbol() {
        assert!("BTCUSDT".parse::<Symbol>().is_err());
    }
}
