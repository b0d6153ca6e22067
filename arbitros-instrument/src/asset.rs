use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Unique identifier for an asset (eg/ "BTC", "USDT"), shared across every exchange that
/// lists it so transfers and triangular cycles can be reasoned about without per-exchange
/// translation tables.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, Constructor,
)]
pub struct AssetId(pub SmolStr);

impl AssetId {
    pub fn new_str(asset: &str) -> Self {
        Self(SmolStr::new(asset.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self::new_str(value)
    }
}
