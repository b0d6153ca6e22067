use arbitros_instrument::{AssetId, ExchangeId, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-of-book-plus-depth ticker snapshot for one (exchange, symbol). Owned by the Market
/// Data Service; replaced whole on each poll, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub exchange: ExchangeId,
    pub symbol: Symbol,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub bid_depth_top_n: Vec<(Decimal, Decimal)>,
    pub ask_depth_top_n: Vec<(Decimal, Decimal)>,
    pub quote_volume_24h: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// Top-N bids/asks returned by `fetch_order_book`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookTop {
    pub symbol: Symbol,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
    pub observed_at: DateTime<Utc>,
}

/// Per-asset balance snapshot, not a journal.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub total: Decimal,
    pub free: Decimal,
    pub locked: Decimal,
}

pub type BalanceMap = HashMap<AssetId, AssetBalance>;

/// Result of a market order fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    pub filled_price: Decimal,
    pub filled_qty: Decimal,
    pub fee: Decimal,
    pub fee_asset: AssetId,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub transfer_id: String,
    pub fee: Decimal,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositAddress {
    pub address: String,
    pub memo: Option<String>,
}
