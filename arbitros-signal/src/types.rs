use arbitros_execution::types::Side;
use arbitros_instrument::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whether a signal was (or will be) executed against real capital or a paper-trading path
/// (§4.11). The hardest, most safety-critical rule in the system decides this; everything
/// downstream of [`crate::dispatcher::decide_trade_type`] is oblivious to the distinction
/// (§9: "single dispatch in SD... all other components are oblivious to the mode").
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum TradeType {
    Validation,
    Real,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Validation => "validation",
            TradeType::Real => "real",
        }
    }
}

/// One dispatched strategy output (§3). Append-only: never mutated after its execution result
/// is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSignal {
    pub id: String,
    pub strategy_id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub confidence: Decimal,
    pub generated_at: DateTime<Utc>,
    pub executed: bool,
    pub trade_type: TradeType,
    pub cycle_id: Option<String>,
    pub realized_pnl: Option<Decimal>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum CycleStatus {
    Open,
    Completed,
    Abandoned,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Open => "open",
            CycleStatus::Completed => "completed",
            CycleStatus::Abandoned => "abandoned",
        }
    }
}

/// A paired open/close signal for one strategy (§3). Opened by a successful real-trade fill;
/// closed by an opposing signal, a stop/target threshold, or an emergency stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeCycle {
    pub cycle_id: String,
    pub strategy_id: String,
    pub open_signal_id: String,
    pub close_signal_id: Option<String>,
    pub open_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
    pub buy_price: Decimal,
    pub sell_price: Option<Decimal>,
    pub quantity: Decimal,
    pub pnl: Option<Decimal>,
    pub status: CycleStatus,
}

impl TradeCycle {
    pub fn open(cycle_id: String, strategy_id: String, open_signal_id: String, buy_price: Decimal, quantity: Decimal, open_time: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            strategy_id,
            open_signal_id,
            close_signal_id: None,
            open_time,
            close_time: None,
            buy_price,
            sell_price: None,
            quantity,
            pnl: None,
            status: CycleStatus::Open,
        }
    }

    pub fn close(&mut self, close_signal_id: String, sell_price: Decimal, close_time: DateTime<Utc>) {
        self.close_signal_id = Some(close_signal_id);
        self.sell_price = Some(sell_price);
        self.close_time = Some(close_time);
        self.pnl = Some((sell_price - self.buy_price) * self.quantity);
        self.status = CycleStatus::Completed;
    }

    pub fn abandon(&mut self, at: DateTime<Utc>) {
        self.close_time = Some(at);
        self.status = CycleStatus::Abandoned;
    }

    pub fn holding_minutes(&self) -> Option<Decimal> {
        self.close_time
            .map(|close| Decimal::from((close - self.open_time).num_seconds()) / Decimal::from(60))
    }
}

/// A strategy's proposed next action, independent of whether it will end up `validation` or
/// `real` — that decision belongs entirely to [`crate::dispatcher`].
#[derive(Debug, Clone, Copy)]
pub struct SignalIntent {
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub confidence: Decimal,
}
