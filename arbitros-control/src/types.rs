use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Coherent system health view (§9: "a single SystemStatus owner task aggregates signals from
/// all components"), replacing health reported inconsistently across multiple tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub quantitative_running: bool,
    pub auto_trading_enabled: bool,
    pub total_strategies: u32,
    pub running_strategies: u32,
    pub current_generation: u32,
    pub evolution_enabled: bool,
    pub health: String,
    pub last_update: DateTime<Utc>,
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self {
            quantitative_running: false,
            auto_trading_enabled: false,
            total_strategies: 0,
            running_strategies: 0,
            current_generation: 0,
            evolution_enabled: false,
            health: "ok".to_string(),
            last_update: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// An in-place change requested of the [`crate::status::SystemStatusOwner`] (§5: "a dedicated
/// owner task receiving update messages").
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    SetAutoTrading(bool),
    SetEvolutionEnabled(bool),
    SetQuantitativeRunning(bool),
    SetGeneration(u32),
    SetStrategyCounts { total: u32, running: u32 },
    /// `component` names the tracing target that degraded (e.g. `binance`); `reason` is the
    /// §7 error kind that caused it. `None` clears a prior degradation for that component.
    SetHealth { component: String, reason: Option<String> },
}

/// `{status: ok|error, data?, message?}` response envelope (§6). Every CP command returns one
/// of these regardless of the transport that eventually carries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CommandResponse<T> {
    Ok { data: T },
    Error { message: String },
}

impl<T> CommandResponse<T> {
    pub fn ok(data: T) -> Self {
        CommandResponse::Ok { data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        CommandResponse::Error { message: message.into() }
    }
}

/// Read projection of one exchange/asset balance pair, aggregated from the Persistence
/// Layer's latest observation per (exchange, asset) for `get_account_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    pub exchange_id: String,
    pub asset: String,
    pub total: Decimal,
    pub available: Decimal,
    pub locked: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// Per-class available capital, included in `get_account_info` alongside exchange balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundClassBalance {
    pub class: String,
    pub available: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balances: Vec<AccountBalance>,
    pub fund_classes: Vec<FundClassBalance>,
}
