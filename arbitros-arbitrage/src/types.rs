use arbitros_execution::types::{Side, WithdrawalStatus};
use arbitros_instrument::{AssetId, ExchangeId, Symbol};
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Derived cross-exchange price gap for one symbol, kept in the detector's working set for
/// 24h (§3). Not persisted directly; opportunities computed from it are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Constructor)]
pub struct PriceDiff {
    pub symbol: Symbol,
    pub low_exchange: ExchangeId,
    pub high_exchange: ExchangeId,
    pub low_ask: Decimal,
    pub high_bid: Decimal,
    pub abs_diff: Decimal,
    pub pct_diff: Decimal,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum OpportunityClass {
    CrossExchange,
    Triangular,
}

impl OpportunityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityClass::CrossExchange => "cross_exchange",
            OpportunityClass::Triangular => "triangular",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossExchangeOpportunity {
    pub symbol: Symbol,
    pub buy_exchange: ExchangeId,
    pub sell_exchange: ExchangeId,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub net_pct_after_fees_and_transfer: Decimal,
    pub est_transfer_minutes: Decimal,
    pub est_transfer_fee: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangularStep {
    pub symbol: Symbol,
    pub direction: Side,
    /// Conversion rate observed at detection time (`1/ask` for a buy, `bid` for a sell); the
    /// executor uses it to size the leg's order before the live fill corrects the working
    /// amount.
    pub rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangularOpportunity {
    pub exchange: ExchangeId,
    pub path: [TriangularStep; 3],
    pub expected_end_amount_per_unit_start: Decimal,
    pub net_pct: Decimal,
}

/// A ranked candidate from the detector (§4.3): `net_pct() > configured_min_profit_pct` is
/// enforced by the detector before an opportunity is ever constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArbitrageOpportunity {
    CrossExchange(CrossExchangeOpportunity),
    Triangular(TriangularOpportunity),
}

impl ArbitrageOpportunity {
    pub fn net_pct(&self) -> Decimal {
        match self {
            ArbitrageOpportunity::CrossExchange(o) => o.net_pct_after_fees_and_transfer,
            ArbitrageOpportunity::Triangular(o) => o.net_pct,
        }
    }

    pub fn class(&self) -> OpportunityClass {
        match self {
            ArbitrageOpportunity::CrossExchange(_) => OpportunityClass::CrossExchange,
            ArbitrageOpportunity::Triangular(_) => OpportunityClass::Triangular,
        }
    }

    /// Triangular opportunities settle within one exchange and complete faster than a
    /// cross-exchange opportunity, whose transfer wait dominates latency — the §4.3 tie-break.
    pub fn estimated_latency_rank(&self) -> u8 {
        match self {
            ArbitrageOpportunity::Triangular(_) => 0,
            ArbitrageOpportunity::CrossExchange(_) => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Executing,
    AwaitingTransfer,
    Settling,
    Completed,
    FailedUnwound,
    FailedStuck,
    FailedTimeout,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed
                | TaskState::FailedUnwound
                | TaskState::FailedStuck
                | TaskState::FailedTimeout
                | TaskState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Executing => "executing",
            TaskState::AwaitingTransfer => "awaiting_transfer",
            TaskState::Settling => "settling",
            TaskState::Completed => "completed",
            TaskState::FailedUnwound => "failed_unwound",
            TaskState::FailedStuck => "failed_stuck",
            TaskState::FailedTimeout => "failed_timeout",
            TaskState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLogEntry {
    pub at: DateTime<Utc>,
    pub description: String,
    pub ok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub realized_pnl: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub from_exchange: ExchangeId,
    pub to_exchange: ExchangeId,
    pub asset: AssetId,
    pub amount: Decimal,
    pub fee: Decimal,
    pub initiated_at: DateTime<Utc>,
    pub observed_status: WithdrawalStatus,
    pub last_checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageTask {
    pub id: String,
    pub class: OpportunityClass,
    pub opportunity: ArbitrageOpportunity,
    pub reserved_capital: Decimal,
    pub state: TaskState,
    pub step_log: Vec<StepLogEntry>,
    pub transfers: Vec<Transfer>,
    pub outcome: Option<TaskOutcome>,
    pub created_at: DateTime<Utc>,
}

impl ArbitrageTask {
    pub fn new(
        id: String,
        opportunity: ArbitrageOpportunity,
        reserved_capital: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            class: opportunity.class(),
            opportunity,
            reserved_capital,
            state: TaskState::Pending,
            step_log: Vec::new(),
            transfers: Vec::new(),
            outcome: None,
            created_at,
        }
    }

    pub fn log(&mut self, at: DateTime<Utc>, description: impl Into<String>, ok: bool) {
        self.step_log.push(StepLogEntry {
            at,
            description: description.into(),
            ok,
        });
    }

    /// At most one active (non-terminal) transfer per task (§4.5 invariant).
    pub fn active_transfer(&self) -> Option<&Transfer> {
        self.transfers
            .iter()
            .find(|t| matches!(t.observed_status, WithdrawalStatus::Pending))
    }
}
