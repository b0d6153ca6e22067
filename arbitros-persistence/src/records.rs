use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StrategyRecord {
    pub id: String,
    pub name: String,
    pub strategy_type: String,
    pub symbol: String,
    pub tier: String,
    pub enabled: bool,
    pub parent_ids: Vec<String>,
    pub generation: i32,
    pub cycle: i32,
    pub creation_method: String,
    pub last_param_change_at: DateTime<Utc>,
    pub validation_trades_since_change: i32,
    pub final_score: Decimal,
    pub rolling_win_rate: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyParameterRecord {
    pub strategy_id: String,
    pub name: String,
    pub value: Decimal,
    pub min_value: Decimal,
    pub max_value: Decimal,
    pub step: Decimal,
    pub value_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TradingSignalRecord {
    pub id: String,
    pub strategy_id: String,
    pub symbol: String,
    pub side: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub confidence: Decimal,
    pub generated_at: DateTime<Utc>,
    pub executed: bool,
    pub trade_type: String,
    pub cycle_id: Option<String>,
    pub realized_pnl: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeCycleRecord {
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
    pub holding_minutes: Option<Decimal>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub strategy_id: String,
    pub run_at: DateTime<Utc>,
    pub days_simulated: Decimal,
    pub trade_count: i32,
    pub win_rate: Decimal,
    pub total_return: Decimal,
    pub sharpe: Decimal,
    pub max_drawdown: Decimal,
    pub score: Decimal,
    pub parameters_snapshot: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionHistoryRecord {
    pub strategy_id: String,
    pub generation: i32,
    pub cycle: i32,
    pub action: String,
    pub score_before: Option<Decimal>,
    pub score_after: Option<Decimal>,
    pub old_params: Option<Value>,
    pub new_params: Option<Value>,
    pub parameter_diff: Option<Value>,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageTaskRecord {
    pub id: String,
    pub class: String,
    pub opportunity_snapshot: Value,
    pub reserved_capital: Decimal,
    pub state: String,
    pub step_log: Value,
    pub outcome: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: String,
    pub task_id: String,
    pub from_exchange: String,
    pub to_exchange: String,
    pub asset: String,
    pub amount: Decimal,
    pub fee: Decimal,
    pub initiated_at: DateTime<Utc>,
    pub observed_status: String,
    pub last_checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BalanceHistoryRecord {
    pub exchange_id: String,
    pub asset: String,
    pub total: Decimal,
    pub available: Decimal,
    pub locked: Decimal,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OperationLogRecord {
    pub category: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SystemStatusRecord {
    pub quantitative_running: bool,
    pub auto_trading_enabled: bool,
    pub total_strategies: i32,
    pub running_strategies: i32,
    pub current_generation: i32,
    pub evolution_enabled: bool,
    pub health: String,
    pub last_update: DateTime<Utc>,
}

/// One unit of hot-path write traffic. The writer task matches on the variant and issues the
/// corresponding short transaction; overflow on the bounded channel drops the oldest queued
/// record regardless of variant (§4.12 treats all of these as "non-critical" relative to
/// blocking the engine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OperationRecord {
    Strategy(StrategyRecord),
    StrategyParameter(StrategyParameterRecord),
    TradingSignal(TradingSignalRecord),
    TradeCycle(TradeCycleRecord),
    Simulation(SimulationRecord),
    EvolutionHistory(EvolutionHistoryRecord),
    OptimizationLog { strategy_id: String, message: String, at: DateTime<Utc> },
    ArbitrageTask(ArbitrageTaskRecord),
    Transfer(TransferRecord),
    BalanceHistory(BalanceHistoryRecord),
    OperationLog(OperationLogRecord),
    SystemStatus(SystemStatusRecord),
}
