//! Signal Dispatcher (SD, §4.11): the single choke point between a strategy's proposed next
//! action and an order on an exchange. Decides `validation` vs `real` per strategy per
//! signal, paper-fills validation signals, executes real signals through an
//! [`arbitros_execution::ExchangeClient`], and tracks the resulting trade cycles. Every other
//! component downstream of dispatch is oblivious to which mode a signal was in.

pub mod dispatcher;
pub mod types;

pub use dispatcher::{decide_trade_type, DispatcherConfig, SignalDispatcher};
pub use types::{CycleStatus, SignalIntent, TradeCycle, TradeType, TradingSignal};
