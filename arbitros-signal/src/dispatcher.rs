use crate::types::{CycleStatus, SignalIntent, TradeCycle, TradeType, TradingSignal};
use arbitros_execution::{types::Side, ExchangeClient};
use arbitros_integration::time::now_ms;
use arbitros_persistence::{
    records::{TradeCycleRecord, TradingSignalRecord},
    OperationRecord, WriteChannel,
};
use arbitros_strategy::{types::Tier, Strategy};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub param_reval_hours: i64,
    pub param_reval_trades: u32,
    pub trading_min_score: Decimal,
    pub slippage_pct: Decimal,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            param_reval_hours: 24,
            param_reval_trades: 20,
            trading_min_score: dec!(65),
            slippage_pct: dec!(0.0005),
        }
    }
}

/// Decides `validation` vs `real` for one signal (§4.11) — the hardest, most
/// safety-critical rule in the system. Order of checks matters: the param-change
/// re-validation rule strictly dominates the score/tier check, and both strictly dominate the
/// legacy "first N cycles" heuristic (§9 resolves that overlap explicitly in this direction).
pub fn decide_trade_type(
    auto_trading_enabled: bool,
    strategy: &Strategy,
    config: &DispatcherConfig,
    now: DateTime<Utc>,
) -> TradeType {
    if !auto_trading_enabled {
        return TradeType::Validation;
    }

    let hours_since_change = (now - strategy.last_param_change_at).num_hours();
    let reval_in_effect = hours_since_change < config.param_reval_hours
        || strategy.validation_trades_since_change < config.param_reval_trades;
    if reval_in_effect {
        return TradeType::Validation;
    }

    if strategy.metrics.score >= config.trading_min_score && strategy.tier == Tier::Trading {
        TradeType::Real
    } else {
        TradeType::Validation
    }
}

/// Simulated fill for a `validation` signal (§4.11): no EA order call, a modeled slippage
/// applied against the quoted price.
fn paper_fill(side: Side, quoted_price: Decimal, slippage_pct: Decimal) -> Decimal {
    match side {
        Side::Buy => quoted_price * (Decimal::ONE + slippage_pct),
        Side::Sell => quoted_price * (Decimal::ONE - slippage_pct),
    }
}

struct OpenCycles {
    by_strategy: HashMap<String, TradeCycle>,
}

/// Signal Dispatcher (SD, §4.11): decides trade_type per strategy signal, executes real
/// signals via the given [`ExchangeClient`], paper-fills validation signals, and enforces at
/// most one in-flight order per strategy — a queued signal arriving while one is already
/// in-flight is dropped with a recorded reason rather than queued.
pub struct SignalDispatcher {
    config: DispatcherConfig,
    persist: WriteChannel,
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    cycles: Mutex<OpenCycles>,
}

impl SignalDispatcher {
    pub fn new(config: DispatcherConfig, persist: WriteChannel) -> Self {
        Self {
            config,
            persist,
            in_flight: Mutex::new(HashMap::new()),
            cycles: Mutex::new(OpenCycles { by_strategy: HashMap::new() }),
        }
    }

    fn lock_for(&self, strategy_id: &str) -> Arc<AsyncMutex<()>> {
        self.in_flight
            .lock()
            .entry(strategy_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Dispatches one signal intent for `strategy`. Returns `None` (and records the drop
    /// reason) if the strategy already has an order in flight; per-strategy concurrency is at
    /// most one (§4.11).
    pub async fn dispatch(
        &self,
        strategy: &mut Strategy,
        intent: SignalIntent,
        auto_trading_enabled: bool,
        client: Option<&dyn ExchangeClient>,
        symbol: &arbitros_instrument::Symbol,
        cancel: &CancellationToken,
    ) -> Option<TradingSignal> {
        let lock = self.lock_for(&strategy.id);
        let Ok(_guard) = lock.try_lock() else {
            self.record_drop(&strategy.id, "strategy has an order already in flight");
            return None;
        };

        let now = now_ms();
        let trade_type = decide_trade_type(auto_trading_enabled, strategy, &self.config, now);

        let (executed, realized_price) = match trade_type {
            TradeType::Validation => {
                let price = paper_fill(intent.side, intent.price, self.config.slippage_pct);
                strategy.record_validation_trade();
                (true, price)
            }
            TradeType::Real => match client {
                Some(client) => match client.market_order(symbol, intent.side, intent.quantity, cancel).await {
                    Ok(fill) => (true, fill.filled_price),
                    Err(err) => {
                        tracing::warn!(strategy_id = %strategy.id, %err, "real order failed");
                        (false, intent.price)
                    }
                },
                None => {
                    tracing::warn!(strategy_id = %strategy.id, "real trade_type decided but no exchange client supplied");
                    (false, intent.price)
                }
            },
        };

        let signal = TradingSignal {
            id: Uuid::new_v4().to_string(),
            strategy_id: strategy.id.clone(),
            symbol: symbol.clone(),
            side: intent.side,
            price: realized_price,
            quantity: intent.quantity,
            confidence: intent.confidence,
            generated_at: now,
            executed,
            trade_type,
            cycle_id: None,
            realized_pnl: None,
        };

        let signal = self.update_cycle(signal, now);
        self.persist_signal(&signal);
        Some(signal)
    }

    /// Opens or closes a trade cycle for a successfully executed `real` signal: a buy opens
    /// one, a sell closes the open cycle for that strategy (if any) and computes its pnl.
    fn update_cycle(&self, mut signal: TradingSignal, now: DateTime<Utc>) -> TradingSignal {
        if signal.trade_type != TradeType::Real || !signal.executed {
            return signal;
        }

        let mut cycles = self.cycles.lock();
        match signal.side {
            Side::Buy => {
                let cycle_id = Uuid::new_v4().to_string();
                let cycle = TradeCycle::open(cycle_id.clone(), signal.strategy_id.clone(), signal.id.clone(), signal.price, signal.quantity, now);
                self.persist_cycle(&cycle);
                cycles.by_strategy.insert(signal.strategy_id.clone(), cycle);
                signal.cycle_id = Some(cycle_id);
            }
            Side::Sell => {
                if let Some(mut cycle) = cycles.by_strategy.remove(&signal.strategy_id) {
                    cycle.close(signal.id.clone(), signal.price, now);
                    signal.cycle_id = Some(cycle.cycle_id.clone());
                    signal.realized_pnl = cycle.pnl;
                    self.persist_cycle(&cycle);
                }
            }
        }
        signal
    }

    /// Forces an immediate close signal for `strategy_id`'s open cycle at priority (§4.13
    /// `force_close_position`, §8 scenario 6 `emergency_stop`). `exit_price` is the price the
    /// close is recorded at; callers source it from the latest market snapshot.
    pub fn force_close(&self, strategy_id: &str, exit_price: Decimal, reason: &str) -> Option<TradeCycle> {
        let mut cycles = self.cycles.lock();
        let mut cycle = cycles.by_strategy.remove(strategy_id)?;
        let now = now_ms();
        cycle.close(format!("forced-close-{reason}"), exit_price, now);
        self.persist_cycle(&cycle);
        Some(cycle)
    }

    /// Abandons every open cycle without attempting a market close, recording the reason
    /// (used when emergency stop cannot reach the exchange for a given cycle).
    pub fn abandon_all_open(&self, reason: &str) -> Vec<TradeCycle> {
        let mut cycles = self.cycles.lock();
        let now = now_ms();
        let drained: Vec<_> = cycles.by_strategy.drain().map(|(_, mut c)| {
            c.abandon(now);
            c
        }).collect();
        for cycle in &drained {
            tracing::info!(strategy_id = %cycle.strategy_id, reason, "cycle abandoned by emergency stop");
            self.persist_cycle(cycle);
        }
        drained
    }

    fn record_drop(&self, strategy_id: &str, reason: &str) {
        self.persist.send(OperationRecord::OperationLog(arbitros_persistence::records::OperationLogRecord {
            category: "signal_dropped".to_string(),
            message: format!("strategy {strategy_id}: {reason}"),
            at: now_ms(),
        }));
    }

    fn persist_signal(&self, signal: &TradingSignal) {
        self.persist.send(OperationRecord::TradingSignal(TradingSignalRecord {
            id: signal.id.clone(),
            strategy_id: signal.strategy_id.clone(),
            symbol: signal.symbol.to_string(),
            side: format!("{:?}", signal.side).to_lowercase(),
            price: signal.price,
            quantity: signal.quantity,
            confidence: signal.confidence,
            generated_at: signal.generated_at,
            executed: signal.executed,
            trade_type: signal.trade_type.as_str().to_string(),
            cycle_id: signal.cycle_id.clone(),
            realized_pnl: signal.realized_pnl,
        }));
    }

    fn persist_cycle(&self, cycle: &TradeCycle) {
        self.persist.send(OperationRecord::TradeCycle(TradeCycleRecord {
            cycle_id: cycle.cycle_id.clone(),
            strategy_id: cycle.strategy_id.clone(),
            open_signal_id: cycle.open_signal_id.clone(),
            close_signal_id: cycle.close_signal_id.clone(),
            open_time: cycle.open_time,
            close_time: cycle.close_time,
            buy_price: cycle.buy_price,
            sell_price: cycle.sell_price,
            quantity: cycle.quantity,
            pnl: cycle.pnl,
            holding_minutes: cycle.holding_minutes(),
            status: cycle.status.as_str().to_string(),
        }));
    }

    /// Snapshot of strategy ids with a currently open cycle, for `emergency_stop`.
    pub fn open_strategy_ids(&self) -> Vec<String> {
        self.cycles.lock().by_strategy.keys().cloned().collect()
    }
}

impl CycleStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CycleStatus::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbitros_execution::MockExchangeClient;
    use arbitros_instrument::Symbol;
    use arbitros_strategy::types::{Lineage, RollingMetrics, StrategyParameters};

    fn strategy_at_trading_tier(hours_since_change: i64, validation_trades: u32) -> Strategy {
        let mut s = Strategy::new(
            "s-1".into(),
            "s-1".into(),
            "momentum".into(),
            Symbol::new("BTC", "USDT"),
            StrategyParameters::new(),
            Lineage::seed(),
            now_ms(),
        );
        s.tier = Tier::Trading;
        s.metrics = RollingMetrics { score: dec!(80), win_rate: dec!(0.7), consecutive_improvements: 5, trade_count: 100 };
        s.last_param_change_at = now_ms() - chrono::Duration::hours(hours_since_change);
        s.validation_trades_since_change = validation_trades;
        s
    }

    #[test]
    fn auto_trading_disabled_forces_validation_regardless_of_score() {
        let s = strategy_at_trading_tier(48, 30);
        let trade_type = decide_trade_type(false, &s, &DispatcherConfig::default(), now_ms());
        assert_eq!(trade_type, TradeType::Validation);
    }

    #[test]
    fn fresh_param_change_forces_validation_even_at_high_score() {
        let s = strategy_at_trading_tier(1, 30); // only 1h elapsed
        let trade_type = decide_trade_type(true, &s, &DispatcherConfig::default(), now_ms());
        assert_eq!(trade_type, TradeType::Validation);
    }

    #[test]
    fn too_few_validation_trades_forces_validation_even_past_the_time_window() {
        let s = strategy_at_trading_tier(48, 5); // time elapsed, but too few validation trades
        let trade_type = decide_trade_type(true, &s, &DispatcherConfig::default(), now_ms());
        assert_eq!(trade_type, TradeType::Validation);
    }

    #[test]
    fn stable_high_scoring_trading_tier_strategy_goes_real() {
        let s = strategy_at_trading_tier(48, 30);
        let trade_type = decide_trade_type(true, &s, &DispatcherConfig::default(), now_ms());
        assert_eq!(trade_type, TradeType::Real);
    }

    #[test]
    fn no_real_signal_exists_within_the_reval_window_after_a_param_change() {
        // §8: inject a param change, then verify every signal in the reval window is
        // validation regardless of score.
        let config = DispatcherConfig { param_reval_hours: 24, param_reval_trades: 20, ..Default::default() };
        let mut s = strategy_at_trading_tier(0, 0);

        for hour in 0..24 {
            s.last_param_change_at = now_ms() - chrono::Duration::hours(hour);
            let trade_type = decide_trade_type(true, &s, &config, now_ms());
            assert_eq!(trade_type, TradeType::Validation, "hour {hour} should still be validation");
        }
    }

    #[tokio::test]
    async fn second_concurrent_dispatch_is_dropped_not_queued() {
        let dispatcher = SignalDispatcher::new(DispatcherConfig::default(), WriteChannel::new(64));
        let mut s = strategy_at_trading_tier(0, 0); // validation path, no EA call needed
        let symbol = Symbol::new("BTC", "USDT");
        let cancel = CancellationToken::new();

        let lock = dispatcher.lock_for(&s.id);
        let _held = lock.try_lock().unwrap();

        let intent = SignalIntent { side: Side::Buy, price: dec!(30000), quantity: dec!(0.01), confidence: dec!(0.8) };
        let result = dispatcher.dispatch(&mut s, intent, true, None, &symbol, &cancel).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn real_buy_then_sell_completes_a_trade_cycle() {
        let dispatcher = SignalDispatcher::new(DispatcherConfig::default(), WriteChannel::new(64));
        let mut s = strategy_at_trading_tier(48, 30);
        let symbol = Symbol::new("BTC", "USDT");
        let cancel = CancellationToken::new();
        let client = MockExchangeClient::new(dec!(0.001));
        client.seed_ticker(arbitros_execution::types::Ticker {
            exchange: arbitros_instrument::ExchangeId::Mock,
            symbol: symbol.clone(),
            bid: dec!(30000),
            ask: dec!(30010),
            last: dec!(30005),
            bid_depth_top_n: vec![],
            ask_depth_top_n: vec![],
            quote_volume_24h: dec!(0),
            observed_at: now_ms(),
        });

        let buy = SignalIntent { side: Side::Buy, price: dec!(30000), quantity: dec!(0.01), confidence: dec!(0.9) };
        let signal = dispatcher.dispatch(&mut s, buy, true, Some(&client), &symbol, &cancel).await.unwrap();
        assert_eq!(signal.trade_type, TradeType::Real);
        assert!(signal.cycle_id.is_some());
        assert!(dispatcher.open_strategy_ids().contains(&s.id));

        let sell = SignalIntent { side: Side::Sell, price: dec!(30300), quantity: dec!(0.01), confidence: dec!(0.9) };
        let signal = dispatcher.dispatch(&mut s, sell, true, Some(&client), &symbol, &cancel).await.unwrap();
        assert_eq!(signal.trade_type, TradeType::Real);
        assert!(signal.realized_pnl.is_some());
        assert!(!dispatcher.open_strategy_ids().contains(&s.id));
    }
}
