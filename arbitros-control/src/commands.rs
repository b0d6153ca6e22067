use crate::{
    status::SystemStatusHandle,
    types::{AccountBalance, AccountInfo, CommandResponse, FundClassBalance, StatusUpdate, SystemStatus},
};
use arbitros_arbitrage::{FundAllocator, OpportunityClass};
use arbitros_integration::time::now_ms;
use arbitros_persistence::{
    records::{OperationLogRecord, OperationRecord, StrategyRecord, TradingSignalRecord},
    PersistenceLayer, WriteChannel,
};
use arbitros_signal::{SignalDispatcher, TradeCycle};
use arbitros_strategy::{pool::StrategyPool, EvolutionScheduler};
use rust_decimal::Decimal;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Control Plane (CP, §4.13): the transport-neutral command/query surface. Holds references
/// to every component it drives but never holds a lock across an await point that reaches an
/// exchange — callers that need a fresh market price fetch it themselves and pass it in
/// (e.g. [`Self::force_close_position`]'s `exit_price`), keeping CP's own critical sections O(1).
pub struct ControlPlane {
    pool: StrategyPool,
    evolution: Arc<EvolutionScheduler>,
    dispatcher: Arc<SignalDispatcher>,
    allocator: Arc<FundAllocator>,
    persistence: Arc<PersistenceLayer>,
    write_queue: WriteChannel,
    status: SystemStatusHandle,
    evolution_enabled: Arc<AtomicBool>,
}

impl ControlPlane {
    pub fn new(
        pool: StrategyPool,
        evolution: Arc<EvolutionScheduler>,
        dispatcher: Arc<SignalDispatcher>,
        allocator: Arc<FundAllocator>,
        persistence: Arc<PersistenceLayer>,
        status: SystemStatusHandle,
    ) -> Self {
        let write_queue = persistence.queue();
        Self {
            pool,
            evolution,
            dispatcher,
            allocator,
            persistence,
            write_queue,
            status,
            evolution_enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag the composition root's evolution loop checks before each tick (§4.9 gated
    /// by `enable_evolution`); cloning this out lets CP toggle it without owning the loop.
    pub fn evolution_gate(&self) -> Arc<AtomicBool> {
        self.evolution_enabled.clone()
    }

    fn audit(&self, message: impl Into<String>) {
        self.write_queue.send(OperationRecord::OperationLog(OperationLogRecord {
            category: "user_action".to_string(),
            message: message.into(),
            at: now_ms(),
        }));
    }

    pub async fn list_strategies(&self, tier: Option<&str>, limit: i64) -> CommandResponse<Vec<StrategyRecord>> {
        match self.persistence.list_strategies(tier, limit).await {
            Ok(rows) => CommandResponse::ok(rows),
            Err(err) => CommandResponse::error(err.to_string()),
        }
    }

    pub async fn get_strategy(&self, id: &str) -> CommandResponse<Option<StrategyRecord>> {
        match self.persistence.get_strategy(id).await {
            Ok(row) => CommandResponse::ok(row),
            Err(err) => CommandResponse::error(err.to_string()),
        }
    }

    pub fn toggle_auto_trading(&self, enabled: bool) -> CommandResponse<SystemStatus> {
        self.status.send(StatusUpdate::SetAutoTrading(enabled));
        self.audit(format!("toggle_auto_trading({enabled})"));
        CommandResponse::ok((*self.status.current()).clone())
    }

    pub fn enable_evolution(&self, enabled: bool) -> CommandResponse<SystemStatus> {
        self.evolution_enabled.store(enabled, Ordering::Release);
        self.status.send(StatusUpdate::SetEvolutionEnabled(enabled));
        self.audit(format!("enable_evolution({enabled})"));
        CommandResponse::ok((*self.status.current()).clone())
    }

    /// Runs one iteration of the slow loop synchronously (§4.13), independent of whether the
    /// scheduled loop is currently enabled.
    pub fn force_evolution_cycle(&self) -> CommandResponse<Vec<String>> {
        let actions = self.evolution.slow_cycle(now_ms(), &mut rand::rng());
        self.audit(format!("force_evolution_cycle: {} actions", actions.len()));
        CommandResponse::ok(actions.into_iter().map(|a| format!("{}: {} ({})", a.strategy_id, a.action, a.reason)).collect())
    }

    /// Forces the strategy's open cycle closed at `exit_price` (caller-supplied so CP never
    /// itself performs the EA call that sourced it; see the struct doc).
    pub fn force_close_position(&self, strategy_id: &str, exit_price: Decimal) -> CommandResponse<Option<TradeCycle>> {
        let closed = self.dispatcher.force_close(strategy_id, exit_price, "force_close_position");
        self.audit(format!("force_close_position({strategy_id})"));
        CommandResponse::ok(closed)
    }

    /// Sets `auto_trading=false` and abandons every open cycle with a recorded reason.
    /// Idempotent (§8): a second call finds no open cycles and is a no-op beyond re-asserting
    /// `auto_trading=false`, leaving the system in the same state as a single call.
    pub fn emergency_stop(&self) -> CommandResponse<Vec<TradeCycle>> {
        self.status.send(StatusUpdate::SetAutoTrading(false));
        let abandoned = self.dispatcher.abandon_all_open("emergency_stop");
        self.audit(format!("emergency_stop: {} cycles abandoned", abandoned.len()));
        CommandResponse::ok(abandoned)
    }

    pub async fn get_account_info(&self) -> CommandResponse<AccountInfo> {
        let balances = match self.persistence.get_account_info().await {
            Ok(rows) => rows
                .into_iter()
                .map(|r| AccountBalance {
                    exchange_id: r.exchange_id,
                    asset: r.asset,
                    total: r.total,
                    available: r.available,
                    locked: r.locked,
                    observed_at: r.observed_at,
                })
                .collect(),
            Err(err) => return CommandResponse::error(err.to_string()),
        };

        let fund_classes = [OpportunityClass::CrossExchange, OpportunityClass::Triangular]
            .into_iter()
            .map(|class| FundClassBalance { class: class.as_str().to_string(), available: self.allocator.available(class) })
            .collect();

        CommandResponse::ok(AccountInfo { balances, fund_classes })
    }

    pub async fn get_signals(&self, limit: i64) -> CommandResponse<Vec<TradingSignalRecord>> {
        match self.persistence.get_signals(limit).await {
            Ok(rows) => CommandResponse::ok(rows),
            Err(err) => CommandResponse::error(err.to_string()),
        }
    }

    pub async fn get_logs(&self, category: Option<&str>, limit: i64) -> CommandResponse<Vec<OperationLogRecord>> {
        match self.persistence.get_logs(category, limit).await {
            Ok(rows) => CommandResponse::ok(rows),
            Err(err) => CommandResponse::error(err.to_string()),
        }
    }

    /// Count of enabled strategies per tier, used by the composition root to keep
    /// [`StatusUpdate::SetStrategyCounts`] current without CP polling on its own schedule.
    pub fn strategy_counts(&self) -> (u32, u32) {
        let all = self.pool.all();
        let total = all.len() as u32;
        let running = all.iter().filter(|h| h.read().enabled && h.read().tier == arbitros_strategy::Tier::Trading).count() as u32;
        (total, running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbitros_execution::{types::{Side, Ticker}, MockExchangeClient};
    use arbitros_instrument::{ExchangeId, Symbol};
    use arbitros_signal::{DispatcherConfig, SignalDispatcher, SignalIntent};
    use arbitros_strategy::types::{Lineage, RollingMetrics, Strategy, StrategyParameters, Tier};
    use rust_decimal_macros::dec;
    use tokio_util::sync::CancellationToken;

    fn trading_strategy(id: &str) -> Strategy {
        let mut s = Strategy::new(
            id.into(),
            id.into(),
            "momentum".into(),
            Symbol::new("BTC", "USDT"),
            StrategyParameters::new(),
            Lineage::seed(),
            now_ms(),
        );
        s.tier = Tier::Trading;
        s.metrics = RollingMetrics { score: dec!(90), win_rate: dec!(0.7), consecutive_improvements: 5, trade_count: 100 };
        s.last_param_change_at = now_ms() - chrono::Duration::hours(48);
        s.validation_trades_since_change = 50;
        s
    }

    /// §8: calling emergency_stop twice must leave the system in the same state as once. The
    /// dispatcher-level abandon is the part of emergency_stop's effect with real state to
    /// check; PL-backed reads aren't exercised here per this crate's convention of not
    /// standing up a database connection in unit tests (see `arbitros-persistence`'s `pg.rs`).
    #[tokio::test]
    async fn emergency_stop_abandon_is_idempotent() {
        let dispatcher = SignalDispatcher::new(DispatcherConfig::default(), WriteChannel::new(64));
        let mut s = trading_strategy("cp-1");
        let symbol = Symbol::new("BTC", "USDT");
        let client = MockExchangeClient::new(dec!(0.001));
        client.seed_ticker(Ticker {
            exchange: ExchangeId::Mock,
            symbol: symbol.clone(),
            bid: dec!(30000),
            ask: dec!(30010),
            last: dec!(30005),
            bid_depth_top_n: vec![],
            ask_depth_top_n: vec![],
            quote_volume_24h: dec!(0),
            observed_at: now_ms(),
        });
        let cancel = CancellationToken::new();
        let intent = SignalIntent { side: Side::Buy, price: dec!(30000), quantity: dec!(0.01), confidence: dec!(0.9) };
        dispatcher.dispatch(&mut s, intent, true, Some(&client), &symbol, &cancel).await.unwrap();

        let first = dispatcher.abandon_all_open("emergency_stop");
        assert_eq!(first.len(), 1);
        let second = dispatcher.abandon_all_open("emergency_stop");
        assert!(second.is_empty());
    }
}
