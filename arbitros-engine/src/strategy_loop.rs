//! Drives the two per-strategy cadences SETE needs beyond what `arbitros-strategy` and
//! `arbitros-signal` already implement on their own: sourcing a live price window for the
//! pure [`arbitros_strategy::simulation`] replay machinery, and turning a strategy's signal
//! rule into [`arbitros_signal::SignalIntent`]s dispatched through the [`SignalDispatcher`].
//! Neither concern belongs inside `arbitros-strategy` or `arbitros-signal` themselves: what to
//! poll, how often, and which concrete exchange client to call are composition-root policy,
//! mirroring `arbitros_engine::arbitrage_loop`'s own split.

use arbitros_control::SystemStatusHandle;
use arbitros_data::MarketDataService;
use arbitros_execution::{types::Side, ExchangeClient};
use arbitros_instrument::{ExchangeId, Symbol};
use arbitros_integration::time::now_ms;
use arbitros_persistence::WriteChannel;
use arbitros_signal::{SignalDispatcher, SignalIntent};
use arbitros_strategy::{
    evolution::apply_scoring_update,
    pool::StrategyPool,
    scoring::{ScoreInputs, ScoreWeights},
    simulation::{self, ReplayBar, SignalRule, SimulationConfig},
    types::Tier,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio_util::sync::CancellationToken;

/// How many recent closes each strategy's replay window retains. At the default 5s market
/// poll interval this covers a little over an hour, comfortably inside SE's 3-day default
/// `days_per_run` window for a strategy dispatched at native cadence.
const HISTORY_CAPACITY: usize = 1024;

/// A simple dual-moving-average crossover, the same family of rule the momentum/trend
/// strategy types in the pool are seeded with. Strategies carry their own `fast_period` /
/// `slow_period` parameters; this struct reads them rather than hard-coding a period, so a
/// mutated strategy's evolved parameters actually change its live behavior.
pub struct MovingAverageCrossoverRule;

impl SignalRule for MovingAverageCrossoverRule {
    fn decide(&self, strategy: &arbitros_strategy::Strategy, window: &[ReplayBar]) -> Option<bool> {
        let fast_n = strategy.parameter_value("fast_period")?.to_string().parse::<usize>().ok()?.max(1);
        let slow_n = strategy.parameter_value("slow_period")?.to_string().parse::<usize>().ok()?.max(fast_n + 1);
        if window.len() < slow_n {
            return None;
        }

        let fast_avg = average(&window[window.len() - fast_n..]);
        let slow_avg = average(&window[window.len() - slow_n..]);
        let prev_fast_avg = average(&window[window.len() - fast_n - 1..window.len() - 1]);
        let prev_slow_avg = average(&window[window.len() - slow_n - 1..window.len() - 1]);

        if prev_fast_avg <= prev_slow_avg && fast_avg > slow_avg {
            Some(true)
        } else if prev_fast_avg >= prev_slow_avg && fast_avg < slow_avg {
            Some(false)
        } else {
            None
        }
    }
}

fn average(bars: &[ReplayBar]) -> Decimal {
    let sum: Decimal = bars.iter().map(|b| b.close).sum();
    sum / Decimal::from(bars.len())
}

/// Per-(exchange, symbol) bounded replay history, sampled from MDS on every dispatch tick.
/// Shared by the dispatch loop (signal generation) and the simulation-refresh loop (SE input).
#[derive(Default)]
pub struct PriceHistory {
    by_key: parking_lot::Mutex<HashMap<(ExchangeId, Symbol), VecDeque<ReplayBar>>>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, key: (ExchangeId, Symbol), bar: ReplayBar) {
        let mut map = self.by_key.lock();
        let deque = map.entry(key).or_insert_with(|| VecDeque::with_capacity(HISTORY_CAPACITY));
        if deque.len() >= HISTORY_CAPACITY {
            deque.pop_front();
        }
        deque.push_back(bar);
    }

    fn window(&self, key: &(ExchangeId, Symbol)) -> Vec<ReplayBar> {
        self.by_key.lock().get(key).map(|d| d.iter().copied().collect()).unwrap_or_default()
    }
}

/// Spawns the loop that samples every configured (exchange, symbol) on each market poll epoch
/// and appends a [`ReplayBar`] to its [`PriceHistory`] entry, independent of which strategies
/// currently trade that symbol.
pub fn spawn_history_sampler(
    mds: Arc<MarketDataService>,
    history: Arc<PriceHistory>,
    keys: Vec<(ExchangeId, Symbol)>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => {
                    for key in &keys {
                        if let Some(ticker) = mds.latest(key.0, &key.1) {
                            history.record(key.clone(), ReplayBar { close: ticker.last, at: ticker.observed_at });
                        }
                    }
                }
            }
        }
    })
}

/// Dispatches a signal for one strategy if its rule fires against the current replay window,
/// using `clients` to resolve the exchange to execute `real` trade_type signals against.
pub async fn dispatch_one(
    strategy_handle: &parking_lot::RwLock<arbitros_strategy::Strategy>,
    history: &PriceHistory,
    dispatcher: &SignalDispatcher,
    auto_trading_enabled: bool,
    clients: &HashMap<ExchangeId, Arc<dyn ExchangeClient>>,
    exchange: ExchangeId,
    cancel: &CancellationToken,
) {
    let (symbol, decision, last_price, confidence) = {
        let strategy = strategy_handle.read();
        let window = history.window(&(exchange, strategy.symbol.clone()));
        let decision = MovingAverageCrossoverRule.decide(&strategy, &window);
        let last_price = window.last().map(|b| b.close);
        (strategy.symbol.clone(), decision, last_price, dec!(0.6))
    };

    let Some(side_is_buy) = decision else { return };
    let Some(price) = last_price else { return };

    let intent = SignalIntent {
        side: if side_is_buy { Side::Buy } else { Side::Sell },
        price,
        quantity: dec!(0.01),
        confidence,
    };

    let client = clients.get(&exchange).map(|c| c.as_ref());
    let mut strategy = strategy_handle.write();
    dispatcher.dispatch(&mut strategy, intent, auto_trading_enabled, client, &symbol, cancel).await;
}

/// Spawns the per-strategy dispatch loop (§4.11): on each tick, every enabled `display` or
/// `trading` tier strategy gets offered one chance to emit a signal. `display`-tier
/// strategies still run through [`SignalDispatcher::dispatch`] so their validation trades
/// accumulate toward the §4.6 promotion gate, exactly as `trading`-tier strategies do toward
/// the §4.11 re-validation gate.
pub fn spawn_dispatch_loop(
    pool: StrategyPool,
    history: Arc<PriceHistory>,
    dispatcher: Arc<SignalDispatcher>,
    status: SystemStatusHandle,
    clients: HashMap<ExchangeId, Arc<dyn ExchangeClient>>,
    exchange: ExchangeId,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => {
                    let auto_trading = status.current().auto_trading_enabled;
                    let mut ids = pool.ids_in_tier(Tier::Trading);
                    ids.extend(pool.ids_in_tier(Tier::Display));
                    for id in ids {
                        let Some(handle) = pool.get(&id) else { continue };
                        dispatch_one(&handle, &history, &dispatcher, auto_trading, &clients, exchange, &cancel).await;
                    }
                }
            }
        }
    })
}

/// Spawns the periodic SE→SG refresh (§4.7, §4.8, §4.9: "for each, run SE; update score via
/// SG") that the evolution scheduler's fast loop depends on having already happened. Runs
/// against every strategy in the pool, not only `display` tier, so a `pool`-tier strategy can
/// actually accumulate the score and trade count its promotion gate reads.
pub fn spawn_simulation_refresh_loop(
    pool: StrategyPool,
    history: Arc<PriceHistory>,
    persist: WriteChannel,
    simulation_config: SimulationConfig,
    weights: ScoreWeights,
    alpha: Decimal,
    exchange: ExchangeId,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => {
                    for id in pool.ids() {
                        let Some(handle) = pool.get(&id) else { continue };
                        let window = {
                            let strategy = handle.read();
                            history.window(&(exchange, strategy.symbol.clone()))
                        };
                        if window.len() < simulation_config.min_trades_required as usize {
                            continue;
                        }

                        let result = {
                            let strategy = handle.read();
                            simulation::simulate(&strategy, &window, &MovingAverageCrossoverRule, simulation_config, dec!(0.0005), dec!(0.001))
                        };

                        persist.send(arbitros_persistence::OperationRecord::Simulation(arbitros_persistence::records::SimulationRecord {
                            strategy_id: id.clone(),
                            run_at: result.run_at,
                            days_simulated: result.days_simulated,
                            trade_count: result.trade_count as i32,
                            win_rate: result.win_rate,
                            total_return: result.total_return,
                            sharpe: result.sharpe,
                            max_drawdown: result.max_drawdown,
                            score: result.score,
                            parameters_snapshot: result.parameters_snapshot.clone(),
                        }));

                        let mut strategy = handle.write();
                        apply_scoring_update(
                            &mut strategy,
                            ScoreInputs {
                                total_return: result.total_return,
                                win_rate: result.win_rate,
                                sharpe: result.sharpe,
                                max_drawdown: result.max_drawdown,
                                profit_factor: Decimal::ONE,
                                trade_count: result.trade_count,
                            },
                            weights,
                            alpha,
                        );
                        drop(strategy);
                        pool.evaluate_tier(&id, now_ms(), &persist);
                    }
                }
            }
        }
    })
}
