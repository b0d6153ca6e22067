//! Process entrypoint: load configuration, wire every component, run until a shutdown signal
//! or an unrecoverable startup failure. Kept thin — wiring logic that can be unit-tested lives
//! in `lib.rs` and its submodules; this file only sequences construction and owns the root
//! [`CancellationToken`].

use arbitros_arbitrage::{FundAllocator, OpportunityDetector, OpportunityDetectorConfig};
use arbitros_control::{ControlPlane, SystemStatusOwner};
use arbitros_data::{poll::PollTarget, MarketDataService};
use arbitros_engine::{arbitrage_loop, strategy_loop, Config};
use arbitros_execution::{
    live::binance::{BinanceClient, BinanceConfig},
    pool::ExchangePool,
    mock::MockExchangeClient,
    ExchangeClient,
};
use arbitros_instrument::{AssetId, Exchange, ExchangeCapabilities, ExchangeId, Symbol};
use arbitros_persistence::PersistenceLayer;
use arbitros_signal::{dispatcher::DispatcherConfig, SignalDispatcher};
use arbitros_strategy::{EvolutionScheduler, GateConfig, StrategyPool};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::{collections::HashMap, str::FromStr, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "arbitros.toml".to_string());
    let raw = std::fs::read_to_string(&config_path)
        .map_err(|err| format!("reading config `{config_path}`: {err}"))?;
    let config = Config::from_toml_str(&raw)?;
    config.validate()?;

    let symbols: Vec<Symbol> = config
        .symbols
        .iter()
        .map(|s| Symbol::from_str(s))
        .collect::<Result<_, _>>()
        .map_err(|err| format!("invalid symbol in config: {err}"))?;

    tracing::info!(symbols = ?config.symbols, exchanges = config.exchanges.len(), "starting arbitros");

    let persistence = Arc::new(
        PersistenceLayer::connect(&config.persistence.dsn, config.persistence.max_connections).await?,
    );

    let root_cancel = CancellationToken::new();
    let mut background_tasks = Vec::new();

    let (status_handle, status_task) = SystemStatusOwner::spawn(root_cancel.child_token());
    background_tasks.push(status_task);

    let (clients, exchanges, rate_limits) = build_exchanges(&config, &symbols);
    let exchange_pool = Arc::new(ExchangePool::new(rate_limits));
    background_tasks.push(exchange_pool.spawn_idle_reaper());

    let poll_targets: Vec<(Arc<dyn ExchangeClient>, PollTarget)> = clients
        .iter()
        .map(|(id, client)| (client.clone(), PollTarget { exchange: *id, symbols: symbols.clone() }))
        .collect();
    let mds = Arc::new(MarketDataService::spawn(
        poll_targets,
        root_cancel.child_token(),
        Some(Duration::from_secs(config.intervals.market_poll_sec)),
    ));

    let mut fund_allocation = HashMap::new();
    fund_allocation.insert(arbitros_arbitrage::OpportunityClass::CrossExchange, config.fund_allocation.cross_exchange);
    fund_allocation.insert(arbitros_arbitrage::OpportunityClass::Triangular, config.fund_allocation.triangular);
    let allocator = Arc::new(FundAllocator::new(config.fund_total, fund_allocation, dec!(0.01), dec!(0.5)));

    let detector_config = OpportunityDetectorConfig {
        min_cross_pct: config.min_cross_pct,
        min_tri_pct: config.min_triangular_pct,
        base_asset: AssetId::new_str("USDT"),
        ring_capacity: 256,
    };
    let detector = Arc::new(OpportunityDetector::new(detector_config, exchanges));

    let persist_queue = persistence.queue();
    background_tasks.push(persistence.spawn_writer(root_cancel.child_token()));

    background_tasks.push(arbitrage_loop::spawn(
        Arc::clone(&detector),
        Arc::clone(&allocator),
        Arc::clone(&mds),
        clients.clone(),
        persist_queue.clone(),
        Duration::from_secs(config.intervals.market_poll_sec),
        root_cancel.child_token(),
    ));

    let gates = GateConfig {
        display_min_score: config.gates.display_min_score,
        trading_min_score: config.gates.trading_min_score,
        min_trades: config.gates.min_trades,
        min_win_rate: config.gates.min_win_rate,
        consec_improvements: config.gates.consec_improvements,
        param_stability_hours: config.gates.param_reval_hours,
        ..GateConfig::default()
    };

    let pool = StrategyPool::new(gates.clone());
    arbitros_strategy::seed_pool(&pool, &symbols, arbitros_strategy::genesis::DEFAULT_SEED_PER_TYPE, arbitros_integration::time::now_ms());
    tracing::info!(strategies = pool.len(), "seeded strategy pool");
    let evolution = Arc::new(EvolutionScheduler::new(pool.clone(), gates, persist_queue.clone()));

    let dispatcher_config = DispatcherConfig {
        param_reval_hours: config.gates.param_reval_hours,
        param_reval_trades: config.gates.param_reval_trades,
        trading_min_score: config.gates.trading_min_score,
        ..DispatcherConfig::default()
    };
    let dispatcher = Arc::new(SignalDispatcher::new(dispatcher_config, persist_queue.clone()));

    let control = ControlPlane::new(
        pool.clone(),
        Arc::clone(&evolution),
        Arc::clone(&dispatcher),
        Arc::clone(&allocator),
        Arc::clone(&persistence),
        status_handle.clone(),
    );
    let evolution_gate = control.evolution_gate();

    background_tasks.push(Arc::clone(&evolution).spawn_fast_loop(
        Duration::from_secs(config.intervals.fast_evolution_min * 60),
        Arc::clone(&evolution_gate),
        root_cancel.child_token(),
    ));
    background_tasks.push(Arc::clone(&evolution).spawn_slow_loop(
        Duration::from_secs(config.intervals.slow_evolution_hr * 3600),
        evolution_gate,
        root_cancel.child_token(),
    ));

    let history = Arc::new(strategy_loop::PriceHistory::new());
    let history_keys: Vec<(ExchangeId, Symbol)> =
        clients.keys().flat_map(|id| symbols.iter().map(move |s| (*id, s.clone()))).collect();
    background_tasks.push(strategy_loop::spawn_history_sampler(
        Arc::clone(&mds),
        Arc::clone(&history),
        history_keys,
        Duration::from_secs(config.intervals.market_poll_sec),
        root_cancel.child_token(),
    ));

    let primary_exchange = clients.keys().next().copied().unwrap_or(ExchangeId::Mock);
    background_tasks.push(strategy_loop::spawn_dispatch_loop(
        pool.clone(),
        Arc::clone(&history),
        Arc::clone(&dispatcher),
        status_handle.clone(),
        clients.clone(),
        primary_exchange,
        Duration::from_secs(config.intervals.market_poll_sec),
        root_cancel.child_token(),
    ));
    background_tasks.push(strategy_loop::spawn_simulation_refresh_loop(
        pool,
        history,
        persist_queue,
        arbitros_strategy::SimulationConfig {
            days_per_run: Decimal::from(config.simulation.days_per_run),
            min_trades_required: config.simulation.min_trades_required,
            wall_clock_cap: Duration::from_secs(5),
        },
        arbitros_strategy::ScoreWeights::default(),
        dec!(0.3),
        primary_exchange,
        Duration::from_secs(config.intervals.fast_evolution_min * 60),
        root_cancel.child_token(),
    ));

    // No transport wraps the control plane in this process (§1 Non-goals); kept alive here so
    // an embedding binary or test harness can reach it without re-threading every constructor.
    let _control = control;

    shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping");
    root_cancel.cancel();

    for task in background_tasks {
        let _ = task.await;
    }
    match Arc::try_unwrap(mds) {
        Ok(mds) => mds.shutdown().await,
        Err(_) => tracing::warn!("market data service still shared at shutdown, skipping its own join"),
    }

    Ok(())
}

/// Builds one [`ExchangeClient`] per enabled, configured exchange plus its [`Exchange`]
/// capability record and rate-limit entry. `binance`/`okx`/`bitget` map to their live clients
/// (§9: okx/bitget wire formats are out of scope and their clients fault on first real call);
/// any other key, or no exchanges enabled, falls back to [`MockExchangeClient`] so the engine
/// still has something to poll in a paper/demo deployment.
fn build_exchanges(
    config: &Config,
    symbols: &[Symbol],
) -> (
    HashMap<ExchangeId, Arc<dyn ExchangeClient>>,
    Vec<Exchange>,
    Vec<(ExchangeId, usize)>,
) {
    let mut clients: HashMap<ExchangeId, Arc<dyn ExchangeClient>> = HashMap::new();
    let mut exchanges = Vec::new();
    let mut rate_limits = Vec::new();

    for (name, exchange_config) in &config.exchanges {
        if !exchange_config.enabled {
            continue;
        }

        let (id, client): (ExchangeId, Arc<dyn ExchangeClient>) = match name.to_lowercase().as_str() {
            "binance" => (
                ExchangeId::Binance,
                Arc::new(BinanceClient::new(BinanceConfig {
                    base_url: "https://api.binance.com".to_string(),
                    api_key: exchange_config.api_key.clone(),
                    api_secret: exchange_config.api_secret.clone(),
                })),
            ),
            "mock" => (ExchangeId::Mock, Arc::new(MockExchangeClient::new(dec!(0.001)))),
            other => {
                tracing::warn!(exchange = other, "unrecognized or unimplemented exchange in config, skipping");
                continue;
            }
        };

        let capabilities = ExchangeCapabilities {
            can_withdraw: true,
            can_deposit: true,
            maker_fee: dec!(0.001),
            taker_fee: dec!(0.001),
            symbols: symbols.to_vec(),
        };
        exchanges.push(Exchange::new(id, capabilities));
        rate_limits.push((id, exchange_config.rate_limit_per_sec));
        clients.insert(id, client);
    }

    if clients.is_empty() {
        tracing::warn!("no usable exchange configured, falling back to a mock exchange");
        let id = ExchangeId::Mock;
        clients.insert(id, Arc::new(MockExchangeClient::new(dec!(0.001))));
        exchanges.push(Exchange::new(
            id,
            ExchangeCapabilities { can_withdraw: false, can_deposit: false, maker_fee: dec!(0), taker_fee: dec!(0), symbols: symbols.to_vec() },
        ));
        rate_limits.push((id, 10));
    }

    (clients, exchanges, rate_limits)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(cfg!(debug_assertions))
        .json()
        .init()
}
