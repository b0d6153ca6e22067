use arbitros_arbitrage::{
    executor, ArbitrageOpportunity, ArbitrageTask, ExecutorConfig, FlatTransferCostModel,
    FundAllocator, FundAllocatorError, OpportunityDetector,
};
use arbitros_execution::ExchangeClient;
use arbitros_instrument::ExchangeId;
use arbitros_integration::time::now_ms;
use arbitros_persistence::WriteChannel;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Fraction of a class's available capital committed to a single task (§4.4's allocator
/// enforces the per-class ceiling; this is the per-opportunity slice within it).
const PER_TASK_CAPITAL_SHARE: Decimal = dec!(0.1);

/// Drives the scan → reserve → execute pipeline (§4.3 OD, §4.5 AX) on a fixed interval: not a
/// method on [`OpportunityDetector`] or [`arbitros_arbitrage::executor`] themselves, since
/// whether and how often to scan is a composition-root policy, not a property either
/// component owns on its own.
pub fn spawn(
    detector: Arc<OpportunityDetector>,
    allocator: Arc<FundAllocator>,
    mds: Arc<arbitros_data::MarketDataService>,
    clients: HashMap<ExchangeId, Arc<dyn ExchangeClient>>,
    persist: WriteChannel,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let cost_model = FlatTransferCostModel { fee_pct: dec!(0.001), minutes: dec!(15) };
        let executor_config = ExecutorConfig::default();
        let mut tick = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => {
                    let snapshot = mds.snapshot();
                    let opportunities = detector.scan(&snapshot, &cost_model);

                    for opportunity in opportunities {
                        let class = opportunity.class();
                        let available = allocator.available(class);
                        let amount = available * PER_TASK_CAPITAL_SHARE;
                        if amount <= Decimal::ZERO {
                            continue;
                        }

                        if !exchanges_configured(&opportunity, &clients) {
                            tracing::debug!(?class, "skipping opportunity, an exchange client is not configured");
                            continue;
                        }

                        let token = match allocator.reserve(class, amount) {
                            Ok(token) => token,
                            Err(FundAllocatorError { detail, .. }) => {
                                tracing::debug!(%detail, "skipping opportunity, capital unavailable");
                                continue;
                            }
                        };

                        let mut task = ArbitrageTask::new(Uuid::new_v4().to_string(), opportunity, amount, now_ms());
                        let allocator = Arc::clone(&allocator);
                        let clients = clients.clone();
                        let executor_config = executor_config;
                        let persist = persist.clone();
                        let cancel = cancel.child_token();

                        tokio::spawn(async move {
                            let resolve_client =
                                |exchange: ExchangeId| -> Arc<dyn ExchangeClient> { clients[&exchange].clone() };

                            executor::run_task(&mut task, token, &allocator, &resolve_client, &executor_config, &cancel, &persist).await;
                        });
                    }
                }
            }
        }
    })
}

fn exchanges_configured(opportunity: &ArbitrageOpportunity, clients: &HashMap<ExchangeId, Arc<dyn ExchangeClient>>) -> bool {
    match opportunity {
        ArbitrageOpportunity::CrossExchange(o) => clients.contains_key(&o.buy_exchange) && clients.contains_key(&o.sell_exchange),
        ArbitrageOpportunity::Triangular(o) => clients.contains_key(&o.exchange),
    }
}
