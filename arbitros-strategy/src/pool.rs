use crate::{
    scoring::GateConfig,
    types::{Strategy, Tier},
};
use arbitros_persistence::{records::StrategyRecord, OperationRecord, WriteChannel};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Strategy Pool (SP, §4.6): the persistent set of every strategy, each guarded by its own
/// read-write lock so a writer (evolution, scoring) never blocks readers (dispatch, control
/// plane) of a *different* strategy, and is itself never held across I/O.
#[derive(Clone)]
pub struct StrategyPool {
    strategies: Arc<RwLock<IndexMap<String, Arc<RwLock<Strategy>>>>>,
    gates: GateConfig,
}

impl StrategyPool {
    pub fn new(gates: GateConfig) -> Self {
        Self {
            strategies: Arc::new(RwLock::new(IndexMap::new())),
            gates,
        }
    }

    pub fn insert(&self, strategy: Strategy) {
        self.strategies
            .write()
            .insert(strategy.id.clone(), Arc::new(RwLock::new(strategy)));
    }

    pub fn get(&self, id: &str) -> Option<Arc<RwLock<Strategy>>> {
        self.strategies.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.strategies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<String> {
        self.strategies.read().keys().cloned().collect()
    }

    pub fn ids_in_tier(&self, tier: Tier) -> Vec<String> {
        self.strategies
            .read()
            .values()
            .filter_map(|s| {
                let guard = s.read();
                (guard.tier == tier && guard.enabled).then(|| guard.id.clone())
            })
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<RwLock<Strategy>>> {
        self.strategies.read().values().cloned().collect()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<RwLock<Strategy>>> {
        self.strategies.write().shift_remove(id)
    }

    /// Re-evaluates one strategy's tier against §4.6's transition rules given its current
    /// rolling metrics, persisting the new tier if it changed. Returns the tier after
    /// evaluation.
    pub fn evaluate_tier(&self, id: &str, now: DateTime<Utc>, persist: &WriteChannel) -> Option<Tier> {
        let handle = self.get(id)?;
        let mut strategy = handle.write();
        let gates = &self.gates;

        let stable = (now - strategy.last_param_change_at).num_hours() >= gates.param_stability_hours;

        let eligible_for_trading = strategy.metrics.score >= gates.trading_min_score
            && strategy.metrics.win_rate >= gates.min_win_rate
            && strategy.metrics.consecutive_improvements >= gates.consec_improvements
            && stable;

        let eligible_for_display =
            strategy.metrics.score >= gates.display_min_score && strategy.metrics.trade_count >= gates.min_trades;

        let new_tier = match strategy.tier {
            Tier::Pool if eligible_for_display => Tier::Display,
            Tier::Display if eligible_for_trading => Tier::Trading,
            Tier::Display if strategy.metrics.score < gates.display_min_score => Tier::Pool,
            Tier::Trading if strategy.metrics.score < gates.trading_min_score => Tier::Display,
            other => other,
        };

        if new_tier != strategy.tier {
            tracing::info!(strategy_id = %strategy.id, from = strategy.tier.as_str(), to = new_tier.as_str(), "tier transition");
            strategy.tier = new_tier;
        }

        persist_strategy(&strategy, persist);
        Some(strategy.tier)
    }

    /// Retires strategies whose score has sat below [`GateConfig::elimination_score`] for at
    /// least [`GateConfig::elimination_days`]; their records are retained (disabled, not
    /// removed) for lineage per §4.6.
    pub fn eliminate_stale(&self, now: DateTime<Utc>, persist: &WriteChannel) -> Vec<String> {
        let mut eliminated = Vec::new();
        for handle in self.all() {
            let mut strategy = handle.write();
            if strategy.metrics.score < self.gates.elimination_score {
                strategy.consecutive_low_score_windows += 1;
            } else {
                strategy.consecutive_low_score_windows = 0;
            }

            let days_low = strategy.consecutive_low_score_windows as i64;
            if strategy.enabled && days_low >= self.gates.elimination_days {
                strategy.enabled = false;
                strategy.tier = Tier::Pool;
                eliminated.push(strategy.id.clone());
                tracing::info!(strategy_id = %strategy.id, "eliminated: score below threshold too long");
            }
            persist_strategy(&strategy, persist);
        }
        eliminated
    }
}

fn persist_strategy(strategy: &Strategy, persist: &WriteChannel) {
    persist.send(OperationRecord::Strategy(StrategyRecord {
        id: strategy.id.clone(),
        name: strategy.name.clone(),
        strategy_type: strategy.strategy_type.clone(),
        symbol: strategy.symbol.to_string(),
        tier: strategy.tier.as_str().to_string(),
        enabled: strategy.enabled,
        parent_ids: strategy.lineage.parents.clone(),
        generation: strategy.lineage.generation as i32,
        cycle: strategy.lineage.cycle as i32,
        creation_method: strategy.lineage.creation_method.as_str().to_string(),
        last_param_change_at: strategy.last_param_change_at,
        validation_trades_since_change: strategy.validation_trades_since_change as i32,
        final_score: strategy.metrics.score,
        rolling_win_rate: strategy.metrics.win_rate,
        created_at: strategy.created_at,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Lineage, RollingMetrics, StrategyParameters};
    use arbitros_instrument::Symbol;
    use arbitros_integration::time::now_ms;
    use rust_decimal_macros::dec;

    fn pool() -> StrategyPool {
        StrategyPool::new(GateConfig::default())
    }

    fn seeded_strategy(id: &str) -> Strategy {
        Strategy::new(
            id.into(),
            id.into(),
            "momentum".into(),
            Symbol::new("BTC", "USDT"),
            StrategyParameters::new(),
            Lineage::seed(),
            now_ms(),
        )
    }

    #[test]
    fn promotes_pool_to_display_once_gates_met() {
        let pool_svc = pool();
        let mut strategy = seeded_strategy("s-1");
        strategy.metrics = RollingMetrics { score: dec!(12), trade_count: 31, ..RollingMetrics::default() };
        pool_svc.insert(strategy);

        let persist = WriteChannel::new(64);
        let tier = pool_svc.evaluate_tier("s-1", now_ms(), &persist);
        assert_eq!(tier, Some(Tier::Display));
    }

    #[test]
    fn display_does_not_promote_to_trading_without_stability_window() {
        let pool_svc = pool();
        let mut strategy = seeded_strategy("s-2");
        strategy.tier = Tier::Display;
        strategy.last_param_change_at = now_ms(); // just changed, not stable yet
        strategy.metrics = RollingMetrics {
            score: dec!(70),
            win_rate: dec!(0.7),
            consecutive_improvements: 5,
            trade_count: 100,
        };
        pool_svc.insert(strategy);

        let persist = WriteChannel::new(64);
        let tier = pool_svc.evaluate_tier("s-2", now_ms(), &persist);
        assert_eq!(tier, Some(Tier::Display));
    }

    #[test]
    fn display_promotes_to_trading_once_stable_and_all_gates_met() {
        let pool_svc = pool();
        let mut strategy = seeded_strategy("s-3");
        strategy.tier = Tier::Display;
        strategy.last_param_change_at = now_ms() - chrono::Duration::hours(48);
        strategy.metrics = RollingMetrics {
            score: dec!(70),
            win_rate: dec!(0.7),
            consecutive_improvements: 5,
            trade_count: 100,
        };
        pool_svc.insert(strategy);

        let persist = WriteChannel::new(64);
        let tier = pool_svc.evaluate_tier("s-3", now_ms(), &persist);
        assert_eq!(tier, Some(Tier::Trading));
    }

    #[test]
    fn eliminate_stale_disables_after_elimination_window() {
        let pool_svc = pool();
        let mut strategy = seeded_strategy("s-4");
        strategy.metrics = RollingMetrics { score: dec!(1), ..RollingMetrics::default() };
        strategy.consecutive_low_score_windows = 15;
        pool_svc.insert(strategy);

        let persist = WriteChannel::new(64);
        let eliminated = pool_svc.eliminate_stale(now_ms(), &persist);
        assert_eq!(eliminated, vec!["s-4".to_string()]);
        assert!(!pool_svc.get("s-4").unwrap().read().enabled);
    }
}
