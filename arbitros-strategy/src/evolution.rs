use crate::{
    genesis,
    mutation::{self, CrossoverRate, MutationStrength},
    pool::StrategyPool,
    scoring::{self, GateConfig, ScoreInputs, ScoreWeights},
    types::{CreationMethod, Lineage, Strategy, Tier},
};
use arbitros_integration::time::now_ms;
use arbitros_persistence::{records::EvolutionHistoryRecord, OperationRecord, WriteChannel};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_FAST_INTERVAL: Duration = Duration::from_secs(3 * 60);
pub const DEFAULT_SLOW_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Fraction of the pool, by score, carried unchanged into the next slow-loop generation
/// (§4.9 elite preservation).
const ELITE_FRACTION: Decimal = Decimal::from_parts(20, 0, 0, false, 2); // 0.20
/// A single strategy type occupying more than this share of the pool triggers diversity bias
/// (§4.9).
const DIVERSITY_COLLAPSE_THRESHOLD: Decimal = Decimal::from_parts(60, 0, 0, false, 2); // 0.60
/// "~N" random strategies injected per slow-loop cycle (§4.9).
const RANDOM_INJECTION_COUNT: usize = 1;

pub struct EvolutionScheduler {
    pool: StrategyPool,
    gates: GateConfig,
    persist: WriteChannel,
}

#[derive(Debug, Clone)]
pub struct EvolutionAction {
    pub strategy_id: String,
    pub action: &'static str,
    pub score_before: Option<Decimal>,
    pub score_after: Option<Decimal>,
    pub reason: String,
}

impl EvolutionScheduler {
    pub fn new(pool: StrategyPool, gates: GateConfig, persist: WriteChannel) -> Self {
        Self { pool, gates, persist }
    }

    /// Spawns the fast loop (default every 3 min, §4.9): for each display-tier strategy, the
    /// caller is expected to have already refreshed `metrics.score` via simulation + scoring
    /// before calling [`Self::fast_cycle`]; this method only applies the stagnation → mutation
    /// policy and persists the resulting [`EvolutionAction`]s.
    /// `enabled` is checked at the top of every tick (§4.9's "gated by enable_evolution");
    /// when clear the tick is skipped entirely rather than the loop being torn down, so
    /// toggling evolution back on resumes on the very next tick with no respawn needed.
    pub fn spawn_fast_loop(
        self: std::sync::Arc<Self>,
        interval: Duration,
        enabled: Arc<AtomicBool>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tick.tick() => {
                        if !enabled.load(Ordering::Acquire) {
                            continue;
                        }
                        let actions = self.fast_cycle(now_ms());
                        for action in actions {
                            tracing::info!(strategy_id = %action.strategy_id, action = action.action, "fast-loop evolution action");
                        }
                    }
                }
            }
        })
    }

    pub fn spawn_slow_loop(
        self: std::sync::Arc<Self>,
        interval: Duration,
        enabled: Arc<AtomicBool>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tick.tick() => {
                        if !enabled.load(Ordering::Acquire) {
                            continue;
                        }
                        let actions = self.slow_cycle(now_ms(), &mut rand::rng());
                        for action in actions {
                            tracing::info!(strategy_id = %action.strategy_id, action = action.action, "slow-loop evolution action");
                        }
                    }
                }
            }
        })
    }

    /// One iteration of the fast loop (§4.9): display-tier strategies whose score has
    /// stagnated (no improvement since the last cycle) get a gentle mutation proposal.
    pub fn fast_cycle(&self, at: DateTime<Utc>) -> Vec<EvolutionAction> {
        let mut actions = Vec::new();
        for id in self.pool.ids_in_tier(Tier::Display) {
            let Some(handle) = self.pool.get(&id) else { continue };
            let score_before = handle.read().metrics.score;
            self.pool.evaluate_tier(&id, at, &self.persist);

            let stagnant = {
                let strategy = handle.read();
                strategy.metrics.consecutive_improvements == 0
            };

            if stagnant {
                let mut rng = rand::rng();
                let mut strategy = handle.write();
                let changed = mutation::mutate(&mut rng, &mut strategy, MutationStrength(dec!(0.5)), None);
                if changed {
                    strategy.mark_parameters_changed(at);
                    strategy.lineage.cycle += 1;
                    let action = record_action(
                        &self.persist,
                        &strategy,
                        "mutate",
                        Some(score_before),
                        Some(strategy.metrics.score),
                        "fast-loop stagnation mutation",
                        at,
                    );
                    actions.push(action);
                }
            }
        }
        actions
    }

    /// One iteration of the slow loop (§4.9): elite preservation, mutation of underperformers,
    /// crossover between random parent pairs, injection of new random strategies, and
    /// elimination of persistently poor performers, with a diversity bias when one strategy
    /// type has collapsed the pool's type distribution.
    pub fn slow_cycle(&self, at: DateTime<Utc>, rng: &mut impl Rng) -> Vec<EvolutionAction> {
        let mut actions = Vec::new();
        let mut scored: Vec<(String, Decimal)> = self
            .pool
            .all()
            .iter()
            .map(|h| {
                let s = h.read();
                (s.id.clone(), s.metrics.score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        let pool_size = scored.len();
        if pool_size == 0 {
            return actions;
        }
        let elite_count = (Decimal::from(pool_size) * ELITE_FRACTION)
            .ceil()
            .to_usize()
            .unwrap_or(0)
            .max(1);
        let elites: Vec<&str> = scored.iter().take(elite_count).map(|(id, _)| id.as_str()).collect();
        for id in &elites {
            if let Some(handle) = self.pool.get(id) {
                let strategy = handle.read();
                actions.push(EvolutionAction {
                    strategy_id: strategy.id.clone(),
                    action: "elite_select",
                    score_before: Some(strategy.metrics.score),
                    score_after: Some(strategy.metrics.score),
                    reason: "preserved as elite, unchanged".to_string(),
                });
            }
        }

        let underperformer_cutoff = (Decimal::from(pool_size) * ELITE_FRACTION)
            .ceil()
            .to_usize()
            .unwrap_or(0)
            .max(1);
        let underperformers: Vec<String> = scored
            .iter()
            .rev()
            .take(underperformer_cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &underperformers {
            if elites.contains(&id.as_str()) {
                continue; // a tiny pool can overlap; never mutate an elite
            }
            let Some(handle) = self.pool.get(id) else { continue };
            let score_before = handle.read().metrics.score;
            let mut strategy = handle.write();
            let changed = mutation::mutate(rng, &mut strategy, MutationStrength::default(), None);
            if changed {
                strategy.mark_parameters_changed(at);
                strategy.lineage.cycle += 1;
                let action = record_action(
                    &self.persist,
                    &strategy,
                    "mutate",
                    Some(score_before),
                    Some(strategy.metrics.score),
                    "slow-loop underperformer mutation",
                    at,
                );
                actions.push(action);
            }
        }

        if pool_size >= 2 {
            let i = rng.random_range(0..pool_size);
            let mut j = rng.random_range(0..pool_size);
            if j == i {
                j = (j + 1) % pool_size;
            }
            if let (Some(a), Some(b)) = (self.pool.get(&scored[i].0), self.pool.get(&scored[j].0)) {
                let (a, b) = (a.read(), b.read());
                let child_params = mutation::crossover(rng, &a.parameters, &b.parameters, CrossoverRate::default());
                let child_id = format!("{}-x-{}-{}", a.id, b.id, at.timestamp_millis());
                let generation = a.lineage.generation.max(b.lineage.generation) + 1;
                let mut child = Strategy::new(
                    child_id.clone(),
                    format!("{}x{}", a.name, b.name),
                    a.strategy_type.clone(),
                    a.symbol.clone(),
                    child_params,
                    Lineage {
                        parents: vec![a.id.clone(), b.id.clone()],
                        generation,
                        cycle: 0,
                        creation_method: CreationMethod::Crossover,
                    },
                    at,
                );
                child.tier = Tier::Pool;
                drop(a);
                drop(b);
                actions.push(record_action(&self.persist, &child, "crossover", None, None, "slow-loop crossover", at));
                self.pool.insert(child);
            }
        }

        let counts = type_counts(&self.pool);
        let collapsed = diversity_collapsed(&counts, pool_size);
        if collapsed {
            tracing::info!("strategy-type distribution collapsed, biasing next creation toward under-represented types");
        }

        for n in 0..RANDOM_INJECTION_COUNT {
            let sample_idx = rng.random_range(0..pool_size);
            let Some(sample) = self.pool.get(&scored[sample_idx].0) else { continue };
            let symbol = sample.read().symbol.clone();
            let strategy_type = genesis::pick_type_for_injection(rng, &counts, collapsed);
            let id = format!("random-{strategy_type}-{}-{}-{n}", symbol, at.timestamp_millis());
            let child = genesis::random_strategy(rng, id, strategy_type, symbol, at);
            actions.push(record_action(&self.persist, &child, "create", None, Some(child.metrics.score), "slow-loop random injection", at));
            self.pool.insert(child);
        }

        let eliminated = self.pool.eliminate_stale(at, &self.persist);
        for id in eliminated {
            actions.push(EvolutionAction {
                strategy_id: id,
                action: "eliminate",
                score_before: None,
                score_after: None,
                reason: "score below elimination threshold for the full elimination window".to_string(),
            });
        }

        actions
    }
}

/// Counts strategies per `strategy_type`, feeding both the diversity check and the random
/// injection's under-represented-type bias (§4.9).
fn type_counts(pool: &StrategyPool) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for handle in pool.all() {
        *counts.entry(handle.read().strategy_type.clone()).or_insert(0) += 1;
    }
    counts
}

/// Whether any single strategy type occupies more than [`DIVERSITY_COLLAPSE_THRESHOLD`] of the
/// pool (§4.9's diversity check).
fn diversity_collapsed(counts: &HashMap<String, usize>, pool_size: usize) -> bool {
    if pool_size == 0 {
        return false;
    }
    let total = Decimal::from(pool_size);
    counts.values().any(|count| Decimal::from(*count) / total > DIVERSITY_COLLAPSE_THRESHOLD)
}

fn record_action(
    persist: &WriteChannel,
    strategy: &Strategy,
    action: &'static str,
    score_before: Option<Decimal>,
    score_after: Option<Decimal>,
    reason: &str,
    at: DateTime<Utc>,
) -> EvolutionAction {
    persist.send(OperationRecord::EvolutionHistory(EvolutionHistoryRecord {
        strategy_id: strategy.id.clone(),
        generation: strategy.lineage.generation as i32,
        cycle: strategy.lineage.cycle as i32,
        action: action.to_string(),
        score_before,
        score_after,
        old_params: None,
        new_params: serde_json::to_value(&strategy.parameters).ok(),
        parameter_diff: None,
        reason: reason.to_string(),
        at,
    }));

    EvolutionAction {
        strategy_id: strategy.id.clone(),
        action,
        score_before,
        score_after,
        reason: reason.to_string(),
    }
}

/// Recomputes a score from fresh inputs and applies the §4.8 rolling update in place,
/// tracking consecutive-improvement bookkeeping that both gating and the fast loop read.
pub fn apply_scoring_update(strategy: &mut Strategy, inputs: ScoreInputs, weights: ScoreWeights, alpha: Decimal) {
    let component_score = scoring::composite_score(inputs, weights, None);
    let previous = strategy.metrics.score;
    strategy.metrics.score = scoring::rolling_update(previous, component_score, alpha);
    strategy.metrics.win_rate = inputs.win_rate;
    strategy.metrics.trade_count += inputs.trade_count;

    if strategy.metrics.score > previous {
        strategy.metrics.consecutive_improvements += 1;
    } else {
        strategy.metrics.consecutive_improvements = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StrategyParameters;
    use arbitros_instrument::Symbol;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn make_pool(n: usize) -> StrategyPool {
        let pool = StrategyPool::new(GateConfig::default());
        for i in 0..n {
            let mut s = Strategy::new(
                format!("s-{i}"),
                format!("s-{i}"),
                "momentum".into(),
                Symbol::new("BTC", "USDT"),
                StrategyParameters::new(),
                Lineage::seed(),
                now_ms(),
            );
            s.metrics.score = Decimal::from(i * 3);
            pool.insert(s);
        }
        pool
    }

    #[test]
    fn slow_cycle_preserves_elite_parameters_unchanged() {
        let pool = make_pool(30);
        let persist = WriteChannel::new(1024);
        let scheduler = EvolutionScheduler::new(pool.clone(), GateConfig::default(), persist);
        let mut rng = StdRng::seed_from_u64(3);

        let before: HashMap<String, Decimal> = pool
            .all()
            .iter()
            .map(|h| (h.read().id.clone(), h.read().metrics.score))
            .collect();

        let actions = scheduler.slow_cycle(now_ms(), &mut rng);
        let elite_actions: Vec<_> = actions.iter().filter(|a| a.action == "elite_select").collect();
        assert!(!elite_actions.is_empty());
        for action in elite_actions {
            let handle = pool.get(&action.strategy_id).unwrap();
            assert_eq!(handle.read().metrics.score, before[&action.strategy_id]);
        }
    }

    #[test]
    fn slow_cycle_keeps_pool_size_within_tolerance() {
        let pool = make_pool(30);
        let persist = WriteChannel::new(1024);
        let scheduler = EvolutionScheduler::new(pool.clone(), GateConfig::default(), persist);
        let mut rng = StdRng::seed_from_u64(11);

        scheduler.slow_cycle(now_ms(), &mut rng);
        let enabled_count = pool.all().iter().filter(|h| h.read().enabled).count();
        assert!((27..=34).contains(&enabled_count), "pool drifted too far: {enabled_count}");
    }

    #[test]
    fn slow_cycle_injects_at_least_one_random_strategy() {
        let pool = make_pool(30);
        let persist = WriteChannel::new(1024);
        let scheduler = EvolutionScheduler::new(pool.clone(), GateConfig::default(), persist);
        let mut rng = StdRng::seed_from_u64(5);

        let actions = scheduler.slow_cycle(now_ms(), &mut rng);
        let injected: Vec<_> = actions.iter().filter(|a| a.reason.contains("random injection")).collect();
        assert_eq!(injected.len(), RANDOM_INJECTION_COUNT);
        for action in &injected {
            let handle = pool.get(&action.strategy_id).expect("injected strategy present in pool");
            assert!(matches!(handle.read().lineage.creation_method, CreationMethod::Random));
        }
    }

    #[test]
    fn diversity_bias_prefers_the_least_represented_type() {
        let mut counts = HashMap::new();
        for strategy_type in genesis::STRATEGY_TYPES {
            counts.insert(strategy_type.to_string(), 5usize);
        }
        counts.insert("momentum".to_string(), 25usize);
        counts.insert("grid".to_string(), 0usize);
        let mut rng = StdRng::seed_from_u64(1);
        let picked = genesis::pick_type_for_injection(&mut rng, &counts, true);
        assert_eq!(picked, "grid");
    }
}
