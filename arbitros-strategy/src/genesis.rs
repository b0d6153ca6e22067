//! Parametric strategy-type definitions and default parameter specs (§1, §4.6), ported from
//! the original's `strategy_parameters_config.py` parameter rule table. The composition root
//! uses [`seed_pool`] to give the pool something to simulate, score, and dispatch from its
//! first tick; the evolution scheduler uses [`random_strategy`] for the slow loop's "injection
//! of ~N random new strategies" (§4.9).

use crate::pool::StrategyPool;
use crate::regime::MarketRegime;
use crate::types::{CreationMethod, Lineage, MarketAdaptation, ParameterSpec, ParameterType, Strategy, StrategyParameters, Tier};
use arbitros_instrument::Symbol;
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// Parametric strategy types SETE's pool is seeded with (§1: "momentum, mean-reversion,
/// breakout, grid, trend-following, high-frequency, …"). `test_double` strategy types may
/// still be constructed directly via [`Strategy::new`]; this list only drives seeding/injection.
pub const STRATEGY_TYPES: &[&str] =
    &["momentum", "mean_reversion", "breakout", "grid", "trend_following", "high_frequency"];

/// Default number of seed strategies per (type, symbol) pair the composition root creates at
/// startup.
pub const DEFAULT_SEED_PER_TYPE: usize = 2;

fn adapt(regime: MarketRegime, range_scale: Decimal) -> MarketAdaptation {
    MarketAdaptation { regime, range_scale }
}

fn int_param(value: i64, min: i64, max: i64, step: i64, mutation_rate: Decimal, adaptation: Vec<MarketAdaptation>) -> ParameterSpec {
    let mut p = ParameterSpec::new(Decimal::from(value), Decimal::from(min), Decimal::from(max), Decimal::from(step), ParameterType::Int);
    p.mutation_rate = mutation_rate;
    p.market_adaptation = adaptation;
    p
}

fn decimal_param(value: Decimal, min: Decimal, max: Decimal, step: Decimal, mutation_rate: Decimal, adaptation: Vec<MarketAdaptation>) -> ParameterSpec {
    let mut p = ParameterSpec::new(value, min, max, step, ParameterType::Decimal);
    p.mutation_rate = mutation_rate;
    p.market_adaptation = adaptation;
    p
}

/// Universal risk parameters every strategy type carries, ported from the original's "风控参数"
/// (risk-control parameters) block, which applied regardless of strategy type.
fn risk_parameters(params: &mut StrategyParameters) {
    params.insert(
        "max_position_size".into(),
        decimal_param(
            dec!(0.1),
            dec!(0.01),
            dec!(0.5),
            dec!(0.01),
            dec!(0.1),
            vec![adapt(MarketRegime::Trending, dec!(0.5)), adapt(MarketRegime::Ranging, dec!(0.3)), adapt(MarketRegime::Volatile, dec!(0.2))],
        ),
    );
    params.insert(
        "stop_loss".into(),
        decimal_param(
            dec!(0.03),
            dec!(0.01),
            dec!(0.1),
            dec!(0.005),
            dec!(0.15),
            vec![adapt(MarketRegime::Trending, dec!(0.35)), adapt(MarketRegime::Ranging, dec!(0.25)), adapt(MarketRegime::Volatile, dec!(0.8))],
        ),
    );
    params.insert(
        "take_profit".into(),
        decimal_param(
            dec!(0.05),
            dec!(0.01),
            dec!(0.2),
            dec!(0.01),
            dec!(0.2),
            vec![adapt(MarketRegime::Trending, dec!(0.4)), adapt(MarketRegime::Ranging, dec!(0.25)), adapt(MarketRegime::Volatile, dec!(0.8))],
        ),
    );
}

/// The dual moving-average crossover periods `arbitros_engine::strategy_loop`'s
/// `MovingAverageCrossoverRule` reads (`fast_period`/`slow_period`), scaled per type to a
/// native holding period — e.g. high-frequency trades on a much shorter window than
/// trend-following. Not present in the original's parameter table (it had no single crossover
/// rule driving every type); added here so every seeded strategy's signal rule actually fires.
fn crossover_periods(params: &mut StrategyParameters, fast_default: i64, fast_max: i64, slow_default: i64, slow_max: i64) {
    params.insert("fast_period".into(), int_param(fast_default, 2, fast_max, 1, dec!(0.2), vec![]));
    params.insert("slow_period".into(), int_param(slow_default, fast_default + 1, slow_max, 1, dec!(0.2), vec![]));
}

/// Builds the default parameter set for one strategy type, ported from the original's
/// `PARAMETER_RULES` table (range/optimal/step/mutation_strength per parameter), plus the
/// universal risk and crossover-period parameters every seeded strategy needs.
pub fn default_parameters(strategy_type: &str) -> StrategyParameters {
    let mut params = StrategyParameters::new();
    match strategy_type {
        "momentum" => {
            params.insert(
                "momentum_period".into(),
                int_param(
                    14,
                    5,
                    120,
                    1,
                    dec!(0.2),
                    vec![adapt(MarketRegime::Trending, dec!(0.17)), adapt(MarketRegime::Ranging, dec!(0.09)), adapt(MarketRegime::Volatile, dec!(0.15))],
                ),
            );
            params.insert(
                "momentum_threshold".into(),
                decimal_param(
                    dec!(0.05),
                    dec!(0.01),
                    dec!(0.3),
                    dec!(0.01),
                    dec!(0.1),
                    vec![adapt(MarketRegime::Trending, dec!(0.24)), adapt(MarketRegime::Ranging, dec!(0.14)), adapt(MarketRegime::Volatile, dec!(0.34))],
                ),
            );
            crossover_periods(&mut params, 10, 50, 30, 200);
        }
        "mean_reversion" => {
            params.insert(
                "mean_window".into(),
                int_param(
                    50,
                    10,
                    200,
                    5,
                    dec!(0.2),
                    vec![adapt(MarketRegime::Trending, dec!(0.26)), adapt(MarketRegime::Ranging, dec!(0.16)), adapt(MarketRegime::Volatile, dec!(0.26))],
                ),
            );
            params.insert(
                "std_dev_multiplier".into(),
                decimal_param(
                    dec!(2.0),
                    dec!(1.0),
                    dec!(3.0),
                    dec!(0.1),
                    dec!(0.15),
                    vec![adapt(MarketRegime::Trending, dec!(0.5)), adapt(MarketRegime::Ranging, dec!(0.2)), adapt(MarketRegime::Volatile, dec!(0.5))],
                ),
            );
            crossover_periods(&mut params, 8, 40, 24, 150);
        }
        "breakout" => {
            params.insert(
                "breakout_period".into(),
                int_param(
                    20,
                    5,
                    100,
                    1,
                    dec!(0.25),
                    vec![adapt(MarketRegime::Trending, dec!(0.16)), adapt(MarketRegime::Ranging, dec!(0.11)), adapt(MarketRegime::Volatile, dec!(0.16))],
                ),
            );
            params.insert(
                "breakout_threshold".into(),
                decimal_param(
                    dec!(0.01),
                    dec!(0.005),
                    dec!(0.05),
                    dec!(0.001),
                    dec!(0.2),
                    vec![adapt(MarketRegime::Trending, dec!(0.22)), adapt(MarketRegime::Ranging, dec!(0.11)), adapt(MarketRegime::Volatile, dec!(0.67))],
                ),
            );
            crossover_periods(&mut params, 6, 30, 18, 120);
        }
        "grid" => {
            params.insert(
                "grid_levels".into(),
                int_param(
                    10,
                    3,
                    50,
                    1,
                    dec!(0.3),
                    vec![adapt(MarketRegime::Trending, dec!(0.11)), adapt(MarketRegime::Ranging, dec!(0.26)), adapt(MarketRegime::Volatile, dec!(0.43))],
                ),
            );
            params.insert(
                "grid_spacing".into(),
                decimal_param(
                    dec!(0.01),
                    dec!(0.002),
                    dec!(0.05),
                    dec!(0.001),
                    dec!(0.2),
                    vec![adapt(MarketRegime::Trending, dec!(0.21)), adapt(MarketRegime::Ranging, dec!(0.21)), adapt(MarketRegime::Volatile, dec!(0.625))],
                ),
            );
            crossover_periods(&mut params, 10, 40, 30, 150);
        }
        "trend_following" => {
            params.insert(
                "trend_period".into(),
                int_param(
                    50,
                    10,
                    200,
                    5,
                    dec!(0.25),
                    vec![adapt(MarketRegime::Trending, dec!(0.26)), adapt(MarketRegime::Ranging, dec!(0.16)), adapt(MarketRegime::Volatile, dec!(0.32))],
                ),
            );
            params.insert(
                "trend_threshold".into(),
                decimal_param(
                    dec!(0.03),
                    dec!(0.01),
                    dec!(0.1),
                    dec!(0.005),
                    dec!(0.15),
                    vec![adapt(MarketRegime::Trending, dec!(0.33)), adapt(MarketRegime::Ranging, dec!(0.22)), adapt(MarketRegime::Volatile, dec!(0.67))],
                ),
            );
            crossover_periods(&mut params, 12, 60, 40, 200);
        }
        "high_frequency" => {
            params.insert(
                "hf_window".into(),
                int_param(
                    5,
                    2,
                    30,
                    1,
                    dec!(0.3),
                    vec![adapt(MarketRegime::Trending, dec!(0.18)), adapt(MarketRegime::Ranging, dec!(0.11)), adapt(MarketRegime::Volatile, dec!(0.25))],
                ),
            );
            params.insert(
                "hf_threshold".into(),
                decimal_param(
                    dec!(0.002),
                    dec!(0.001),
                    dec!(0.01),
                    dec!(0.0005),
                    dec!(0.25),
                    vec![adapt(MarketRegime::Trending, dec!(0.22)), adapt(MarketRegime::Ranging, dec!(0.28)), adapt(MarketRegime::Volatile, dec!(0.78))],
                ),
            );
            crossover_periods(&mut params, 3, 15, 8, 40);
        }
        other => {
            tracing::warn!(strategy_type = other, "unrecognized strategy type, seeding only universal crossover/risk parameters");
            crossover_periods(&mut params, 10, 50, 30, 200);
        }
    }
    risk_parameters(&mut params);
    params
}

/// Builds one seed strategy of `strategy_type` for `symbol`, tagged [`CreationMethod::Seed`] at
/// generation 0 — the pool SETE maintains before any evolution cycle has run (§4.6).
pub fn seed_strategy(id: String, strategy_type: &str, symbol: Symbol, created_at: DateTime<Utc>) -> Strategy {
    Strategy::new(id.clone(), id, strategy_type.to_string(), symbol, default_parameters(strategy_type), Lineage::seed(), created_at)
}

/// Builds a pool-tier strategy of `strategy_type` for `symbol` with every parameter randomized
/// within its declared range rather than left at the type's default — the slow loop's
/// "injection of ~N random new strategies" (§4.9), tagged [`CreationMethod::Random`].
pub fn random_strategy(rng: &mut impl Rng, id: String, strategy_type: &str, symbol: Symbol, created_at: DateTime<Utc>) -> Strategy {
    let mut parameters = default_parameters(strategy_type);
    for param in parameters.values_mut() {
        let span = param.max - param.min;
        let fraction = Decimal::try_from(rng.random_range(0.0..1.0_f64)).unwrap_or(dec!(0.5));
        param.value = param.clamp(param.min + span * fraction);
    }

    let mut strategy = Strategy::new(
        id.clone(),
        id,
        strategy_type.to_string(),
        symbol,
        parameters,
        Lineage { parents: Vec::new(), generation: 0, cycle: 0, creation_method: CreationMethod::Random },
        created_at,
    );
    strategy.tier = Tier::Pool;
    strategy
}

/// Picks a strategy type for a freshly injected random strategy. When `biased` (the pool's
/// type distribution has collapsed, §4.9), prefers whichever of `counts` is least represented;
/// otherwise uniform over [`STRATEGY_TYPES`].
pub fn pick_type_for_injection(rng: &mut impl Rng, counts: &HashMap<String, usize>, biased: bool) -> &'static str {
    if biased {
        if let Some(under_represented) = STRATEGY_TYPES.iter().min_by_key(|t| counts.get(**t).copied().unwrap_or(0)) {
            return under_represented;
        }
    }
    STRATEGY_TYPES[rng.random_range(0..STRATEGY_TYPES.len())]
}

/// Seeds `pool` with `per_type` strategies of each of [`STRATEGY_TYPES`], one batch per
/// configured symbol, so every SETE loop the composition root spawns (simulation refresh,
/// dispatch, fast/slow evolution) has something to act on from its very first tick (§1, §4.6).
pub fn seed_pool(pool: &StrategyPool, symbols: &[Symbol], per_type: usize, created_at: DateTime<Utc>) {
    let mut count = 0usize;
    for strategy_type in STRATEGY_TYPES {
        for symbol in symbols {
            for n in 0..per_type {
                count += 1;
                let id = format!("seed-{strategy_type}-{symbol}-{n}-{count}");
                pool.insert(seed_strategy(id, strategy_type, symbol.clone(), created_at));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbitros_integration::time::now_ms;

    #[test]
    fn every_strategy_type_carries_the_crossover_periods_the_dispatch_rule_needs() {
        for strategy_type in STRATEGY_TYPES {
            let params = default_parameters(strategy_type);
            let fast = params.get("fast_period").expect("fast_period");
            let slow = params.get("slow_period").expect("slow_period");
            assert!(slow.value > fast.value, "{strategy_type}: slow_period must exceed fast_period");
        }
    }

    #[test]
    fn seed_pool_populates_every_type_for_every_symbol() {
        let pool = StrategyPool::new(crate::scoring::GateConfig::default());
        let symbols = vec![Symbol::new("BTC", "USDT"), Symbol::new("ETH", "USDT")];
        seed_pool(&pool, &symbols, 1, now_ms());
        assert_eq!(pool.len(), STRATEGY_TYPES.len() * symbols.len());
        for handle in pool.all() {
            let strategy = handle.read();
            assert!(matches!(strategy.lineage.creation_method, CreationMethod::Seed));
            assert!(strategy.parameter_value("fast_period").is_some());
        }
    }

    #[test]
    fn random_strategy_parameters_stay_in_declared_range() {
        let mut rng = rand::rng();
        let strategy = random_strategy(&mut rng, "r-1".into(), "momentum", Symbol::new("BTC", "USDT"), now_ms());
        assert!(matches!(strategy.lineage.creation_method, CreationMethod::Random));
        for param in strategy.parameters.values() {
            assert!(param.value >= param.min && param.value <= param.max);
        }
    }
}
