use arbitros_instrument::Symbol;
use arbitros_integration::time::now_ms;
use arbitros_persistence::WriteChannel;
use arbitros_strategy::{
    evolution::apply_scoring_update,
    pool::StrategyPool,
    scoring::{GateConfig, ScoreInputs, ScoreWeights},
    types::{Lineage, RollingMetrics, Strategy, StrategyParameters, Tier},
};
use rust_decimal_macros::dec;

fn strategy(id: &str) -> Strategy {
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
fn full_lifecycle_from_pool_to_trading_requires_every_gate() {
    let pool = StrategyPool::new(GateConfig::default());
    let mut s = strategy("lifecycle-1");
    s.metrics = RollingMetrics { score: dec!(12), trade_count: 31, ..RollingMetrics::default() };
    pool.insert(s);

    let persist = WriteChannel::new(128);

    // Gates met for display, but not yet enough trades/score for trading.
    assert_eq!(pool.evaluate_tier("lifecycle-1", now_ms(), &persist), Some(Tier::Display));

    // Feed three consecutive improving score updates and age the param-change timestamp past
    // the stability window so trading becomes reachable.
    {
        let handle = pool.get("lifecycle-1").unwrap();
        let mut s = handle.write();
        for trial_score in [dec!(50), dec!(60), dec!(70)] {
            let inputs = ScoreInputs {
                total_return: trial_score / dec!(100),
                win_rate: dec!(0.7),
                sharpe: dec!(1.5),
                max_drawdown: dec!(0.05),
                profit_factor: dec!(1.8),
                trade_count: 10,
            };
            apply_scoring_update(&mut s, inputs, ScoreWeights::default(), dec!(1.0));
        }
        s.last_param_change_at = now_ms() - chrono::Duration::hours(48);
    }

    assert_eq!(pool.evaluate_tier("lifecycle-1", now_ms(), &persist), Some(Tier::Trading));
}

#[test]
fn strategy_just_below_trading_threshold_stays_in_display() {
    let pool = StrategyPool::new(GateConfig::default());
    let mut s = strategy("boundary-1");
    s.tier = Tier::Display;
    s.last_param_change_at = now_ms() - chrono::Duration::hours(48);
    s.metrics = RollingMetrics {
        score: dec!(64.99),
        win_rate: dec!(0.7),
        consecutive_improvements: 5,
        trade_count: 100,
    };
    pool.insert(s);

    let persist = WriteChannel::new(128);
    assert_eq!(pool.evaluate_tier("boundary-1", now_ms(), &persist), Some(Tier::Display));
}

#[test]
fn reloading_parameters_after_persistence_round_trip_preserves_tier_and_values() {
    let pool = StrategyPool::new(GateConfig::default());
    let mut s = strategy("roundtrip-1");
    s.tier = Tier::Trading;
    s.parameters.insert(
        "fast_ma".to_string(),
        arbitros_strategy::ParameterSpec::new(dec!(12), dec!(2), dec!(50), dec!(1), arbitros_strategy::types::ParameterType::Int),
    );
    pool.insert(s.clone());

    let reloaded = pool.get("roundtrip-1").unwrap();
    let reloaded = reloaded.read();
    assert_eq!(reloaded.tier, Tier::Trading);
    assert_eq!(reloaded.parameters["fast_ma"].value, dec!(12));
}
