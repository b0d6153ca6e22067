use crate::types::Strategy;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Output of one simulation run (§3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub strategy_id: String,
    pub run_at: DateTime<Utc>,
    pub days_simulated: Decimal,
    pub trade_count: u32,
    pub win_rate: Decimal,
    pub total_return: Decimal,
    pub sharpe: Decimal,
    pub max_drawdown: Decimal,
    pub score: Decimal,
    /// Snapshot of the parameters this run was simulated with (§3), so a later read of this
    /// result never has to guess what the strategy's parameters were *at the time of the run*
    /// if they've since mutated.
    pub parameters_snapshot: Value,
}

#[derive(Debug, Clone, Copy)]
pub struct SimulationConfig {
    pub days_per_run: Decimal,
    pub min_trades_required: u32,
    /// Wall-clock cap so a pathological strategy can never stall the evolution scheduler
    /// (§5 "SE simulation has a wall-clock cap").
    pub wall_clock_cap: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            days_per_run: dec!(3),
            min_trades_required: 5,
            wall_clock_cap: Duration::from_secs(5),
        }
    }
}

/// One simulated market bar; a minimal replay unit sufficient to drive the signal rule below
/// without depending on a concrete strategy-rule trait (that lives in `arbitros-signal`, which
/// depends on this crate, not the other way around).
#[derive(Debug, Clone, Copy)]
pub struct ReplayBar {
    pub close: Decimal,
    pub at: DateTime<Utc>,
}

/// A strategy's signal rule, expressed purely in terms of a moving window of bars so the
/// simulation engine can replay it with no side effects on live state (§4.7: "SE is pure").
/// The real dispatch-facing signal generation in `arbitros-signal` implements the same trait.
pub trait SignalRule {
    /// Returns `Some(true)` for buy, `Some(false)` for sell, `None` for no action, given the
    /// bars observed so far (most recent last).
    fn decide(&self, strategy: &Strategy, window: &[ReplayBar]) -> Option<bool>;
}

/// Applies `rule`'s signal decisions to `bars` with modeled slippage and fees, producing a
/// [`SimulationResult`]. Pure: no I/O, no mutation of `strategy` beyond read access.
pub fn simulate(
    strategy: &Strategy,
    bars: &[ReplayBar],
    rule: &dyn SignalRule,
    config: SimulationConfig,
    slippage_pct: Decimal,
    fee_pct: Decimal,
) -> SimulationResult {
    let start = Instant::now();
    let mut position: Option<Decimal> = None; // entry price while long
    let mut trade_returns: Vec<Decimal> = Vec::new();
    let mut equity = Decimal::ONE;
    let mut peak_equity = Decimal::ONE;
    let mut max_drawdown = Decimal::ZERO;

    for i in 0..bars.len() {
        if start.elapsed() > config.wall_clock_cap {
            tracing::warn!(strategy_id = %strategy.id, "simulation wall-clock cap hit, truncating replay");
            break;
        }

        let window = &bars[..=i];
        let decision = rule.decide(strategy, window);
        let price = bars[i].close;

        match (position, decision) {
            (None, Some(true)) => {
                position = Some(price * (Decimal::ONE + slippage_pct));
            }
            (Some(entry), Some(false)) => {
                let exit = price * (Decimal::ONE - slippage_pct);
                let trade_return = (exit - entry) / entry - fee_pct * Decimal::TWO;
                trade_returns.push(trade_return);
                equity *= Decimal::ONE + trade_return;
                peak_equity = peak_equity.max(equity);
                let drawdown = (peak_equity - equity) / peak_equity;
                max_drawdown = max_drawdown.max(drawdown);
                position = None;
            }
            _ => {}
        }
    }

    let trade_count = trade_returns.len() as u32;
    let wins = trade_returns.iter().filter(|r| **r > Decimal::ZERO).count();
    let win_rate = if trade_count == 0 {
        Decimal::ZERO
    } else {
        Decimal::from(wins) / Decimal::from(trade_count)
    };
    let total_return = equity - Decimal::ONE;
    let sharpe = sharpe_ratio(&trade_returns);
    let score = crate::scoring::composite_score(
        crate::scoring::ScoreInputs {
            total_return,
            win_rate,
            sharpe,
            max_drawdown,
            profit_factor: profit_factor(&trade_returns),
            trade_count,
        },
        crate::scoring::ScoreWeights::default(),
        None,
    );

    SimulationResult {
        strategy_id: strategy.id.clone(),
        run_at: arbitros_integration::time::now_ms(),
        days_simulated: config.days_per_run,
        trade_count,
        win_rate,
        total_return,
        sharpe,
        max_drawdown,
        score,
        parameters_snapshot: serde_json::to_value(&strategy.parameters).unwrap_or_default(),
    }
}

fn sharpe_ratio(returns: &[Decimal]) -> Decimal {
    if returns.len() < 2 {
        return Decimal::ZERO;
    }
    let n = Decimal::from(returns.len());
    let mean = returns.iter().copied().sum::<Decimal>() / n;
    let variance = returns.iter().map(|r| (*r - mean) * (*r - mean)).sum::<Decimal>() / n;
    let std_dev = variance.sqrt().unwrap_or(Decimal::ZERO);
    if std_dev.is_zero() {
        return Decimal::ZERO;
    }
    mean / std_dev
}

fn profit_factor(returns: &[Decimal]) -> Decimal {
    let gains: Decimal = returns.iter().filter(|r| **r > Decimal::ZERO).copied().sum();
    let losses: Decimal = returns.iter().filter(|r| **r < Decimal::ZERO).copied().sum::<Decimal>().abs();
    if losses.is_zero() {
        return if gains.is_zero() { Decimal::ONE } else { dec!(2) };
    }
    gains / losses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Lineage, StrategyParameters};
    use arbitros_instrument::Symbol;
    use arbitros_integration::time::now_ms;

    struct AlwaysFlipRule;
    impl SignalRule for AlwaysFlipRule {
        fn decide(&self, _strategy: &Strategy, window: &[ReplayBar]) -> Option<bool> {
            Some(window.len() % 2 == 1)
        }
    }

    fn strategy() -> Strategy {
        Strategy::new(
            "s-1".into(),
            "test".into(),
            "momentum".into(),
            Symbol::new("BTC", "USDT"),
            StrategyParameters::new(),
            Lineage::seed(),
            now_ms(),
        )
    }

    #[test]
    fn simulation_never_exceeds_its_wall_clock_cap_materially() {
        let bars: Vec<ReplayBar> = (0..10_000)
            .map(|i| ReplayBar { close: dec!(100) + Decimal::from(i % 7), at: now_ms() })
            .collect();
        let config = SimulationConfig { wall_clock_cap: Duration::from_millis(5), ..Default::default() };
        let start = Instant::now();
        let _ = simulate(&strategy(), &bars, &AlwaysFlipRule, config, dec!(0), dec!(0));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn score_from_simulation_is_bounded() {
        let bars: Vec<ReplayBar> = (0..50)
            .map(|i| ReplayBar { close: dec!(100) + Decimal::from(i), at: now_ms() })
            .collect();
        let result = simulate(&strategy(), &bars, &AlwaysFlipRule, SimulationConfig::default(), dec!(0.0005), dec!(0.001));
        assert!(result.score >= Decimal::ZERO && result.score <= dec!(100));
    }
}
