use crate::regime::MarketRegime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Raw per-dimension statistics a score is computed from (§4.8), sourced from either a
/// [`crate::simulation::SimulationResult`] or a realized trade-cycle rollup.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs {
    pub total_return: Decimal,
    /// Ratio in `[0, 1]` (§9 Open Question resolved to ratio everywhere).
    pub win_rate: Decimal,
    pub sharpe: Decimal,
    pub max_drawdown: Decimal,
    pub profit_factor: Decimal,
    pub trade_count: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub total_return: Decimal,
    pub win_rate: Decimal,
    pub sharpe: Decimal,
    pub max_drawdown: Decimal,
    pub profit_factor: Decimal,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            total_return: dec!(0.30),
            win_rate: dec!(0.25),
            sharpe: dec!(0.20),
            max_drawdown: dec!(0.15),
            profit_factor: dec!(0.10),
        }
    }
}

impl ScoreWeights {
    /// Perturbs weights per §4.8's market-state adjustment (trending up-weights return &
    /// sharpe; ranging up-weights win_rate & profit_factor), then renormalizes to sum to 1.
    pub fn adjusted_for(&self, regime: Option<MarketRegime>) -> Self {
        let mut w = *self;
        match regime {
            Some(MarketRegime::Trending) => {
                w.total_return += dec!(0.05);
                w.sharpe += dec!(0.05);
                w.win_rate -= dec!(0.05);
                w.profit_factor -= dec!(0.05);
            }
            Some(MarketRegime::Ranging) => {
                w.win_rate += dec!(0.05);
                w.profit_factor += dec!(0.05);
                w.total_return -= dec!(0.05);
                w.sharpe -= dec!(0.05);
            }
            Some(MarketRegime::Volatile) => {
                w.max_drawdown += dec!(0.05);
                w.sharpe -= dec!(0.05);
            }
            None => {}
        }
        w.total_return = w.total_return.max(Decimal::ZERO);
        w.win_rate = w.win_rate.max(Decimal::ZERO);
        w.sharpe = w.sharpe.max(Decimal::ZERO);
        w.max_drawdown = w.max_drawdown.max(Decimal::ZERO);
        w.profit_factor = w.profit_factor.max(Decimal::ZERO);

        let sum = w.total_return + w.win_rate + w.sharpe + w.max_drawdown + w.profit_factor;
        if sum.is_zero() {
            return *self;
        }
        w.total_return /= sum;
        w.win_rate /= sum;
        w.sharpe /= sum;
        w.max_drawdown /= sum;
        w.profit_factor /= sum;
        w
    }
}

/// Saturating transform mapping an unbounded raw dimension into `[0, 100]` via
/// `100 * x / (x + k)` for positive `x` (and 0 for non-positive `x`), so no single dimension
/// can dominate the composite regardless of scale (§4.8).
fn saturate(x: Decimal, k: Decimal) -> Decimal {
    if x <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    dec!(100) * x / (x + k)
}

/// Inverse-saturating transform for dimensions where smaller is better (max_drawdown):
/// `100 * k / (x + k)`, so a drawdown of 0 scores 100 and larger drawdowns decay toward 0.
fn saturate_inverse(x: Decimal, k: Decimal) -> Decimal {
    let x = x.abs();
    dec!(100) * k / (x + k)
}

/// Trade-count confidence multiplier (§4.8): ramps 0.7-1.0 linearly below 10 trades, holds at
/// 1.0 between 10 and 50, and ramps up to a 1.2 cap at 100+.
fn trade_count_factor(trade_count: u32) -> Decimal {
    let n = Decimal::from(trade_count);
    if trade_count < 10 {
        dec!(0.7) + (n / dec!(10)) * dec!(0.3)
    } else if trade_count <= 50 {
        dec!(1.0)
    } else if trade_count < 100 {
        let progress = (n - dec!(50)) / dec!(50);
        dec!(1.0) + progress * dec!(0.2)
    } else {
        dec!(1.2)
    }
}

/// Computes the composite score in `[0, 100]` for one set of inputs, under an optional market
/// regime adjustment (§4.8). Always clamped into range regardless of how extreme the inputs
/// are, per §8's "scoring is bounded" invariant.
pub fn composite_score(inputs: ScoreInputs, weights: ScoreWeights, regime: Option<MarketRegime>) -> Decimal {
    let w = weights.adjusted_for(regime);

    let return_score = saturate(inputs.total_return, dec!(0.20));
    let win_rate_score = (inputs.win_rate.clamp(Decimal::ZERO, Decimal::ONE)) * dec!(100);
    let sharpe_score = saturate(inputs.sharpe, dec!(1.5));
    let drawdown_score = saturate_inverse(inputs.max_drawdown, dec!(0.15));
    let profit_factor_score = saturate(inputs.profit_factor - Decimal::ONE, dec!(1.0));

    let weighted = w.total_return * return_score
        + w.win_rate * win_rate_score
        + w.sharpe * sharpe_score
        + w.max_drawdown * drawdown_score
        + w.profit_factor * profit_factor_score;

    let factored = weighted * trade_count_factor(inputs.trade_count);
    factored.clamp(Decimal::ZERO, dec!(100))
}

/// Rolling exponential update: `new = old*(1-alpha) + component*alpha` (§4.8). The rolling
/// score, never the instantaneous one, is what gating reads.
pub fn rolling_update(old_score: Decimal, component_score: Decimal, alpha: Decimal) -> Decimal {
    (old_score * (Decimal::ONE - alpha) + component_score * alpha).clamp(Decimal::ZERO, dec!(100))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateConfig {
    pub display_min_score: Decimal,
    pub trading_min_score: Decimal,
    pub min_trades: u32,
    pub min_win_rate: Decimal,
    pub consec_improvements: u32,
    pub param_stability_hours: i64,
    pub elimination_score: Decimal,
    pub elimination_days: i64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            display_min_score: dec!(10),
            trading_min_score: dec!(65),
            min_trades: 30,
            min_win_rate: dec!(0.6),
            consec_improvements: 3,
            param_stability_hours: 24,
            elimination_score: dec!(5),
            elimination_days: 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(trade_count: u32) -> ScoreInputs {
        ScoreInputs {
            total_return: dec!(0.25),
            win_rate: dec!(0.65),
            sharpe: dec!(1.8),
            max_drawdown: dec!(0.1),
            profit_factor: dec!(1.8),
            trade_count,
        }
    }

    #[test]
    fn score_is_always_bounded_in_0_100() {
        let weights = ScoreWeights::default();
        for trade_count in [0, 5, 10, 49, 50, 75, 100, 500] {
            let score = composite_score(inputs(trade_count), weights, None);
            assert!(score >= Decimal::ZERO && score <= dec!(100), "score {score} out of range");
        }

        let extreme = ScoreInputs {
            total_return: dec!(1_000_000),
            win_rate: dec!(2), // illegal out-of-range input still gets clamped
            sharpe: dec!(1_000_000),
            max_drawdown: dec!(1_000_000),
            profit_factor: dec!(1_000_000),
            trade_count: 1000,
        };
        let score = composite_score(extreme, weights, None);
        assert!(score >= Decimal::ZERO && score <= dec!(100));
    }

    #[test]
    fn more_trades_scores_at_least_as_high_all_else_equal() {
        let weights = ScoreWeights::default();
        let low = composite_score(inputs(3), weights, None);
        let mid = composite_score(inputs(30), weights, None);
        let high = composite_score(inputs(150), weights, None);
        assert!(low <= mid);
        assert!(mid <= high);
    }

    #[test]
    fn trending_regime_upweights_return_and_sharpe() {
        let weights = ScoreWeights::default();
        let adjusted = weights.adjusted_for(Some(MarketRegime::Trending));
        assert!(adjusted.total_return > weights.total_return);
        assert!(adjusted.sharpe > weights.sharpe);

        let sum = adjusted.total_return + adjusted.win_rate + adjusted.sharpe + adjusted.max_drawdown + adjusted.profit_factor;
        assert!((sum - Decimal::ONE).abs() < dec!(0.0001));
    }

    #[test]
    fn rolling_update_moves_toward_component_by_alpha() {
        let updated = rolling_update(dec!(50), dec!(80), dec!(0.3));
        assert_eq!(updated, dec!(59));
    }

    #[test]
    fn exactly_at_threshold_vs_just_under() {
        let gates = GateConfig::default();
        assert!(dec!(65) >= gates.trading_min_score);
        assert!(dec!(64.99) < gates.trading_min_score);
    }
}
