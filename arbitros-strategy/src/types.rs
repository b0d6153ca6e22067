use arbitros_instrument::Symbol;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Administrative classification controlling where a strategy is shown and whether its
/// signals may use real capital (§3, §4.6).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Tier {
    Pool,
    Display,
    Trading,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Pool => "pool",
            Tier::Display => "display",
            Tier::Trading => "trading",
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum CreationMethod {
    Seed,
    Random,
    Mutation,
    Crossover,
}

impl CreationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreationMethod::Seed => "seed",
            CreationMethod::Random => "random",
            CreationMethod::Mutation => "mutation",
            CreationMethod::Crossover => "crossover",
        }
    }
}

/// Parentage and generation bookkeeping for one strategy (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lineage {
    pub parents: Vec<String>,
    pub generation: u32,
    pub cycle: u32,
    pub creation_method: CreationMethod,
}

impl Lineage {
    pub fn seed() -> Self {
        Self {
            parents: Vec::new(),
            generation: 0,
            cycle: 0,
            creation_method: CreationMethod::Seed,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum ParameterType {
    Int,
    Decimal,
    Bool,
}

/// One row of the market-adaptation table (§3): the multiplier this parameter's effective
/// range is scaled by when the supplied [`crate::regime::MarketRegime`] matches `regime`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketAdaptation {
    pub regime: crate::regime::MarketRegime,
    pub range_scale: Decimal,
}

/// A single tunable parameter. Every parameter knows its legal range; illegal values are
/// clamped rather than rejected (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub value: Decimal,
    pub min: Decimal,
    pub max: Decimal,
    pub step: Decimal,
    pub value_type: ParameterType,
    pub mutation_rate: Decimal,
    pub market_adaptation: Vec<MarketAdaptation>,
}

impl ParameterSpec {
    pub fn new(value: Decimal, min: Decimal, max: Decimal, step: Decimal, value_type: ParameterType) -> Self {
        Self {
            value,
            min,
            max,
            step,
            value_type,
            mutation_rate: Decimal::new(2, 1), // 0.2 default
            market_adaptation: Vec::new(),
        }
    }

    /// Range as adjusted for `regime`, widened or narrowed per the parameter's adaptation
    /// table. Falls back to the declared range when no entry matches.
    pub fn adapted_range(&self, regime: Option<crate::regime::MarketRegime>) -> (Decimal, Decimal) {
        let Some(regime) = regime else {
            return (self.min, self.max);
        };
        let Some(adaptation) = self.market_adaptation.iter().find(|a| a.regime == regime) else {
            return (self.min, self.max);
        };
        let mid = (self.min + self.max) / Decimal::TWO;
        let half_span = (self.max - self.min) / Decimal::TWO * adaptation.range_scale;
        (mid - half_span, mid + half_span)
    }

    pub fn clamp(&self, value: Decimal) -> Decimal {
        arbitros_integration::decimal::clamp_and_snap(value, self.min, self.max, self.step)
    }
}

/// Typed map keyed by parameter name (§3). Ordered so persistence and logs are deterministic.
pub type StrategyParameters = IndexMap<String, ParameterSpec>;

/// Rolling metrics updated on every new simulation or real-trade outcome (§4.7, §4.8).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RollingMetrics {
    pub score: Decimal,
    /// Win rate as a ratio in `[0, 1]` (§9 Open Question: the source mixes ratio and percent;
    /// this implementation standardizes on ratio everywhere and converts at config load).
    pub win_rate: Decimal,
    pub consecutive_improvements: u32,
    pub trade_count: u32,
}

impl Default for RollingMetrics {
    fn default() -> Self {
        Self {
            score: Decimal::ZERO,
            win_rate: Decimal::ZERO,
            consecutive_improvements: 0,
            trade_count: 0,
        }
    }
}

/// A parametric trading strategy (§3). `id` is a stable string; only [`crate::pool::StrategyPool`]
/// may mutate a strategy, and only under its per-strategy write lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub name: String,
    pub strategy_type: String,
    pub symbol: Symbol,
    pub parameters: StrategyParameters,
    pub tier: Tier,
    pub enabled: bool,
    pub lineage: Lineage,
    pub last_param_change_at: DateTime<Utc>,
    pub validation_trades_since_change: u32,
    pub metrics: RollingMetrics,
    pub consecutive_low_score_windows: u32,
    pub created_at: DateTime<Utc>,
}

impl Strategy {
    pub fn new(
        id: String,
        name: String,
        strategy_type: String,
        symbol: Symbol,
        parameters: StrategyParameters,
        lineage: Lineage,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            strategy_type,
            symbol,
            parameters,
            tier: Tier::Pool,
            enabled: true,
            lineage,
            last_param_change_at: created_at,
            validation_trades_since_change: 0,
            metrics: RollingMetrics::default(),
            consecutive_low_score_windows: 0,
            created_at,
        }
    }

    /// Stamps the param-change bookkeeping that §4.10 requires of every mutation or
    /// crossover: `last_param_change_at = now`, `validation_trades_since_change` reset to 0.
    pub fn mark_parameters_changed(&mut self, at: DateTime<Utc>) {
        self.last_param_change_at = at;
        self.validation_trades_since_change = 0;
    }

    pub fn record_validation_trade(&mut self) {
        self.validation_trades_since_change += 1;
    }

    pub fn parameter_value(&self, name: &str) -> Option<Decimal> {
        self.parameters.get(name).map(|p| p.value)
    }
}
