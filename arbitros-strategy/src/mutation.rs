use crate::{
    regime::MarketRegime,
    types::{ParameterSpec, Strategy, StrategyParameters},
};
use arbitros_integration::decimal::clamp_and_snap;
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Global multiplier applied to every parameter's own `mutation_rate` (§4.10). The evolution
/// scheduler tunes this up for aggressive slow-loop passes and down for gentle fast-loop
/// nudges.
#[derive(Debug, Clone, Copy)]
pub struct MutationStrength(pub Decimal);

impl Default for MutationStrength {
    fn default() -> Self {
        Self(Decimal::ONE)
    }
}

fn gaussian(rng: &mut impl Rng, std_dev: Decimal) -> Decimal {
    // Box-Muller, truncated to a float-safe precision then converted back to Decimal; only
    // used to scale a clamp-and-snap perturbation so the rare float rounding here never
    // reaches a persisted monetary quantity.
    let u1: f64 = rng.random_range(1e-12..1.0);
    let u2: f64 = rng.random_range(0.0..1.0);
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    Decimal::try_from(z).unwrap_or(Decimal::ZERO) * std_dev
}

/// Mutates one parameter in place per §4.10: with probability
/// `mutation_rate * global_strength`, perturb by Gaussian noise scaled to 10% of the
/// parameter's market-adapted range, then clamp to range and snap to step.
fn mutate_parameter(
    rng: &mut impl Rng,
    param: &mut ParameterSpec,
    strength: MutationStrength,
    regime: Option<MarketRegime>,
) -> bool {
    let probability = (param.mutation_rate * strength.0).clamp(Decimal::ZERO, Decimal::ONE);
    let probability_f64: f64 = probability.try_into().unwrap_or(0.0);
    if !rng.random_bool(probability_f64) {
        return false;
    }

    let (min, max) = param.adapted_range(regime);
    let span = max - min;
    let std_dev = span * dec!(0.10);
    let noise = gaussian(rng, std_dev);

    param.value = clamp_and_snap(param.value + noise, param.min, param.max, param.step);
    true
}

/// Mutates every eligible parameter of `strategy` in place. Returns `true` if at least one
/// parameter actually changed, in which case the caller is responsible for stamping
/// `mark_parameters_changed` and recording an [`crate::types::Lineage`] update.
pub fn mutate(
    rng: &mut impl Rng,
    strategy: &mut Strategy,
    strength: MutationStrength,
    regime: Option<MarketRegime>,
) -> bool {
    let mut changed = false;
    for param in strategy.parameters.values_mut() {
        if mutate_parameter(rng, param, strength, regime) {
            changed = true;
        }
    }
    changed
}

#[derive(Debug, Clone, Copy)]
pub struct CrossoverRate(pub Decimal);

impl Default for CrossoverRate {
    fn default() -> Self {
        Self(dec!(0.5))
    }
}

/// Produces one child parameter map from two parents per §4.10: for every parameter common to
/// both, with probability `crossover_rate` either inherit from one parent (50/50) or set to
/// the arithmetic mean (then snap to step); non-common parameters are inherited from their
/// originating parent unchanged.
pub fn crossover(
    rng: &mut impl Rng,
    parent_a: &StrategyParameters,
    parent_b: &StrategyParameters,
    rate: CrossoverRate,
) -> StrategyParameters {
    let mut child = StrategyParameters::new();
    let rate_f64: f64 = rate.0.try_into().unwrap_or(0.5);

    for (name, spec_a) in parent_a {
        let Some(spec_b) = parent_b.get(name) else {
            child.insert(name.clone(), spec_a.clone());
            continue;
        };

        if !rng.random_bool(rate_f64) {
            // not crossed: inherit verbatim from the originating parent (a, by convention)
            child.insert(name.clone(), spec_a.clone());
            continue;
        }

        let mut inherited = if rng.random_bool(0.5) { spec_a.clone() } else { spec_b.clone() };
        if rng.random_bool(0.5) {
            let mean = (spec_a.value + spec_b.value) / Decimal::TWO;
            inherited.value = clamp_and_snap(mean, inherited.min, inherited.max, inherited.step);
        }
        child.insert(name.clone(), inherited);
    }

    for (name, spec_b) in parent_b {
        if !child.contains_key(name) {
            child.insert(name.clone(), spec_b.clone());
        }
    }

    child
}

/// Convenience wrapper stamping the §4.10 bookkeeping a successful mutation/crossover must
/// apply: `last_param_change_at = now`, `validation_trades_since_change` reset to 0.
pub fn apply_parameter_change(strategy: &mut Strategy, new_parameters: StrategyParameters, at: DateTime<Utc>) {
    strategy.parameters = new_parameters;
    strategy.mark_parameters_changed(at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParameterType;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn param(value: Decimal, min: Decimal, max: Decimal, step: Decimal) -> ParameterSpec {
        let mut p = ParameterSpec::new(value, min, max, step, ParameterType::Decimal);
        p.mutation_rate = Decimal::ONE; // force mutation for deterministic tests
        p
    }

    #[test]
    fn mutated_parameter_stays_in_range_and_on_step() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let mut p = param(dec!(50), dec!(0), dec!(100), dec!(5));
            mutate_parameter(&mut rng, &mut p, MutationStrength::default(), None);
            assert!(p.value >= p.min && p.value <= p.max, "value {} out of range", p.value);
            assert!(
                arbitros_integration::decimal::is_on_step(p.value, p.min, p.step, dec!(0.0001)),
                "value {} not on step",
                p.value
            );
        }
    }

    #[test]
    fn boundary_parameter_mutates_only_inward() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut p = param(dec!(100), dec!(0), dec!(100), dec!(1));
            mutate_parameter(&mut rng, &mut p, MutationStrength::default(), None);
            assert!(p.value <= dec!(100));
        }
    }

    #[test]
    fn crossover_child_parameters_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut a = StrategyParameters::new();
        a.insert("fast_ma".to_string(), param(dec!(10), dec!(2), dec!(50), dec!(1)));
        let mut b = StrategyParameters::new();
        b.insert("fast_ma".to_string(), param(dec!(40), dec!(2), dec!(50), dec!(1)));

        for _ in 0..50 {
            let child = crossover(&mut rng, &a, &b, CrossoverRate(dec!(1.0)));
            let p = &child["fast_ma"];
            assert!(p.value >= p.min && p.value <= p.max);
        }
    }

    #[test]
    fn non_common_parameters_carry_from_originating_parent() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut a = StrategyParameters::new();
        a.insert("fast_ma".to_string(), param(dec!(10), dec!(2), dec!(50), dec!(1)));
        a.insert("only_a".to_string(), param(dec!(3), dec!(0), dec!(10), dec!(1)));
        let mut b = StrategyParameters::new();
        b.insert("fast_ma".to_string(), param(dec!(40), dec!(2), dec!(50), dec!(1)));
        b.insert("only_b".to_string(), param(dec!(9), dec!(0), dec!(10), dec!(1)));

        let child = crossover(&mut rng, &a, &b, CrossoverRate(dec!(0.0)));
        assert_eq!(child["only_a"].value, dec!(3));
        assert_eq!(child["only_b"].value, dec!(9));
    }
}
