use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market regime classification feeding Scoring & Gating's market-state adjustment (§4.8).
/// Not named by spec.md beyond "if a market regime is supplied"; the classifier here supplies
/// a concrete producer, grounded on the original's volatility/trend-persistence heuristic.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MarketRegime {
    Trending,
    Ranging,
    Volatile,
}

/// Classifies a short window of recent closing prices into a [`MarketRegime`] from realized
/// volatility and directional persistence. A pure function: callers own sourcing the window
/// from [`arbitros_data::SnapshotMap`] history; this module only classifies it.
pub fn classify(recent_closes: &[Decimal]) -> Option<MarketRegime> {
    if recent_closes.len() < 3 {
        return None;
    }

    let returns: Vec<Decimal> = recent_closes
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();

    let mean: Decimal = returns.iter().copied().sum::<Decimal>() / Decimal::from(returns.len());
    let variance: Decimal = returns
        .iter()
        .map(|r| (*r - mean) * (*r - mean))
        .sum::<Decimal>()
        / Decimal::from(returns.len());
    let volatility = variance.sqrt().unwrap_or(Decimal::ZERO);

    let same_sign_count = returns
        .windows(2)
        .filter(|w| w[0].signum() == w[1].signum() && !w[0].is_zero())
        .count();
    let persistence = Decimal::from(same_sign_count) / Decimal::from(returns.len().max(1));

    const HIGH_VOLATILITY: Decimal = Decimal::from_parts(2, 0, 0, false, 2); // 0.02
    const TRENDING_PERSISTENCE: Decimal = Decimal::from_parts(6, 0, 0, false, 1); // 0.6

    Some(if volatility >= HIGH_VOLATILITY {
        MarketRegime::Volatile
    } else if persistence >= TRENDING_PERSISTENCE {
        MarketRegime::Trending
    } else {
        MarketRegime::Ranging
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn too_short_a_window_is_unclassified() {
        assert_eq!(classify(&[dec!(1), dec!(1.01)]), None);
    }

    #[test]
    fn steadily_rising_series_is_trending() {
        let closes = vec![dec!(100), dec!(101), dec!(102), dec!(103), dec!(104), dec!(105)];
        assert_eq!(classify(&closes), Some(MarketRegime::Trending));
    }

    #[test]
    fn choppy_flat_series_is_ranging() {
        let closes = vec![dec!(100), dec!(100.5), dec!(100.1), dec!(100.6), dec!(100.2)];
        assert_eq!(classify(&closes), Some(MarketRegime::Ranging));
    }

    #[test]
    fn large_swings_are_volatile() {
        let closes = vec![dec!(100), dec!(110), dec!(95), dec!(115), dec!(90)];
        assert_eq!(classify(&closes), Some(MarketRegime::Volatile));
    }
}
