use rust_decimal::Decimal;

/// Clamp `value` into `[min, max]`, then snap it to the nearest multiple of `step` at or
/// below the clamped value when rounding down would keep it in range, matching §4.10's
/// "clamp to range; snap to step" mutation rule.
///
/// `step` of zero is treated as "no stepping" (value is only clamped).
pub fn clamp_and_snap(value: Decimal, min: Decimal, max: Decimal, step: Decimal) -> Decimal {
    let clamped = value.clamp(min, max);
    if step.is_zero() {
        return clamped;
    }

    let steps_from_min = ((clamped - min) / step).round();
    let snapped = min + steps_from_min * step;
    snapped.clamp(min, max)
}

/// Whether `value` sits on a `step` boundary relative to `min`, within `epsilon`.
pub fn is_on_step(value: Decimal, min: Decimal, step: Decimal, epsilon: Decimal) -> bool {
    if step.is_zero() {
        return true;
    }
    let offset = (value - min) % step;
    let distance = offset.min(step - offset);
    distance.abs() <= epsilon
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn clamps_into_range() {
        let v = clamp_and_snap(dec!(150), dec!(0), dec!(100), dec!(1));
        assert_eq!(v, dec!(100));
        let v = clamp_and_snap(dec!(-5), dec!(0), dec!(100), dec!(1));
        assert_eq!(v, dec!(0));
    }

    #[test]
    fn snaps_to_step() {
        let v = clamp_and_snap(dec!(10.37), dec!(0), dec!(100), dec!(0.25));
        assert!(is_on_step(v, dec!(0), dec!(0.25), dec!(0.0001)));
    }

    #[test]
    fn boundary_value_mutates_only_inward() {
        // a parameter already pinned at its max can only move down, never past the boundary
        let v = clamp_and_snap(dec!(105), dec!(0), dec!(100), dec!(5));
        assert_eq!(v, dec!(100));
    }
}
