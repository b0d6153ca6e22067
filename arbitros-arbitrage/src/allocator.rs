use crate::types::OpportunityClass;
use arbitros_integration::ErrorKind;
use derive_more::Constructor;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct FundAllocatorError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl FundAllocatorError {
    pub fn insufficient_class_capital(class: OpportunityClass) -> Self {
        Self {
            kind: ErrorKind::InsufficientFunds,
            detail: format!("insufficient_class_capital: {}", class.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Constructor)]
pub struct ReservationToken(Uuid);

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    allocated_total: Decimal,
    available: Decimal,
}

struct Inner {
    buckets: HashMap<OpportunityClass, Bucket>,
    reservations: HashMap<Uuid, (OpportunityClass, Decimal)>,
    /// Realized returns accumulated since the last rebalance, used to weight the next shift.
    recent_returns: HashMap<OpportunityClass, Decimal>,
}

/// Fund Allocator (FA, §4.4): per-class capital buckets guarded by a single mutex. The
/// critical section is O(1) — no I/O, no nested locks — so it never becomes a contention
/// point for the executor tasks that call it.
pub struct FundAllocator {
    inner: Mutex<Inner>,
    min_share: Decimal,
    max_share: Decimal,
}

impl FundAllocator {
    pub fn new(fund_total: Decimal, fund_allocation: HashMap<OpportunityClass, Decimal>, min_share: Decimal, max_share: Decimal) -> Self {
        let buckets = fund_allocation
            .into_iter()
            .map(|(class, share)| {
                let amount = fund_total * share;
                (class, Bucket { allocated_total: amount, available: amount })
            })
            .collect();

        Self {
            inner: Mutex::new(Inner {
                buckets,
                reservations: HashMap::new(),
                recent_returns: HashMap::new(),
            }),
            min_share,
            max_share,
        }
    }

    pub fn reserve(&self, class: OpportunityClass, amount: Decimal) -> Result<ReservationToken, FundAllocatorError> {
        let mut inner = self.inner.lock();
        let bucket = inner.buckets.entry(class).or_default();
        if amount > bucket.available {
            return Err(FundAllocatorError::insufficient_class_capital(class));
        }
        bucket.available -= amount;
        let token = Uuid::new_v4();
        inner.reservations.insert(token, (class, amount));
        Ok(ReservationToken(token))
    }

    /// Returns `returned_amount` to the class's available pool and records the delta against
    /// `reserved_capital` as realized P&L for the next rebalance pass.
    pub fn release(&self, token: ReservationToken, returned_amount: Decimal) {
        let mut inner = self.inner.lock();
        let Some((class, reserved)) = inner.reservations.remove(&token.0) else {
            tracing::warn!("release called with unknown or already-released reservation token");
            return;
        };
        let pnl = returned_amount - reserved;
        *inner.recent_returns.entry(class).or_insert(Decimal::ZERO) += pnl;

        let bucket = inner.buckets.entry(class).or_default();
        bucket.available += returned_amount;
    }

    pub fn available(&self, class: OpportunityClass) -> Decimal {
        self.inner.lock().buckets.get(&class).map(|b| b.available).unwrap_or(Decimal::ZERO)
    }

    /// Shift capital between classes proportional to recent realized returns, bounded by
    /// `min_share`/`max_share` (§4.4). Classes with positive realized returns gain share at
    /// the expense of classes with flat or negative returns, never crossing either bound.
    pub fn rebalance(&self) {
        let mut inner = self.inner.lock();
        let total: Decimal = inner.buckets.values().map(|b| b.allocated_total).sum();
        if total.is_zero() {
            return;
        }

        let total_return: Decimal = inner.recent_returns.values().copied().sum();
        if total_return.is_zero() {
            inner.recent_returns.clear();
            return;
        }

        let classes: Vec<OpportunityClass> = inner.buckets.keys().copied().collect();
        let mut new_totals = HashMap::new();
        for class in &classes {
            let current_share = inner.buckets[class].allocated_total / total;
            let ret = *inner.recent_returns.get(class).unwrap_or(&Decimal::ZERO);
            let nudge = (ret / total_return.abs().max(Decimal::new(1, 6))) * Decimal::new(5, 2); // up to 5% shift
            let new_share = (current_share + nudge).clamp(self.min_share, self.max_share);
            new_totals.insert(*class, new_share);
        }

        let share_sum: Decimal = new_totals.values().copied().sum();
        for class in &classes {
            let normalized_share = new_totals[class] / share_sum;
            let bucket = inner.buckets.get_mut(class).unwrap();
            let delta = total * normalized_share - bucket.allocated_total;
            bucket.allocated_total += delta;
            bucket.available += delta;
        }
        inner.recent_returns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn allocator() -> FundAllocator {
        let mut allocation = HashMap::new();
        allocation.insert(OpportunityClass::CrossExchange, dec!(0.6));
        allocation.insert(OpportunityClass::Triangular, dec!(0.4));
        FundAllocator::new(dec!(10000), allocation, dec!(0.2), dec!(0.8))
    }

    #[test]
    fn reserve_then_release_returns_capital_with_pnl() {
        let fa = allocator();
        let before = fa.available(OpportunityClass::Triangular);
        let token = fa.reserve(OpportunityClass::Triangular, dec!(1000)).unwrap();
        assert_eq!(fa.available(OpportunityClass::Triangular), before - dec!(1000));

        fa.release(token, dec!(1018.95));
        assert_eq!(fa.available(OpportunityClass::Triangular), before + dec!(18.95));
    }

    #[test]
    fn zero_capital_class_rejects_any_positive_reserve() {
        let mut allocation = HashMap::new();
        allocation.insert(OpportunityClass::CrossExchange, dec!(0));
        let fa = FundAllocator::new(dec!(0), allocation, dec!(0.2), dec!(0.8));
        let err = fa.reserve(OpportunityClass::CrossExchange, dec!(0.01)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientFunds);
    }

    #[test]
    fn reserved_capital_released_equals_initial_plus_pnl_invariant() {
        let fa = allocator();
        let reserved = dec!(500);
        let token = fa.reserve(OpportunityClass::CrossExchange, reserved).unwrap();
        let realized_pnl = dec!(-12.5);
        let returned = reserved + realized_pnl;
        let before = fa.available(OpportunityClass::CrossExchange) + reserved;
        fa.release(token, returned);
        assert_eq!(fa.available(OpportunityClass::CrossExchange), before + realized_pnl);
    }
}
