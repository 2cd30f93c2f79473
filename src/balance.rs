// =============================================================================
// Balance Provider
// =============================================================================
//
// Three atomic operations on a process-lived ledger (spec §4.7). The
// `available + used = total` invariant is checked after every mutation; a
// violation is a fatal `BalanceCorruption`, matching the risk engine's
// "kill switch" posture in the teacher's `risk.rs`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub available: Money,
    pub used: Money,
    pub total: Money,
}

struct Inner {
    available: Money,
    used: Money,
}

pub struct BalanceProvider {
    inner: Mutex<Inner>,
}

impl BalanceProvider {
    pub fn new(starting_balance: Money) -> Self {
        Self { inner: Mutex::new(Inner { available: starting_balance, used: Money::ZERO }) }
    }

    fn check_invariant(available: Money, used: Money) -> Result<(), EngineError> {
        if available.is_negative() || used.is_negative() {
            return Err(EngineError::BalanceCorruption(format!(
                "negative component: available={available} used={used}"
            )));
        }
        Ok(())
    }

    pub fn debit(&self, amount: Money) -> Result<BalanceSnapshot, EngineError> {
        let mut inner = self.inner.lock();
        if inner.available < amount {
            return Err(EngineError::InsufficientFunds {
                requested: amount.to_string(),
                available: inner.available.to_string(),
            });
        }
        inner.available = inner.available - amount;
        inner.used = inner.used + amount;
        Self::check_invariant(inner.available, inner.used)?;
        Ok(self.snapshot_locked(&inner))
    }

    /// `used >= amount` releases that much back to `available`. Any excess
    /// (`amount > used`) is realised profit: `available += amount - used;
    /// used = 0`.
    pub fn credit(&self, amount: Money) -> Result<BalanceSnapshot, EngineError> {
        let mut inner = self.inner.lock();
        if amount.as_decimal() > inner.used.as_decimal() {
            let profit = amount - inner.used;
            inner.available = inner.available + profit;
            inner.used = Money::ZERO;
        } else {
            inner.used = inner.used - amount;
            inner.available = inner.available + amount;
        }
        Self::check_invariant(inner.available, inner.used)?;
        Ok(self.snapshot_locked(&inner))
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        let inner = self.inner.lock();
        self.snapshot_locked(&inner)
    }

    fn snapshot_locked(&self, inner: &Inner) -> BalanceSnapshot {
        BalanceSnapshot { available: inner.available, used: inner.used, total: inner.available + inner.used }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_then_credit_restores_available() {
        let b = BalanceProvider::new(Money::from_f64(100_000.0));
        b.debit(Money::from_f64(5_000.0)).unwrap();
        let snap = b.credit(Money::from_f64(5_000.0)).unwrap();
        assert_eq!(snap.available, Money::from_f64(100_000.0));
        assert_eq!(snap.used, Money::ZERO);
        assert_eq!(snap.total, snap.available + snap.used);
    }

    #[test]
    fn debit_beyond_available_fails() {
        let b = BalanceProvider::new(Money::from_f64(100.0));
        let err = b.debit(Money::from_f64(200.0)).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
    }

    #[test]
    fn credit_excess_is_profit() {
        let b = BalanceProvider::new(Money::from_f64(10_000.0));
        b.debit(Money::from_f64(5_000.0)).unwrap();
        // sold for more than cost basis -> profit flows straight to available
        let snap = b.credit(Money::from_f64(6_000.0)).unwrap();
        assert_eq!(snap.used, Money::ZERO);
        assert_eq!(snap.available, Money::from_f64(11_000.0));
    }

    #[test]
    fn invariant_holds_across_sequence() {
        let b = BalanceProvider::new(Money::from_f64(200_000.0));
        b.debit(Money::from_f64(50_000.0)).unwrap();
        b.debit(Money::from_f64(20_000.0)).unwrap();
        let snap = b.credit(Money::from_f64(30_000.0)).unwrap();
        assert_eq!(snap.total, Money::from_f64(200_000.0));
        assert!(!snap.available.is_negative());
        assert!(!snap.used.is_negative());
    }
}
