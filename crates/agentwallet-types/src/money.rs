//! Monetary amounts
//!
//! All balances, limits and transaction amounts are non-negative decimals
//! with a fixed scale of 2. `Money` enforces both invariants at the
//! boundary so the engine never has to re-check them.

use crate::{Result, WalletError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// Fixed decimal scale for all monetary values
pub const MONEY_SCALE: u32 = 2;

/// A non-negative amount of money at scale 2
///
/// Deserialization routes through [`Money::new`], so negative or overscaled
/// values are rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl TryFrom<Decimal> for Money {
    type Error = WalletError;

    fn try_from(value: Decimal) -> Result<Self> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Money {
    /// Construct from a decimal, rejecting negatives and rescaling to 2
    pub fn new(value: Decimal) -> Result<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(WalletError::NegativeAmount {
                value: value.to_string(),
            });
        }
        Ok(Self(value.round_dp_with_strategy(
            MONEY_SCALE,
            RoundingStrategy::MidpointNearestEven,
        )))
    }

    /// Zero at scale 2
    pub fn zero() -> Self {
        Self(Decimal::new(0, MONEY_SCALE))
    }

    /// Construct from whole currency units (e.g. dollars)
    pub fn from_major(units: u64) -> Self {
        Self(Decimal::new(units as i64 * 100, MONEY_SCALE))
    }

    /// Construct from minor units (e.g. cents)
    pub fn from_minor(minor: u64) -> Self {
        Self(Decimal::new(minor as i64, MONEY_SCALE))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> Result<Self> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(WalletError::AmountOverflow)
    }

    /// Checked subtraction, failing when the result would go negative
    pub fn checked_sub(self, other: Self) -> Result<Self> {
        let value = self
            .0
            .checked_sub(other.0)
            .ok_or(WalletError::AmountOverflow)?;
        if value.is_sign_negative() {
            return Err(WalletError::AmountUnderflow);
        }
        Ok(Self(value))
    }

    /// Multiply by a non-negative ratio, rounding back to scale 2
    ///
    /// Used for throttle factors and spawn-policy ratios.
    pub fn scaled(self, ratio: Decimal) -> Result<Self> {
        if ratio.is_sign_negative() {
            return Err(WalletError::NegativeAmount {
                value: ratio.to_string(),
            });
        }
        let value = self
            .0
            .checked_mul(ratio)
            .ok_or(WalletError::AmountOverflow)?;
        Money::new(value)
    }

    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Lossy f64 view, for log fields only
    pub fn to_f64_lossy(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::NAN)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| {
            acc.checked_add(m).unwrap_or(Money(Decimal::MAX))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rejects_negative() {
        assert!(matches!(
            Money::new(dec!(-0.01)),
            Err(WalletError::NegativeAmount { .. })
        ));
    }

    #[test]
    fn test_rescales_to_two_places() {
        let m = Money::new(dec!(1.005)).unwrap();
        assert_eq!(m.as_decimal(), dec!(1.00));

        let m = Money::new(dec!(2.675)).unwrap();
        assert_eq!(m.as_decimal(), dec!(2.68));
    }

    #[test]
    fn test_checked_sub_underflow() {
        let a = Money::from_major(10);
        let b = Money::from_major(20);
        assert!(matches!(
            a.checked_sub(b),
            Err(WalletError::AmountUnderflow)
        ));
        assert_eq!(b.checked_sub(a).unwrap(), Money::from_major(10));
    }

    #[test]
    fn test_scaled() {
        let m = Money::from_major(1000);
        assert_eq!(m.scaled(dec!(0.5)).unwrap(), Money::from_major(500));
        assert_eq!(m.scaled(dec!(0.1)).unwrap(), Money::from_major(100));
    }

    #[test]
    fn test_serde_rejects_negative() {
        let ok: Money = serde_json::from_str("\"12.34\"").unwrap();
        assert_eq!(ok, Money::from_minor(1234));
        assert!(serde_json::from_str::<Money>("\"-1\"").is_err());
    }

    #[test]
    fn test_sum() {
        let total: Money = vec![Money::from_major(1), Money::from_minor(250)]
            .into_iter()
            .sum();
        assert_eq!(total, Money::from_minor(350));
    }
}
