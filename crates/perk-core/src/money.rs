//! # Money Module
//!
//! Integer-cent money and basis-point percentages used by every discount
//! calculation.
//!
//! ## Rounding
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  HALF-UP ROUNDING ON CENTS                                              │
//! │                                                                         │
//! │  20% of $12.345 is never computed: prices are already whole cents.     │
//! │                                                                         │
//! │  percent_of:  (cents × bps + 5000) / 10000                             │
//! │                                                                         │
//! │    $10.01 × 12.5%  = 125.125 cents → 125 cents ($1.25)                 │
//! │    $10.04 × 12.5%  = 125.5   cents → 126 cents ($1.26)  (half-up)      │
//! │                                                                         │
//! │  Every amount leaving perk-core is already rounded to the cent.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use perk_core::money::{Money, PercentRate};
//!
//! let subtotal = Money::from_cents(5000); // $50.00
//! let discount = subtotal.percent_of(PercentRate::from_bps(2000)); // 20%
//! assert_eq!(discount.cents(), 1000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents.
///
/// ## Where Money Flows
/// ```text
/// CartItem.unit_price × quantity ──► reward basis ──► RewardCalculator
///                                                         │
/// Coupon.min_purchase ──► condition check                 ▼
///                                              CouponApplication.discount
/// Transaction.total ──► AttributionReport.revenue
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole dollars.
    ///
    /// ```rust
    /// use perk_core::money::Money;
    ///
    /// assert_eq!(Money::from_dollars(25).cents(), 2500);
    /// ```
    #[inline]
    pub const fn from_dollars(dollars: i64) -> Self {
        Money(dollars.saturating_mul(100))
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-dollar portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is greater than zero.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Multiplies a unit price by a quantity, saturating at the i64 bounds.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }

    /// Returns `rate` of this amount, rounded half-up to the cent.
    ///
    /// ## Example
    /// ```rust
    /// use perk_core::money::{Money, PercentRate};
    ///
    /// let price = Money::from_cents(1004);
    /// let off = price.percent_of(PercentRate::from_bps(1250)); // 12.5%
    /// assert_eq!(off.cents(), 126); // 125.5 rounds up
    /// ```
    pub fn percent_of(&self, rate: PercentRate) -> Money {
        // i128 keeps large subtotals × 10000 from overflowing
        let raw = self.0 as i128 * rate.bps() as i128;
        let rounded = if raw >= 0 {
            (raw + 5000) / 10000
        } else {
            (raw - 5000) / 10000
        };
        Money::from_cents(rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }

    /// Clamps the value into `[low, high]`.
    ///
    /// When `high < low` (e.g. a negative subtotal) the result is `low`.
    pub fn clamp_to(self, low: Money, high: Money) -> Money {
        if high < low {
            return low;
        }
        self.max(low).min(high)
    }
}

// =============================================================================
// Percent Rate
// =============================================================================

/// A percentage in basis points: 2000 = 20%, 1250 = 12.5%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PercentRate(u32);

impl PercentRate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        PercentRate(bps)
    }

    /// Creates a rate from a whole percentage.
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        PercentRate(pct.saturating_mul(100))
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Renders as `$10.99`, the format used in coupon descriptions.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        self.multiply_quantity(qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "$10.99");
        assert_eq!(Money::from_cents(2500).to_string(), "$25.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-$5.50");
        assert_eq!(Money::zero().to_string(), "$0.00");
    }

    #[test]
    fn test_percent_of_rounds_half_up() {
        let price = Money::from_cents(1004);
        assert_eq!(price.percent_of(PercentRate::from_bps(1250)).cents(), 126);

        let price = Money::from_cents(1001);
        assert_eq!(price.percent_of(PercentRate::from_bps(1250)).cents(), 125);

        // 20% of $50.00
        let subtotal = Money::from_dollars(50);
        assert_eq!(subtotal.percent_of(PercentRate::from_percent(20)).cents(), 1000);
    }

    #[test]
    fn test_percent_of_large_amount_does_not_overflow() {
        let big = Money::from_cents(i64::MAX / 10);
        let half = big.percent_of(PercentRate::from_percent(50));
        assert!(half.is_positive());
    }

    #[test]
    fn test_clamp_to() {
        let upper = Money::from_cents(500);
        assert_eq!(Money::from_cents(700).clamp_to(Money::zero(), upper), upper);
        assert_eq!(Money::from_cents(-5).clamp_to(Money::zero(), upper), Money::zero());
        assert_eq!(
            Money::from_cents(300).clamp_to(Money::zero(), upper),
            Money::from_cents(300)
        );
        assert_eq!(
            Money::from_cents(300).clamp_to(Money::zero(), Money::from_cents(-1)),
            Money::zero()
        );
    }

    #[test]
    fn test_sum() {
        let amounts = [Money::from_cents(100), Money::from_cents(250)];
        let total: Money = amounts.iter().sum();
        assert_eq!(total.cents(), 350);
    }

    #[test]
    fn test_arithmetic_saturates() {
        let max = Money::from_cents(i64::MAX);
        assert_eq!(max + Money::from_cents(1), max);
        assert_eq!(Money::from_cents(i64::MIN) - Money::from_cents(1), Money::from_cents(i64::MIN));
        assert_eq!(max.multiply_quantity(3), max);
        assert_eq!(Money::from_cents(-2) * i64::MAX, Money::from_cents(i64::MIN));

        let mut total = max;
        total += max;
        assert_eq!(total, max);
        assert_eq!([max, max].iter().sum::<Money>(), max);
        assert_eq!(Money::from_dollars(i64::MAX), max);
        assert_eq!(max.percent_of(PercentRate::from_percent(200)), max);
    }
}
