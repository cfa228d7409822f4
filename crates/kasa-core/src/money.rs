//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  A till that sums floats drifts:                                        │
//! │    0.1 + 0.2 = 0.30000000000000004                                      │
//! │                                                                         │
//! │  Kasa keeps every amount as integer cents (kuruş) inside the engine.   │
//! │  The HTTP layer accepts decimal numbers and converts them ONCE:         │
//! │                                                                         │
//! │    JSON 12.345 ──► Decimal ──► round half away from zero ──► 1235 ¢    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kasa_core::money::Money;
//!
//! let price = Money::from_cents(500);
//! let line_total = price.multiply_quantity(3);
//! assert_eq!(line_total.cents(), 1500);
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Where Money is Used
/// ```text
/// Product.price_cents ──► SaleLine.unit_price_cents ──► Sale.total_cents
///                                                           │
///                          TillState.current_amount ◄───────┘ (cash sales)
///                                   │
///                                   ▼
///                  CloseSummary { expected_cash, actual_amount, difference }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use kasa_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Converts a decimal amount (as received on the wire) to cents.
    ///
    /// Rounds half away from zero to two places. Returns `None` when the
    /// amount does not fit in an i64 number of cents.
    ///
    /// ## Example
    /// ```rust
    /// use kasa_core::money::Money;
    /// use rust_decimal::Decimal;
    ///
    /// let amount = Decimal::new(12345, 3); // 12.345
    /// assert_eq!(Money::from_decimal(amount).unwrap().cents(), 1235);
    /// ```
    pub fn from_decimal(amount: Decimal) -> Option<Self> {
        amount
            .checked_mul(Decimal::ONE_HUNDRED)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Money)
    }

    /// Returns the amount as a two-place decimal (for JSON responses).
    #[inline]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is strictly greater than zero.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use kasa_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows money as `major.minor` without a currency symbol.
///
/// Used in audit and cash-transaction descriptions.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
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
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

/// Summing an iterator of amounts (sale totals for reconciliation).
impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Rate (basis points)
// =============================================================================

/// A percentage rate stored in basis points (1800 = 18%).
///
/// Used for the VAT and excise rates carried on a product. The wire format
/// is a percentage number; the store keeps the integer basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Converts a percentage (e.g. `18` or `8.25`) to basis points.
    ///
    /// Returns `None` for negative or out-of-range values.
    pub fn from_percent(percent: Decimal) -> Option<Self> {
        if percent.is_sign_negative() && !percent.is_zero() {
            return None;
        }
        percent
            .checked_mul(Decimal::ONE_HUNDRED)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_u32()
            .map(Rate)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage decimal (for JSON responses).
    #[inline]
    pub fn percent(&self) -> Decimal {
        Decimal::new(self.0 as i64, 2)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-5.50");
        assert_eq!(format!("{}", Money::zero()), "0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);

        let mut running = Money::zero();
        running += a;
        running -= b;
        assert_eq!(running.cents(), 500);
    }

    #[test]
    fn test_sum_of_totals() {
        let totals = vec![
            Money::from_cents(5000),
            Money::from_cents(1250),
            Money::from_cents(75),
        ];
        let sum: Money = totals.into_iter().sum();
        assert_eq!(sum.cents(), 6325);
    }

    #[test]
    fn test_from_decimal_rounds_half_away_from_zero() {
        let d = |s: &str| Decimal::from_str(s).unwrap();

        assert_eq!(Money::from_decimal(d("15")).unwrap().cents(), 1500);
        assert_eq!(Money::from_decimal(d("0.1")).unwrap().cents(), 10);
        assert_eq!(Money::from_decimal(d("2.345")).unwrap().cents(), 235);
        assert_eq!(Money::from_decimal(d("-2.345")).unwrap().cents(), -235);
        assert_eq!(Money::from_decimal(d("2.344")).unwrap().cents(), 234);
    }

    #[test]
    fn test_decimal_roundtrip_keeps_two_places() {
        let money = Money::from_cents(14550);
        assert_eq!(money.to_decimal().to_string(), "145.50");
    }

    #[test]
    fn test_rate_from_percent() {
        let d = |s: &str| Decimal::from_str(s).unwrap();

        assert_eq!(Rate::from_percent(d("18")).unwrap().bps(), 1800);
        assert_eq!(Rate::from_percent(d("8.25")).unwrap().bps(), 825);
        assert_eq!(Rate::from_percent(d("0")).unwrap().bps(), 0);
        assert!(Rate::from_percent(d("-1")).is_none());
        assert_eq!(Rate::from_bps(1800).percent().to_string(), "18.00");
    }

    #[test]
    fn test_sign_checks() {
        assert!(Money::zero().is_zero());
        assert!(Money::from_cents(1).is_positive());
        assert!(Money::from_cents(-1).is_negative());
        assert_eq!(Money::from_cents(-550).abs().cents(), 550);
    }
}
