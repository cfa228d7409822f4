//! # Reconciliation Arithmetic
//!
//! The pure half of close-out: given the till's opening balance and the cash
//! sales recorded since it opened, what should be in the drawer?
//!
//! ```text
//! expected_cash = opening_balance + Σ total(sale) where sale.payment = cash
//!                                                 and sale.date ≥ since
//! difference    = actual_amount − expected_cash        (negative = short)
//! ```
//!
//! Card sales never touch the drawer; they are summed separately for the
//! status view only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{PaymentMethod, Sale};

/// Sums sale totals for one payment method.
pub fn sum_sales(sales: &[Sale], method: PaymentMethod) -> Money {
    sales
        .iter()
        .filter(|sale| sale.payment_method == method)
        .map(Sale::total)
        .sum()
}

/// `opening_balance + cash_sales`.
#[inline]
pub fn expected_cash(opening_balance: Money, cash_sales: Money) -> Money {
    opening_balance + cash_sales
}

/// Returned by till close-out. The difference is reported, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CloseSummary {
    pub opening_balance: Money,
    pub cash_sales_total: Money,
    pub expected_cash: Money,
    pub actual_amount: Money,
    pub difference: Money,
}

impl CloseSummary {
    pub fn compute(opening_balance: Money, cash_sales_total: Money, actual_amount: Money) -> Self {
        let expected = expected_cash(opening_balance, cash_sales_total);
        CloseSummary {
            opening_balance,
            cash_sales_total,
            expected_cash: expected,
            actual_amount,
            difference: actual_amount - expected,
        }
    }
}

/// Read-only composite of the till row and today's sale aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TillStatus {
    pub is_open: bool,
    pub current_amount: Money,
    pub opening_balance: Money,
    #[ts(as = "Option<String>")]
    pub opening_time: Option<DateTime<Utc>>,
    pub cash_sales_today: Money,
    pub card_sales_today: Money,
    pub expected_cash: Money,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sale(total: i64, method: PaymentMethod) -> Sale {
        Sale {
            id: None,
            request_id: None,
            total_cents: total,
            payment_method: method,
            cash_amount_cents: if method == PaymentMethod::Cash { total } else { 0 },
            card_amount_cents: if method == PaymentMethod::Card { total } else { 0 },
            change_amount_cents: 0,
            user_id: 1,
            sale_date: Utc.with_ymd_and_hms(2026, 10, 15, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_open_100_cash_50_card_30_close_145() {
        let sales = vec![
            sale(5000, PaymentMethod::Cash),
            sale(3000, PaymentMethod::Card),
        ];
        let cash = sum_sales(&sales, PaymentMethod::Cash);
        let card = sum_sales(&sales, PaymentMethod::Card);
        assert_eq!(cash.cents(), 5000);
        assert_eq!(card.cents(), 3000);

        let summary = CloseSummary::compute(Money::from_cents(10000), cash, Money::from_cents(14500));
        assert_eq!(summary.expected_cash.cents(), 15000);
        assert_eq!(summary.difference.cents(), -500);
    }

    #[test]
    fn test_over_count_is_positive_difference() {
        let summary = CloseSummary::compute(Money::zero(), Money::from_cents(1000), Money::from_cents(1200));
        assert_eq!(summary.difference.cents(), 200);
    }

    #[test]
    fn test_no_sales_sums_to_zero() {
        assert!(sum_sales(&[], PaymentMethod::Cash).is_zero());
    }
}
