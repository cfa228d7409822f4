//! # Requests
//!
//! Inputs to the engine's mutating operations, each with a `validate` method
//! that either yields a typed, checked value or every violated rule.
//!
//! ```text
//! SaleRequest ──validate()──► ValidatedSale        (payment method parsed)
//! ProductDraft ─validate()──► Product              (record ready to insert)
//! ProductPatch ─validate()──► ProductPatch         (only present fields checked)
//! StockAddRequest ─validate()► StockAddRequest
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationErrors};
use crate::money::{Money, Rate};
use crate::types::{PaymentMethod, Product};
use crate::validation::{
    check_non_negative_amount, check_non_negative_quantity, check_positive_amount,
    check_positive_quantity, check_required,
};

// =============================================================================
// Sale
// =============================================================================

/// One requested sale line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLineRequest {
    pub barcode: String,
    /// Name shown on the till; stored as the line's name snapshot.
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
}

/// A sale as submitted by the till, before any checks.
///
/// `payment_method` stays a string here so an unknown value is reported
/// alongside every other problem instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRequest {
    pub lines: Vec<SaleLineRequest>,
    pub total: Money,
    pub payment_method: String,
    pub cash_amount: Money,
    pub card_amount: Money,
    pub change_amount: Money,
}

/// A structurally valid sale.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSale {
    pub lines: Vec<SaleLineRequest>,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub cash_amount: Money,
    pub card_amount: Money,
    pub change_amount: Money,
}

impl ValidatedSale {
    /// Whether the till must book this sale's cash effect.
    pub fn books_cash(&self) -> bool {
        self.payment_method == PaymentMethod::Cash && self.cash_amount.is_positive()
    }

    /// Requested quantity per barcode, in first-seen order.
    ///
    /// A barcode appearing on several lines is checked against stock once
    /// with the summed quantity. `validate` has already rejected sums that
    /// overflow.
    pub fn quantities_by_barcode(&self) -> Vec<(String, i64)> {
        let mut totals: Vec<(String, i64)> = Vec::new();
        for line in &self.lines {
            match totals.iter_mut().find(|(barcode, _)| *barcode == line.barcode) {
                Some((_, qty)) => *qty = qty.saturating_add(line.quantity),
                None => totals.push((line.barcode.clone(), line.quantity)),
            }
        }
        totals
    }
}

impl SaleRequest {
    /// Checks every structural rule and reports all violations together.
    ///
    /// ## Rules
    /// - at least one line
    /// - `total > 0`
    /// - payment method is `cash` or `card`
    /// - each line has a barcode and `quantity > 0`, `unit_price >= 0`
    /// - the summed quantity per barcode fits in an `i64`
    /// - `cash_amount`, `card_amount`, `change_amount` are `>= 0`
    ///
    /// ## Example
    /// ```rust
    /// use kasa_core::request::SaleRequest;
    /// use kasa_core::Money;
    ///
    /// let request = SaleRequest {
    ///     lines: vec![],
    ///     total: Money::zero(),
    ///     payment_method: "cheque".to_string(),
    ///     cash_amount: Money::zero(),
    ///     card_amount: Money::zero(),
    ///     change_amount: Money::zero(),
    /// };
    /// let errors = request.validate().unwrap_err();
    /// assert_eq!(errors.len(), 3);
    /// ```
    pub fn validate(self) -> Result<ValidatedSale, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.lines.is_empty() {
            errors.push(ValidationError::required("items"));
        }
        check_positive_amount(&mut errors, "total", self.total);

        let payment_method = match self.payment_method.parse::<PaymentMethod>() {
            Ok(method) => Some(method),
            Err(_) => {
                errors.push(ValidationError::NotAllowed {
                    field: "payment_method".to_string(),
                    allowed: PaymentMethod::ALLOWED.iter().map(|s| s.to_string()).collect(),
                });
                None
            }
        };

        let mut summed: Vec<(&str, i64)> = Vec::new();
        for (index, line) in self.lines.iter().enumerate() {
            let quantity_field = format!("items[{}].quantity", index);
            check_required(&mut errors, &format!("items[{}].barcode", index), &line.barcode);
            check_positive_quantity(&mut errors, &quantity_field, line.quantity);
            check_non_negative_amount(&mut errors, &format!("items[{}].price", index), line.unit_price);

            match summed.iter_mut().find(|(barcode, _)| *barcode == line.barcode) {
                Some((_, qty)) => match qty.checked_add(line.quantity) {
                    Some(total) => *qty = total,
                    None => errors.push(ValidationError::out_of_range(quantity_field)),
                },
                None => summed.push((line.barcode.as_str(), line.quantity)),
            }
        }

        check_non_negative_amount(&mut errors, "cash_amount", self.cash_amount);
        check_non_negative_amount(&mut errors, "credit_card_amount", self.card_amount);
        check_non_negative_amount(&mut errors, "change_amount", self.change_amount);

        match payment_method {
            Some(payment_method) if errors.is_empty() => Ok(ValidatedSale {
                lines: self.lines,
                total: self.total,
                payment_method,
                cash_amount: self.cash_amount,
                card_amount: self.card_amount,
                change_amount: self.change_amount,
            }),
            _ => Err(errors),
        }
    }
}

// =============================================================================
// Products
// =============================================================================

/// A new product as submitted by the back office.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub barcode: String,
    pub name: String,
    pub price: Money,
    pub quantity: i64,
    pub vat_rate: Rate,
    pub excise_rate: Rate,
    pub min_stock_level: i64,
}

impl ProductDraft {
    /// Validates the draft and builds the product record (without an id).
    ///
    /// The record's quantity is the draft's initial quantity; the Inventory
    /// Ledger decides how it lands in the store.
    pub fn validate(self, now: DateTime<Utc>) -> Result<Product, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        check_required(&mut errors, "barcode", &self.barcode);
        check_required(&mut errors, "name", &self.name);
        check_non_negative_quantity(&mut errors, "quantity", self.quantity);
        check_non_negative_amount(&mut errors, "price", self.price);
        check_non_negative_quantity(&mut errors, "min_stock_level", self.min_stock_level);

        errors.into_result(Product {
            id: None,
            barcode: self.barcode.trim().to_string(),
            name: self.name.trim().to_string(),
            price_cents: self.price.cents(),
            quantity: self.quantity,
            vat_rate_bps: self.vat_rate.bps(),
            excise_rate_bps: self.excise_rate.bps(),
            min_stock_level: self.min_stock_level,
            created_at: now,
            updated_at: None,
        })
    }
}

/// A partial product update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub price: Option<Money>,
    pub quantity: Option<i64>,
    pub vat_rate: Option<Rate>,
    pub excise_rate: Option<Rate>,
    pub min_stock_level: Option<i64>,
}

impl ProductPatch {
    pub fn validate(self) -> Result<ProductPatch, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(name) = &self.name {
            check_required(&mut errors, "name", name);
        }
        if let Some(price) = self.price {
            check_non_negative_amount(&mut errors, "price", price);
        }
        if let Some(quantity) = self.quantity {
            check_non_negative_quantity(&mut errors, "quantity", quantity);
        }
        if let Some(level) = self.min_stock_level {
            check_non_negative_quantity(&mut errors, "min_stock_level", level);
        }

        errors.into_result(self)
    }

    /// Whether any non-quantity field is present.
    pub fn touches_details(&self) -> bool {
        self.name.is_some()
            || self.price.is_some()
            || self.vat_rate.is_some()
            || self.excise_rate.is_some()
            || self.min_stock_level.is_some()
    }
}

// =============================================================================
// Stock Add
// =============================================================================

/// Goods received for a barcode. Name and price are needed only when the
/// barcode is not yet in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAddRequest {
    pub barcode: String,
    pub quantity: i64,
    pub name: Option<String>,
    pub price: Option<Money>,
    pub vat_rate: Option<Rate>,
    pub excise_rate: Option<Rate>,
    pub min_stock_level: Option<i64>,
}

impl StockAddRequest {
    pub fn validate(self) -> Result<StockAddRequest, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        check_required(&mut errors, "barcode", &self.barcode);
        check_positive_quantity(&mut errors, "quantity", self.quantity);
        if let Some(price) = self.price {
            check_non_negative_amount(&mut errors, "price", price);
        }
        if let Some(level) = self.min_stock_level {
            check_non_negative_quantity(&mut errors, "min_stock_level", level);
        }

        errors.into_result(StockAddRequest {
            barcode: self.barcode.trim().to_string(),
            ..self
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
