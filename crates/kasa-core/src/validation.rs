//! # Validation Module
//!
//! Field-level rules used by the request types in [`crate::request`].
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP boundary (api-server)                                   │
//! │  ├── JSON shape, decimal → cents conversion                            │
//! │  └── Out-of-range amounts                                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Request types (kasa-core)                                    │
//! │  ├── THIS MODULE: per-field rules                                      │
//! │  └── Every violated rule collected, not just the first                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Store                                                        │
//! │  ├── NOT NULL / UNIQUE constraints                                     │
//! │  └── Reported as StoreError::Rejected                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every checker takes the error list and pushes onto it instead of
//! returning early, so callers can run all of them and report everything.

use crate::error::{ValidationError, ValidationErrors};
use crate::money::Money;

/// Pushes `Required` when `value` is empty after trimming.
pub fn check_required(errors: &mut ValidationErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError::required(field));
    }
}

/// Pushes `MustBePositive` when `qty <= 0`.
///
/// ## Example
/// ```rust
/// use kasa_core::validation::check_positive_quantity;
/// use kasa_core::ValidationErrors;
///
/// let mut errors = ValidationErrors::new();
/// check_positive_quantity(&mut errors, "quantity", 0);
/// assert_eq!(errors.to_string(), "quantity must be greater than zero");
/// ```
pub fn check_positive_quantity(errors: &mut ValidationErrors, field: &str, qty: i64) {
    if qty <= 0 {
        errors.push(ValidationError::must_be_positive(field));
    }
}

/// Pushes `MustBeNonNegative` when `qty < 0`.
pub fn check_non_negative_quantity(errors: &mut ValidationErrors, field: &str, qty: i64) {
    if qty < 0 {
        errors.push(ValidationError::must_be_non_negative(field));
    }
}

/// Pushes `MustBePositive` when `amount <= 0`.
pub fn check_positive_amount(errors: &mut ValidationErrors, field: &str, amount: Money) {
    if !amount.is_positive() {
        errors.push(ValidationError::must_be_positive(field));
    }
}

/// Pushes `MustBeNonNegative` when `amount < 0`.
pub fn check_non_negative_amount(errors: &mut ValidationErrors, field: &str, amount: Money) {
    if amount.is_negative() {
        errors.push(ValidationError::must_be_non_negative(field));
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
