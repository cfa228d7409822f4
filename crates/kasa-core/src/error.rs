//! # Error Types
//!
//! Domain-specific error types for kasa-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kasa-core errors (this file)                                          │
//! │  ├── CoreError         - Business rule violations                      │
//! │  ├── ValidationErrors  - Every violated input rule, collected          │
//! │  └── ValidationError   - One violated input rule                       │
//! │                                                                         │
//! │  kasa-db errors                                                        │
//! │  └── StoreError        - Unavailable / Rejected / Timeout / Decode     │
//! │                                                                         │
//! │  kasa-engine errors                                                    │
//! │  └── EngineError       - Wraps both, adds saga + catalog kinds         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → ApiError → client   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations detected without touching the store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input failed one or more validation rules.
    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    /// Not enough stock to cover the requested quantity.
    ///
    /// ## When This Occurs
    /// ```text
    /// Sale request: "001" × 3
    ///      │
    ///      ▼
    /// Preflight: quantity on hand = 2
    ///      │
    ///      ▼
    /// InsufficientStock { barcode: "001", available: 2, requested: 3 }
    ///      │
    ///      ▼
    /// Nothing written. Client shows "Insufficient stock".
    /// ```
    #[error("Insufficient stock for {barcode}: available {available}, requested {requested}")]
    InsufficientStock {
        barcode: String,
        available: i64,
        requested: i64,
    },

    /// `open` called on a till that is already open.
    #[error("Cash register is already open")]
    AlreadyOpen,

    /// `close` called on a till that is already closed.
    #[error("Cash register is already closed")]
    AlreadyClosed,
}

// =============================================================================
// Validation Error
// =============================================================================

/// A single violated input rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be strictly greater than zero.
    #[error("{field} must be greater than zero")]
    MustBePositive { field: String },

    /// Value must be zero or greater.
    #[error("{field} cannot be negative")]
    MustBeNonNegative { field: String },

    /// Value is not in the allowed set.
    #[error("{field} must be one of: {}", .allowed.join(", "))]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Value is outside what the engine can represent.
    #[error("{field} is out of range")]
    OutOfRange { field: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required { field: field.into() }
    }

    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive { field: field.into() }
    }

    pub fn must_be_non_negative(field: impl Into<String>) -> Self {
        ValidationError::MustBeNonNegative { field: field.into() }
    }

    pub fn out_of_range(field: impl Into<String>) -> Self {
        ValidationError::OutOfRange { field: field.into() }
    }
}

/// Every violated rule for one request.
///
/// Displayed as the individual messages joined with `"; "`, so a client sees
/// all problems with a sale at once instead of fixing them one by one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn new() -> Self {
        ValidationErrors(Vec::new())
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    /// Messages for each violated rule, in the order they were found.
    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }

    /// `Ok(value)` when nothing was collected, otherwise `Err(self)`.
    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        ValidationErrors(vec![error])
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
