//! # Engine Errors
//!
//! One taxonomy for every workflow. Preflight-stage kinds leave no trace in
//! the store; [`EngineError::PartialSaleFailure`] means real writes happened
//! and were not undone.
//!
//! ## Classification
//! ```text
//! ┌──────────────────────────┬──────────────┬───────────────────────────┐
//! │ Kind                     │ Side effects │ Typical cause             │
//! ├──────────────────────────┼──────────────┼───────────────────────────┤
//! │ Core(Validation)         │ none         │ bad input                 │
//! │ Core(InsufficientStock)  │ none         │ preflight                 │
//! │ Core(AlreadyOpen/Closed) │ none         │ till state                │
//! │ ProductNotFound          │ none         │ unknown barcode           │
//! │ MissingProductFields     │ none         │ stock add of new barcode  │
//! │ DuplicateBarcode         │ none         │ product create            │
//! │ ProductInUse             │ none         │ delete of sold product    │
//! │ InvalidCredentials       │ none         │ login                     │
//! │ StockContention          │ none         │ CAS lost 5 times          │
//! │ StoreUnavailable         │ maybe        │ backend down after retry  │
//! │ PartialSaleFailure       │ YES          │ failure mid-saga          │
//! └──────────────────────────┴──────────────┴───────────────────────────┘
//! ```

use std::fmt;

use kasa_core::CoreError;
use kasa_db::StoreError;
use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

/// Engine workflow errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Creating a product through a stock add needs a name and a price.
    #[error("Product {barcode} does not exist; name and price are required to create it")]
    MissingProductFields { barcode: String },

    #[error("A product with barcode {0} already exists")]
    DuplicateBarcode(String),

    #[error("Product {0} appears on recorded sales and cannot be deleted")]
    ProductInUse(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    /// The compare-and-set on a product's quantity kept losing to other
    /// writers.
    #[error("Stock for {0} is changing too quickly, try again")]
    StockContention(String),

    /// The store stayed unreachable through every retry.
    #[error("Data store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store refused an operation or returned an undecodable row.
    #[error("Data store error: {0}")]
    Store(StoreError),

    /// A sale stopped after its first write. Nothing was rolled back.
    #[error("{0}")]
    PartialSaleFailure(Box<PartialSale>),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            EngineError::StoreUnavailable(err.to_string())
        } else {
            EngineError::Store(err)
        }
    }
}

impl From<kasa_core::ValidationErrors> for EngineError {
    fn from(errors: kasa_core::ValidationErrors) -> Self {
        EngineError::Core(CoreError::Validation(errors))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Partial Sale
// =============================================================================

/// The saga step a sale was on when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(tag = "step", content = "line", rename_all = "snake_case")]
pub enum SaleStep {
    /// Inserting the sale header.
    Header,
    /// Inserting the sale line at this index.
    Line(usize),
    /// Decrementing stock for the line at this index.
    Stock(usize),
    /// Booking cash into the till.
    CashBooking,
}

impl fmt::Display for SaleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaleStep::Header => write!(f, "sale header"),
            SaleStep::Line(i) => write!(f, "sale line {}", i),
            SaleStep::Stock(i) => write!(f, "stock update for line {}", i),
            SaleStep::CashBooking => write!(f, "cash booking"),
        }
    }
}

/// A line whose sale-line row and stock decrement both landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct CommittedLine {
    pub index: usize,
    pub barcode: String,
    pub quantity: i64,
}

/// What a stopped sale left behind.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct PartialSale {
    /// `None` when the header insert itself failed or its id was never
    /// recovered.
    pub sale_id: Option<i64>,
    pub committed_lines: Vec<CommittedLine>,
    pub failed_step: SaleStep,
    pub cause: String,
}

impl fmt::Display for PartialSale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sale stopped at {} after {} committed line(s): {}",
            self.failed_step,
            self.committed_lines.len(),
            self.cause
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_store_errors_become_unavailable() {
        let err: EngineError = StoreError::Timeout(std::time::Duration::from_secs(1)).into();
        assert!(matches!(err, EngineError::StoreUnavailable(_)));

        let err: EngineError = StoreError::Rejected("CHECK constraint failed".into()).into();
        assert!(matches!(err, EngineError::Store(_)));
    }

    #[test]
    fn test_partial_sale_message() {
        let partial = PartialSale {
            sale_id: Some(12),
            committed_lines: vec![CommittedLine {
                index: 0,
                barcode: "001".into(),
                quantity: 3,
            }],
            failed_step: SaleStep::Line(1),
            cause: "Store unavailable: down".into(),
        };
        assert_eq!(
            partial.to_string(),
            "Sale stopped at sale line 1 after 1 committed line(s): Store unavailable: down"
        );
    }

    #[test]
    fn test_step_serialization() {
        assert_eq!(
            serde_json::to_value(SaleStep::Stock(2)).unwrap(),
            serde_json::json!({"step": "stock", "line": 2})
        );
        assert_eq!(
            serde_json::to_value(SaleStep::Header).unwrap(),
            serde_json::json!({"step": "header"})
        );
    }
}
