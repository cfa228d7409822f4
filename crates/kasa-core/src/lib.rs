//! # kasa-core: Pure Business Logic for Kasa POS
//!
//! Records, money, validation and reconciliation arithmetic. Nothing in this
//! crate performs I/O; the engine in `kasa-engine` does the store calls and
//! uses these types and functions to decide what to write.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kasa POS Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    api-server (axum)                            │   │
//! │  │    /api/sale   /api/cash/*   /api/products   /api/stock/add     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    kasa-engine                                  │   │
//! │  │    SaleEngine ─► InventoryLedger ─► Till ─► AuditLog            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kasa-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌────────────────┐    │   │
//! │  │   │  types   │ │  money   │ │ request  │ │ reconciliation │    │   │
//! │  │   │ records  │ │  Money   │ │ validate │ │ CloseSummary   │    │   │
//! │  │   │ TillState│ │  Rate    │ │ all rules│ │ expected_cash  │    │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └────────────────┘    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORE • NO NETWORK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Stored records (Product, Sale, TillState, ...)
//! - [`money`] - Integer-cent `Money` and basis-point `Rate`
//! - [`request`] - Sale / product / stock requests with `validate()`
//! - [`validation`] - Field-level rules shared by the requests
//! - [`reconciliation`] - Expected cash and close-out summary
//! - [`time`] - Stored timestamp format and business-day boundaries
//! - [`error`] - Domain error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod reconciliation;
pub mod request;
pub mod time;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError, ValidationErrors};
pub use money::{Money, Rate};
pub use reconciliation::{CloseSummary, TillStatus};
pub use request::{
    ProductDraft, ProductPatch, SaleLineRequest, SaleRequest, StockAddRequest, ValidatedSale,
};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Primary key of the singleton till row.
pub const TILL_ROW_ID: i64 = 1;

/// VAT applied when a new product does not specify one (18%).
pub const DEFAULT_VAT_RATE_BPS: u32 = 1800;

/// Excise applied when a new product does not specify one.
pub const DEFAULT_EXCISE_RATE_BPS: u32 = 0;

/// Reorder threshold applied when a new product does not specify one.
pub const DEFAULT_MIN_STOCK_LEVEL: i64 = 5;
