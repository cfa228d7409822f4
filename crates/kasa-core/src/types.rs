//! # Domain Types
//!
//! Every row Kasa stores, as an explicit typed record.
//!
//! ## Record Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Stored Records                                  │
//! │                                                                         │
//! │  Inventory Ledger owns        Till owns              Sale Engine owns   │
//! │  ┌─────────────────┐          ┌────────────────┐     ┌──────────────┐   │
//! │  │ Product         │          │ TillState (id=1)│    │ Sale         │   │
//! │  │  barcode (key)  │          │  is_open        │    │  total_cents │   │
//! │  │  quantity       │          │  current_amount │    │  payment     │   │
//! │  └─────────────────┘          └────────────────┘     └──────┬───────┘   │
//! │  ┌─────────────────┐          ┌────────────────┐            │           │
//! │  │ StockMovement   │          │ CashTransaction│     ┌──────▼───────┐   │
//! │  │  new / in / out │          │ open/sale/close│     │ SaleLine     │   │
//! │  └─────────────────┘          └────────────────┘     └──────────────┘   │
//! │                                                                         │
//! │  AuditLogEntry, User: written by every state-changing operation        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Record Conventions
//! - `id` is assigned by the store; it is `None` on records not yet inserted
//!   and skipped when serialized so the backend can assign it.
//! - Amounts are `*_cents: i64` with a `Money` accessor.
//! - Timestamps use [`crate::time::timestamp`] so they compare correctly as
//!   text.
//! - Append-only saga rows carry an optional `request_id` used as an insert
//!   deduplication key by the retrying store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Rate};
use crate::TILL_ROW_ID;

// =============================================================================
// Product
// =============================================================================

/// A product on the shelf, keyed by barcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Business key, unique.
    pub barcode: String,

    pub name: String,

    /// Unit price in cents.
    pub price_cents: i64,

    /// Quantity on hand. Never negative after a committed operation.
    pub quantity: i64,

    /// VAT rate in basis points (1800 = 18%).
    pub vat_rate_bps: u32,

    /// Excise (ÖTV) rate in basis points.
    pub excise_rate_bps: u32,

    /// Reorder threshold used by the stock report.
    pub min_stock_level: i64,

    #[serde(with = "crate::time::timestamp")]
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[serde(default, with = "crate::time::timestamp_opt")]
    #[ts(as = "Option<String>")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn vat_rate(&self) -> Rate {
        Rate::from_bps(self.vat_rate_bps)
    }

    #[inline]
    pub fn excise_rate(&self) -> Rate {
        Rate::from_bps(self.excise_rate_bps)
    }

    /// Whether this product is at or below its reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_stock_level
    }

    /// Checks whether `requested` units can be taken from stock.
    pub fn availability(&self, requested: i64) -> Availability {
        if self.quantity >= requested {
            Availability::Available
        } else {
            Availability::Insufficient {
                have: self.quantity,
                want: requested,
            }
        }
    }
}

/// Result of a stock preflight for one barcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Availability {
    Available,
    NotFound,
    Insufficient { have: i64, want: i64 },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// Kind of inventory-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    /// Product created with initial stock.
    New,
    /// Stock added (delivery, manual increase).
    In,
    /// Stock removed (sale line, manual decrease).
    Out,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::New => "new",
            MovementType::In => "in",
            MovementType::Out => "out",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable log entry of a quantity change for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockMovement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    pub barcode: String,

    /// Product name at the time of the movement.
    pub product_name: String,

    pub movement_type: MovementType,

    /// Always positive; the direction is in `movement_type`.
    pub quantity: i64,

    pub user_id: i64,

    #[serde(with = "crate::time::timestamp")]
    #[ts(as = "String")]
    pub movement_date: DateTime<Utc>,
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a sale was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl PaymentMethod {
    pub const ALLOWED: [&'static str; 2] = ["cash", "card"];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the English names plus the Turkish names older till clients send
/// (`nakit`, `kredi`).
impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" | "nakit" => Ok(PaymentMethod::Cash),
            "card" | "credit" | "credit_card" | "kredi" => Ok(PaymentMethod::Card),
            other => Err(format!("Unknown payment method: {}", other)),
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A completed sale header. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Dedup key for the header insert; also used to recover the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    pub total_cents: i64,

    pub payment_method: PaymentMethod,

    pub cash_amount_cents: i64,

    pub card_amount_cents: i64,

    pub change_amount_cents: i64,

    pub user_id: i64,

    #[serde(with = "crate::time::timestamp")]
    #[ts(as = "String")]
    pub sale_date: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn cash_amount(&self) -> Money {
        Money::from_cents(self.cash_amount_cents)
    }
}

/// One line of a sale, stored in `sale_items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    pub sale_id: i64,

    pub barcode: String,

    /// Product name at the time of the sale.
    pub product_name: String,

    pub quantity: i64,

    /// Unit price at the time of the sale, in cents.
    pub unit_price_cents: i64,
}

impl SaleLine {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Till
// =============================================================================

/// The singleton cash-register row (`id = 1`).
///
/// ## State Machine
/// ```text
///            open(X)                      close(actual)
///  ┌────────┐ ─────────► ┌────────────┐ ──────────────► ┌────────┐
///  │ Closed │            │    Open    │                 │ Closed │
///  └────────┘            │ current=X  │                 │current=0│
///                        │ +A per cash│                 └────────┘
///                        │   sale     │
///                        └────────────┘
/// ```
///
/// The transition methods are pure: they return the next state and leave the
/// write to the Till service in kasa-engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TillState {
    pub id: i64,

    pub is_open: bool,

    /// Running cash balance; meaningful only while open.
    pub current_amount_cents: i64,

    pub opening_balance_cents: i64,

    #[serde(default, with = "crate::time::timestamp_opt")]
    #[ts(as = "Option<String>")]
    pub opening_time: Option<DateTime<Utc>>,

    #[serde(default, with = "crate::time::timestamp_opt")]
    #[ts(as = "Option<String>")]
    pub closing_time: Option<DateTime<Utc>>,

    #[serde(with = "crate::time::timestamp")]
    #[ts(as = "String")]
    pub last_updated: DateTime<Utc>,
}

impl TillState {
    /// The initial state of a till that has never been opened.
    pub fn initial(now: DateTime<Utc>) -> Self {
        TillState {
            id: TILL_ROW_ID,
            is_open: false,
            current_amount_cents: 0,
            opening_balance_cents: 0,
            opening_time: None,
            closing_time: None,
            last_updated: now,
        }
    }

    #[inline]
    pub fn current_amount(&self) -> Money {
        Money::from_cents(self.current_amount_cents)
    }

    #[inline]
    pub fn opening_balance(&self) -> Money {
        Money::from_cents(self.opening_balance_cents)
    }

    /// Closed → Open with `current = opening = initial`.
    pub fn opened(&self, initial: Money, now: DateTime<Utc>) -> CoreResult<TillState> {
        if self.is_open {
            return Err(CoreError::AlreadyOpen);
        }
        Ok(TillState {
            id: self.id,
            is_open: true,
            current_amount_cents: initial.cents(),
            opening_balance_cents: initial.cents(),
            opening_time: Some(now),
            closing_time: self.closing_time,
            last_updated: now,
        })
    }

    /// Adds a cash amount to the running balance. A closed till is returned
    /// unchanged.
    pub fn with_cash(&self, amount: Money, now: DateTime<Utc>) -> TillState {
        if !self.is_open {
            return self.clone();
        }
        TillState {
            current_amount_cents: self.current_amount_cents + amount.cents(),
            last_updated: now,
            ..self.clone()
        }
    }

    /// Open → Closed, zeroing the balance and the opening balance.
    pub fn closed(&self, now: DateTime<Utc>) -> CoreResult<TillState> {
        if !self.is_open {
            return Err(CoreError::AlreadyClosed);
        }
        Ok(TillState {
            id: self.id,
            is_open: false,
            current_amount_cents: 0,
            opening_balance_cents: 0,
            opening_time: self.opening_time,
            closing_time: Some(now),
            last_updated: now,
        })
    }
}

/// Kind of monetary till event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum CashTransactionType {
    Open,
    Sale,
    Close,
}

impl CashTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CashTransactionType::Open => "open",
            CashTransactionType::Sale => "sale",
            CashTransactionType::Close => "close",
        }
    }
}

/// Immutable record of a monetary till event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashTransaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    pub transaction_type: CashTransactionType,

    pub amount_cents: i64,

    pub user_id: i64,

    #[serde(with = "crate::time::timestamp")]
    #[ts(as = "String")]
    pub transaction_date: DateTime<Utc>,

    pub description: String,
}

// =============================================================================
// Audit Log
// =============================================================================

/// Audit action tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    ProductCreate,
    ProductUpdate,
    ProductDelete,
    StockUpdate,
    Sale,
    CashOpen,
    CashClose,
    /// A decrement was clamped at zero because stock moved under the sale.
    StockWentNegative,
    /// A sale stopped part-way through its mutation steps.
    SalePartialFailure,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "login",
            AuditAction::ProductCreate => "product_create",
            AuditAction::ProductUpdate => "product_update",
            AuditAction::ProductDelete => "product_delete",
            AuditAction::StockUpdate => "stock_update",
            AuditAction::Sale => "sale",
            AuditAction::CashOpen => "cash_open",
            AuditAction::CashClose => "cash_close",
            AuditAction::StockWentNegative => "stock_went_negative",
            AuditAction::SalePartialFailure => "sale_partial_failure",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AuditLogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// `None` for failed logins and system events.
    pub user_id: Option<i64>,

    pub action: AuditAction,

    pub description: String,

    pub ip_address: Option<String>,

    #[serde(with = "crate::time::timestamp")]
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Users
// =============================================================================

/// User role. Carried on the profile and token, never enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Cashier,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Cashier => "cashier",
            UserRole::User => "user",
        }
    }
}

/// A till user as stored (including the argon2 PHC hash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub username: String,

    pub password_hash: String,

    pub full_name: String,

    pub role: UserRole,

    #[serde(default, with = "crate::time::timestamp_opt")]
    pub last_login: Option<DateTime<Utc>>,

    #[serde(with = "crate::time::timestamp")]
    pub created_at: DateTime<Utc>,
}

/// The part of a user that leaves the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: UserRole,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 15, 9, 0, 0).unwrap()
    }

    fn product(quantity: i64) -> Product {
        Product {
            id: Some(1),
            barcode: "001".to_string(),
            name: "Ayran".to_string(),
            price_cents: 500,
            quantity,
            vat_rate_bps: 1800,
            excise_rate_bps: 0,
            min_stock_level: 5,
            created_at: now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_availability() {
        assert_eq!(product(10).availability(3), Availability::Available);
        assert_eq!(product(3).availability(3), Availability::Available);
        assert_eq!(
            product(2).availability(3),
            Availability::Insufficient { have: 2, want: 3 }
        );
    }

    #[test]
    fn test_low_stock_threshold_is_inclusive() {
        assert!(product(5).is_low_stock());
        assert!(!product(6).is_low_stock());
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("cash".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert_eq!("nakit".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert_eq!("Kredi".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert_eq!("card".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_till_transitions() {
        let closed = TillState::initial(now());

        let open = closed.opened(Money::from_cents(10000), now()).unwrap();
        assert!(open.is_open);
        assert_eq!(open.current_amount_cents, 10000);
        assert_eq!(open.opening_balance_cents, 10000);
        assert_eq!(open.opening_time, Some(now()));

        assert!(matches!(
            open.opened(Money::from_cents(1), now()),
            Err(CoreError::AlreadyOpen)
        ));

        let after_sale = open.with_cash(Money::from_cents(5000), now());
        assert_eq!(after_sale.current_amount_cents, 15000);

        let closed_again = after_sale.closed(now()).unwrap();
        assert!(!closed_again.is_open);
        assert_eq!(closed_again.current_amount_cents, 0);
        assert_eq!(closed_again.opening_balance_cents, 0);
        assert_eq!(closed_again.closing_time, Some(now()));

        assert!(matches!(closed_again.closed(now()), Err(CoreError::AlreadyClosed)));
    }

    #[test]
    fn test_cash_on_closed_till_is_ignored() {
        let closed = TillState::initial(now());
        let after = closed.with_cash(Money::from_cents(5000), now());
        assert_eq!(after, closed);
    }

    #[test]
    fn test_record_serialization_skips_unassigned_id() {
        let mut p = product(10);
        p.id = None;
        let json = serde_json::to_value(&p).unwrap();

        assert!(json.get("id").is_none());
        assert_eq!(json["created_at"], "2026-10-15T09:00:00.000000Z");
        assert_eq!(json["updated_at"], serde_json::Value::Null);

        let back: Product = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_value(MovementType::Out).unwrap(), "out");
        assert_eq!(serde_json::to_value(PaymentMethod::Card).unwrap(), "card");
        assert_eq!(
            serde_json::to_value(AuditAction::StockWentNegative).unwrap(),
            "stock_went_negative"
        );
        assert_eq!(AuditAction::CashClose.as_str(), "cash_close");
    }
}
