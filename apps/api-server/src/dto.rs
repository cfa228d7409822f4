//! Wire shapes.
//!
//! The till frontend sends and expects amounts as decimal numbers (`12.50`)
//! and rates as percentages (`18`). Everything is converted to integer cents
//! and basis points here, at the edge, before it reaches the engine.

use axum::extract::FromRequest;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use kasa_core::time;
use kasa_core::{
    CloseSummary, Money, Product, ProductDraft, ProductPatch, Rate, Sale, SaleLineRequest, SaleRequest,
    StockAddRequest, StockMovement, TillState, TillStatus, UserProfile, ValidationError, ValidationErrors,
    DEFAULT_EXCISE_RATE_BPS, DEFAULT_MIN_STOCK_LEVEL, DEFAULT_VAT_RATE_BPS,
};
use kasa_engine::{DeltaOutcome, StockWarning};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// `axum::Json` whose rejection renders as our error body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

// =============================================================================
// Conversions
// =============================================================================

/// Collects conversion failures so they are reported together with the
/// engine's own validation messages.
#[derive(Debug, Default)]
struct Converter {
    errors: ValidationErrors,
}

impl Converter {
    fn money(&mut self, field: &str, amount: Decimal) -> Money {
        Money::from_decimal(amount).unwrap_or_else(|| {
            self.errors.push(ValidationError::out_of_range(field));
            Money::zero()
        })
    }

    fn rate(&mut self, field: &str, percent: Decimal) -> Rate {
        Rate::from_percent(percent).unwrap_or_else(|| {
            if percent.is_sign_negative() {
                self.errors.push(ValidationError::must_be_non_negative(field));
            } else {
                self.errors.push(ValidationError::out_of_range(field));
            }
            Rate::from_bps(0)
        })
    }

    fn finish<T>(self, value: T) -> Result<T, ApiError> {
        self.errors.into_result(value).map_err(ApiError::from)
    }
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub status: &'static str,
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserProfile,
}

// =============================================================================
// Sale
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SaleItemBody {
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub name: String,
    pub quantity: i64,
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct SaleBody {
    #[serde(default)]
    pub items: Vec<SaleItemBody>,
    pub total: Decimal,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub cash_amount: Decimal,
    #[serde(default)]
    pub credit_card_amount: Decimal,
    #[serde(default)]
    pub change_amount: Decimal,
}

impl SaleBody {
    pub fn into_request(self) -> Result<SaleRequest, ApiError> {
        let mut conv = Converter::default();

        let lines: Vec<SaleLineRequest> = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| SaleLineRequest {
                unit_price: conv.money(&format!("items[{}].price", index), item.price),
                barcode: item.barcode,
                name: item.name,
                quantity: item.quantity,
            })
            .collect();

        let request = SaleRequest {
            lines,
            total: conv.money("total", self.total),
            payment_method: self.payment_method,
            cash_amount: conv.money("cash_amount", self.cash_amount),
            card_amount: conv.money("credit_card_amount", self.credit_card_amount),
            change_amount: conv.money("change_amount", self.change_amount),
        };
        conv.finish(request)
    }
}

#[derive(Debug, Serialize)]
pub struct SaleResponse {
    pub status: &'static str,
    pub sale_id: i64,
    pub message: String,
    pub cash_booked: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stock_warnings: Vec<StockWarning>,
}

// =============================================================================
// Till
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct OpenTillBody {
    pub initial_amount: Decimal,
}

impl OpenTillBody {
    pub fn amount(&self) -> Result<Money, ApiError> {
        let mut conv = Converter::default();
        let amount = conv.money("initial_amount", self.initial_amount);
        conv.finish(amount)
    }
}

#[derive(Debug, Deserialize)]
pub struct CloseTillBody {
    pub final_amount: Decimal,
}

impl CloseTillBody {
    pub fn amount(&self) -> Result<Money, ApiError> {
        let mut conv = Converter::default();
        let amount = conv.money("final_amount", self.final_amount);
        conv.finish(amount)
    }
}

#[derive(Debug, Serialize)]
pub struct TillView {
    pub is_open: bool,
    pub current_amount: Decimal,
    pub opening_balance: Decimal,
    pub opening_time: Option<String>,
    pub closing_time: Option<String>,
}

impl From<&TillState> for TillView {
    fn from(till: &TillState) -> Self {
        TillView {
            is_open: till.is_open,
            current_amount: till.current_amount().to_decimal(),
            opening_balance: till.opening_balance().to_decimal(),
            opening_time: till.opening_time.as_ref().map(time::format_timestamp),
            closing_time: till.closing_time.as_ref().map(time::format_timestamp),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TillStatusView {
    pub is_open: bool,
    pub current_amount: Decimal,
    pub opening_balance: Decimal,
    pub opening_time: Option<String>,
    pub cash_sales_today: Decimal,
    pub card_sales_today: Decimal,
    pub expected_cash: Decimal,
}

impl From<TillStatus> for TillStatusView {
    fn from(status: TillStatus) -> Self {
        TillStatusView {
            is_open: status.is_open,
            current_amount: status.current_amount.to_decimal(),
            opening_balance: status.opening_balance.to_decimal(),
            opening_time: status.opening_time.as_ref().map(time::format_timestamp),
            cash_sales_today: status.cash_sales_today.to_decimal(),
            card_sales_today: status.card_sales_today.to_decimal(),
            expected_cash: status.expected_cash.to_decimal(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CloseSummaryView {
    pub opening_balance: Decimal,
    pub cash_sales: Decimal,
    pub expected_cash: Decimal,
    pub actual_amount: Decimal,
    pub difference: Decimal,
}

impl From<CloseSummary> for CloseSummaryView {
    fn from(summary: CloseSummary) -> Self {
        CloseSummaryView {
            opening_balance: summary.opening_balance.to_decimal(),
            cash_sales: summary.cash_sales_total.to_decimal(),
            expected_cash: summary.expected_cash.to_decimal(),
            actual_amount: summary.actual_amount.to_decimal(),
            difference: summary.difference.to_decimal(),
        }
    }
}

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ProductBody {
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub quantity: i64,
    pub vat_rate: Option<Decimal>,
    pub excise_rate: Option<Decimal>,
    pub min_stock_level: Option<i64>,
}

impl ProductBody {
    pub fn into_draft(self) -> Result<ProductDraft, ApiError> {
        let mut conv = Converter::default();
        let draft = ProductDraft {
            price: conv.money("price", self.price),
            vat_rate: self
                .vat_rate
                .map(|v| conv.rate("vat_rate", v))
                .unwrap_or(Rate::from_bps(DEFAULT_VAT_RATE_BPS)),
            excise_rate: self
                .excise_rate
                .map(|v| conv.rate("excise_rate", v))
                .unwrap_or(Rate::from_bps(DEFAULT_EXCISE_RATE_BPS)),
            min_stock_level: self.min_stock_level.unwrap_or(DEFAULT_MIN_STOCK_LEVEL),
            barcode: self.barcode,
            name: self.name,
            quantity: self.quantity,
        };
        conv.finish(draft)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductPatchBody {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub quantity: Option<i64>,
    pub vat_rate: Option<Decimal>,
    pub excise_rate: Option<Decimal>,
    pub min_stock_level: Option<i64>,
}

impl ProductPatchBody {
    pub fn into_patch(self) -> Result<ProductPatch, ApiError> {
        let mut conv = Converter::default();
        let patch = ProductPatch {
            name: self.name,
            price: self.price.map(|v| conv.money("price", v)),
            quantity: self.quantity,
            vat_rate: self.vat_rate.map(|v| conv.rate("vat_rate", v)),
            excise_rate: self.excise_rate.map(|v| conv.rate("excise_rate", v)),
            min_stock_level: self.min_stock_level,
        };
        conv.finish(patch)
    }
}

#[derive(Debug, Serialize)]
pub struct ProductView {
    pub id: Option<i64>,
    pub barcode: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: i64,
    pub vat_rate: Decimal,
    pub excise_rate: Decimal,
    pub min_stock_level: i64,
    pub low_stock: bool,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl From<&Product> for ProductView {
    fn from(product: &Product) -> Self {
        ProductView {
            id: product.id,
            barcode: product.barcode.clone(),
            name: product.name.clone(),
            price: product.price().to_decimal(),
            quantity: product.quantity,
            vat_rate: product.vat_rate().percent(),
            excise_rate: product.excise_rate().percent(),
            min_stock_level: product.min_stock_level,
            low_stock: product.is_low_stock(),
            created_at: time::format_timestamp(&product.created_at),
            updated_at: product.updated_at.as_ref().map(time::format_timestamp),
        }
    }
}

// =============================================================================
// Stock
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct StockAddBody {
    #[serde(default)]
    pub barcode: String,
    pub quantity: i64,
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub vat_rate: Option<Decimal>,
    pub excise_rate: Option<Decimal>,
    pub min_stock_level: Option<i64>,
}

impl StockAddBody {
    pub fn into_request(self) -> Result<StockAddRequest, ApiError> {
        let mut conv = Converter::default();
        let request = StockAddRequest {
            barcode: self.barcode,
            quantity: self.quantity,
            name: self.name,
            price: self.price.map(|v| conv.money("price", v)),
            vat_rate: self.vat_rate.map(|v| conv.rate("vat_rate", v)),
            excise_rate: self.excise_rate.map(|v| conv.rate("excise_rate", v)),
            min_stock_level: self.min_stock_level,
        };
        conv.finish(request)
    }
}

#[derive(Debug, Serialize)]
pub struct StockAddResponse {
    pub status: &'static str,
    pub message: String,
    pub created: bool,
    pub product: ProductView,
}

impl StockAddResponse {
    pub fn from_outcome(outcome: &DeltaOutcome, added: i64) -> Self {
        let message = if outcome.created {
            format!("Product {} created with {} in stock", outcome.product.barcode, added)
        } else {
            format!("Added {} to {}", added, outcome.product.barcode)
        };
        StockAddResponse {
            status: "success",
            message,
            created: outcome.created,
            product: ProductView::from(&outcome.product),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MovementView {
    pub id: Option<i64>,
    pub barcode: String,
    pub product_name: String,
    pub movement_type: String,
    pub quantity: i64,
    pub user_id: i64,
    pub movement_date: String,
}

impl From<&StockMovement> for MovementView {
    fn from(movement: &StockMovement) -> Self {
        MovementView {
            id: movement.id,
            barcode: movement.barcode.clone(),
            product_name: movement.product_name.clone(),
            movement_type: movement.movement_type.to_string(),
            quantity: movement.quantity,
            user_id: movement.user_id,
            movement_date: time::format_timestamp(&movement.movement_date),
        }
    }
}

// =============================================================================
// Reports
// =============================================================================

/// `?start_date=&end_date=`. Accepts a full timestamp or a bare date; a
/// bare end date covers that whole day.
#[derive(Debug, Default, Deserialize)]
pub struct SalesReportQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl SalesReportQuery {
    pub fn bounds(&self) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), ApiError> {
        let start = self
            .start_date
            .as_deref()
            .map(|raw| parse_bound(raw, NaiveTime::MIN))
            .transpose()?;
        let end_of_day = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
        let end = self
            .end_date
            .as_deref()
            .map(|raw| parse_bound(raw, end_of_day))
            .transpose()?;
        Ok((start, end))
    }
}

fn parse_bound(raw: &str, time_of_day: NaiveTime) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(time_of_day).and_utc());
    }
    time::parse_timestamp(raw).map_err(|_| ApiError::BadRequest(format!("Invalid date: {}", raw)))
}

#[derive(Debug, Serialize)]
pub struct SaleView {
    pub id: Option<i64>,
    pub total: Decimal,
    pub payment_method: String,
    pub cash_amount: Decimal,
    pub credit_card_amount: Decimal,
    pub change_amount: Decimal,
    pub user_id: i64,
    pub sale_date: String,
}

impl From<&Sale> for SaleView {
    fn from(sale: &Sale) -> Self {
        SaleView {
            id: sale.id,
            total: sale.total().to_decimal(),
            payment_method: sale.payment_method.to_string(),
            cash_amount: sale.cash_amount().to_decimal(),
            credit_card_amount: Money::from_cents(sale.card_amount_cents).to_decimal(),
            change_amount: Money::from_cents(sale.change_amount_cents).to_decimal(),
            user_id: sale.user_id,
            sale_date: time::format_timestamp(&sale.sale_date),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).unwrap()
    }

    #[test]
    fn test_sale_body_converts_to_cents() {
        let body: SaleBody = serde_json::from_value(serde_json::json!({
            "items": [{"barcode": "001", "name": "Ayran", "quantity": 3, "price": 5.0}],
            "total": 15.0,
            "payment_method": "cash",
            "cash_amount": 20.0,
            "credit_card_amount": 0,
            "change_amount": 5.0
        }))
        .unwrap();

        let request = body.into_request().unwrap();
        assert_eq!(request.total, Money::from_cents(1500));
        assert_eq!(request.cash_amount, Money::from_cents(2000));
        assert_eq!(request.change_amount, Money::from_cents(500));
        assert_eq!(request.lines[0].unit_price, Money::from_cents(500));
    }

    #[test]
    fn test_product_defaults() {
        let body = ProductBody {
            barcode: "001".into(),
            name: "Ayran".into(),
            price: dec("5.50"),
            quantity: 0,
            vat_rate: None,
            excise_rate: None,
            min_stock_level: None,
        };
        let draft = body.into_draft().unwrap();
        assert_eq!(draft.price, Money::from_cents(550));
        assert_eq!(draft.vat_rate, Rate::from_bps(1800));
        assert_eq!(draft.excise_rate, Rate::from_bps(0));
        assert_eq!(draft.min_stock_level, 5);
    }

    #[test]
    fn test_negative_rate_is_a_validation_error() {
        let patch = ProductPatchBody {
            vat_rate: Some(dec("-1")),
            ..Default::default()
        };
        let err = patch.into_patch().unwrap_err();
        assert_eq!(err.status_and_code().1, "VALIDATION_ERROR");
        assert_eq!(err.to_string(), "vat_rate cannot be negative");
    }

    #[test]
    fn test_report_bounds_accept_bare_dates() {
        let query = SalesReportQuery {
            start_date: Some("2026-10-15".into()),
            end_date: Some("2026-10-15".into()),
        };
        let (start, end) = query.bounds().unwrap();
        assert_eq!(time::format_timestamp(&start.unwrap()), "2026-10-15T00:00:00.000000Z");
        assert_eq!(time::format_timestamp(&end.unwrap()), "2026-10-15T23:59:59.999999Z");

        let bad = SalesReportQuery {
            start_date: Some("yesterday".into()),
            end_date: None,
        };
        assert!(bad.bounds().is_err());
    }
}
