//! API error type and its JSON rendering.
//!
//! Every failure leaves the server as
//! `{"status":"error","code":"<KIND>","message":"..."}`, with extra fields
//! for validation lists and partial sales.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kasa_core::{CoreError, ValidationErrors};
use kasa_engine::EngineError;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Missing or invalid bearer token.
    #[error("{0}")]
    Unauthorized(String),

    /// Body or query that could not be parsed.
    #[error("{0}")]
    BadRequest(String),

    /// A catalog read for a barcode that does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(String),
}

impl ApiError {
    /// Catalog endpoints answer a missing product with 404.
    pub fn catalog(err: EngineError) -> Self {
        match err {
            EngineError::ProductNotFound(barcode) => ApiError::ProductNotFound(barcode),
            other => ApiError::Engine(other),
        }
    }

    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::ProductNotFound(_) => (StatusCode::NOT_FOUND, "PRODUCT_NOT_FOUND"),
            ApiError::Engine(err) => match err {
                EngineError::Core(CoreError::Validation(_)) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                EngineError::Core(CoreError::InsufficientStock { .. }) => {
                    (StatusCode::BAD_REQUEST, "INSUFFICIENT_STOCK")
                }
                EngineError::Core(CoreError::AlreadyOpen) => (StatusCode::BAD_REQUEST, "ALREADY_OPEN"),
                EngineError::Core(CoreError::AlreadyClosed) => (StatusCode::BAD_REQUEST, "ALREADY_CLOSED"),
                EngineError::ProductNotFound(_) => (StatusCode::BAD_REQUEST, "PRODUCT_NOT_FOUND"),
                EngineError::MissingProductFields { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                EngineError::DuplicateBarcode(_) => (StatusCode::BAD_REQUEST, "DUPLICATE_BARCODE"),
                EngineError::ProductInUse(_) => (StatusCode::CONFLICT, "PRODUCT_IN_USE"),
                EngineError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
                EngineError::StockContention(_) => (StatusCode::CONFLICT, "STOCK_CONTENTION"),
                EngineError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE"),
                EngineError::PartialSaleFailure(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "PARTIAL_SALE_FAILURE")
                }
                EngineError::Store(_) | EngineError::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
                }
            },
        }
    }

    fn body(&self, code: &str) -> Value {
        let mut body = json!({
            "status": "error",
            "code": code,
            "message": self.to_string(),
        });
        match self {
            ApiError::Engine(EngineError::Core(CoreError::Validation(errors))) => {
                body["errors"] = json!(errors.messages());
            }
            ApiError::Engine(EngineError::PartialSaleFailure(partial)) => {
                body["sale_id"] = json!(partial.sale_id);
                body["committed_lines"] = json!(partial.committed_lines);
                body["failed_step"] = json!(partial.failed_step);
            }
            _ => {}
        }
        body
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Engine(errors.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            warn!(code, error = %self, "Request failed");
        }
        (status, Json(self.body(code))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kasa_engine::{CommittedLine, PartialSale, SaleStep};

    #[test]
    fn test_product_not_found_depends_on_endpoint() {
        let sale = ApiError::from(EngineError::ProductNotFound("001".into()));
        assert_eq!(sale.status_and_code(), (StatusCode::BAD_REQUEST, "PRODUCT_NOT_FOUND"));

        let catalog = ApiError::catalog(EngineError::ProductNotFound("001".into()));
        assert_eq!(catalog.status_and_code(), (StatusCode::NOT_FOUND, "PRODUCT_NOT_FOUND"));
    }

    #[test]
    fn test_partial_sale_body() {
        let err = ApiError::from(EngineError::PartialSaleFailure(Box::new(PartialSale {
            sale_id: Some(4),
            committed_lines: vec![CommittedLine {
                index: 0,
                barcode: "001".into(),
                quantity: 2,
            }],
            failed_step: SaleStep::CashBooking,
            cause: "Data store unavailable: down".into(),
        })));
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let body = err.body(code);
        assert_eq!(body["code"], "PARTIAL_SALE_FAILURE");
        assert_eq!(body["sale_id"], 4);
        assert_eq!(body["committed_lines"][0]["barcode"], "001");
        assert_eq!(body["failed_step"]["step"], "cash_booking");
    }
}
