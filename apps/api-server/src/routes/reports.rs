use axum::extract::{Query, State};
use axum::Json;
use kasa_core::{Money, Sale};
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::dto::{MovementView, ProductView, SaleView, SalesReportQuery};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn sales(
    State(state): State<AppState>,
    _user: AuthUser,
    query: Result<Query<SalesReportQuery>, axum::extract::rejection::QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let (start, end) = query.bounds()?;

    let sales = state.engine.reports.sales_report(start, end).await?;
    let total: Money = sales.iter().map(Sale::total).sum();
    let views: Vec<SaleView> = sales.iter().map(SaleView::from).collect();

    Ok(Json(json!({
        "status": "success",
        "count": views.len(),
        "total": total.to_decimal(),
        "sales": views,
    })))
}

pub async fn stock(State(state): State<AppState>, _user: AuthUser) -> ApiResult<Json<Value>> {
    let report = state.engine.reports.stock_report().await?;
    let low_stock: Vec<ProductView> = report.low_stock.iter().map(ProductView::from).collect();
    let movements: Vec<MovementView> = report.movements.iter().map(MovementView::from).collect();

    Ok(Json(json!({
        "status": "success",
        "low_stock": low_stock,
        "movements": movements,
    })))
}
