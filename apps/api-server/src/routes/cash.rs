//! Till open, close and status.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::dto::{ApiJson, CloseSummaryView, CloseTillBody, OpenTillBody, TillStatusView, TillView};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn status(State(state): State<AppState>, _user: AuthUser) -> ApiResult<Json<Value>> {
    let status = state.engine.till.status().await?;
    Ok(Json(json!({
        "status": "success",
        "cash_register": TillStatusView::from(status),
    })))
}

pub async fn open(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(body): ApiJson<OpenTillBody>,
) -> ApiResult<Json<Value>> {
    let amount = body.amount()?;
    let till = state.engine.till.open(amount, &user.actor).await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("Cash register opened with {}", amount),
        "cash_register": TillView::from(&till),
    })))
}

pub async fn close(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(body): ApiJson<CloseTillBody>,
) -> ApiResult<Json<Value>> {
    let amount = body.amount()?;
    let summary = state.engine.till.close(amount, &user.actor).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Cash register closed",
        "summary": CloseSummaryView::from(summary),
    })))
}
