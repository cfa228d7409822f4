use axum::extract::State;
use axum::Json;

use crate::auth::AuthUser;
use crate::dto::{ApiJson, StockAddBody, StockAddResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn add(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(body): ApiJson<StockAddBody>,
) -> ApiResult<Json<StockAddResponse>> {
    let request = body.into_request()?;
    let added = request.quantity;
    let outcome = state.engine.catalog.add_stock(request, &user.actor).await?;
    Ok(Json(StockAddResponse::from_outcome(&outcome, added)))
}
