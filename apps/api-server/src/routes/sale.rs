use axum::extract::State;
use axum::Json;

use crate::auth::AuthUser;
use crate::dto::{ApiJson, SaleBody, SaleResponse};
use crate::error::ApiResult;
use crate::state::AppState;

/// The engine commits the sale on its own task, so the client going away
/// here does not stop it halfway.
pub async fn execute(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(body): ApiJson<SaleBody>,
) -> ApiResult<Json<SaleResponse>> {
    let request = body.into_request()?;
    let receipt = state.engine.sales.execute(request, user.actor).await?;

    let message = if receipt.stock_warnings.is_empty() {
        "Sale completed successfully".to_string()
    } else {
        format!(
            "Sale completed; stock ran short for {} product(s)",
            receipt.stock_warnings.len()
        )
    };

    Ok(Json(SaleResponse {
        status: "success",
        sale_id: receipt.sale_id,
        message,
        cash_booked: receipt.cash_booked,
        stock_warnings: receipt.stock_warnings,
    }))
}
