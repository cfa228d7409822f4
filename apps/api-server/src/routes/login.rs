use axum::extract::State;
use axum::Json;

use crate::auth::PeerIp;
use crate::dto::{ApiJson, LoginBody, LoginResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn login(
    State(state): State<AppState>,
    PeerIp(ip): PeerIp,
    ApiJson(body): ApiJson<LoginBody>,
) -> ApiResult<Json<LoginResponse>> {
    let user = state.engine.auth.login(&body.username, &body.password, ip).await?;
    let token = state.jwt.generate_token(&user)?;

    Ok(Json(LoginResponse {
        status: "success",
        token,
        token_type: "Bearer",
        expires_in: state.jwt.lifetime_secs(),
        user,
    }))
}
