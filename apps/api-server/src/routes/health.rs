use axum::extract::State;
use axum::Json;
use kasa_engine::Health;

use crate::state::AppState;

/// Always answers 200; a failed store probe shows up as `degraded`.
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(state.engine.reports.health().await)
}
