//! # HTTP Routes
//!
//! ```text
//! GET    /health                     public
//! POST   /api/auth/login             public
//! GET    /api/products               bearer
//! POST   /api/products               bearer
//! GET    /api/products/{barcode}     bearer
//! PUT    /api/products/{barcode}     bearer
//! DELETE /api/products/{barcode}     bearer
//! POST   /api/stock/add              bearer
//! POST   /api/sale                   bearer
//! GET    /api/cash/status            bearer
//! POST   /api/cash/open              bearer
//! POST   /api/cash/close             bearer
//! GET    /api/reports/sales          bearer
//! GET    /api/reports/stock          bearer
//! ```
//!
//! Protected handlers take an [`AuthUser`](crate::auth::AuthUser); there is
//! no separate auth middleware.

mod cash;
mod health;
mod login;
mod products;
mod reports;
mod sale;
mod stock;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/auth/login", post(login::login))
        .route("/api/products", get(products::list).post(products::create))
        .route(
            "/api/products/{barcode}",
            get(products::get_one).put(products::update).delete(products::remove),
        )
        .route("/api/stock/add", post(stock::add))
        .route("/api/sale", post(sale::execute))
        .route("/api/cash/status", get(cash::status))
        .route("/api/cash/open", post(cash::open))
        .route("/api/cash/close", post(cash::close))
        .route("/api/reports/sales", get(reports::sales))
        .route("/api/reports/stock", get(reports::stock))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
