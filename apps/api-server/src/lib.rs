//! # Kasa API Server
//!
//! JSON-over-HTTP surface of the till. The binary in `main.rs` loads
//! configuration, opens the configured store and serves [`router`].
//!
//! ## Request Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  client ──► TraceLayer ──► CorsLayer ──► handler                        │
//! │                                            │                            │
//! │                          AuthUser (bearer) │ ApiJson (body → dto)       │
//! │                                            ▼                            │
//! │                                     kasa_engine::Engine                 │
//! │                                            │                            │
//! │                                            ▼                            │
//! │                         Store ◄── RetryingStore ◄── sqlite|rest|memory  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;

use kasa_db::{DbConfig, MemoryStore, RestConfig, RestStore, RetryingStore, SqliteStore, Store};
use tracing::info;

use crate::config::{ConfigError, StoreBackend, StoreSettings};

/// Opens the configured backend and wraps it in the retry decorator.
pub async fn open_store(settings: &StoreSettings) -> anyhow::Result<Store> {
    let retry = settings.retry_config();
    let store = match settings.backend {
        StoreBackend::Sqlite => {
            let sqlite = SqliteStore::connect(DbConfig::new(settings.sqlite_path.clone())).await?;
            info!(path = %settings.sqlite_path.display(), "Opened SQLite store");
            Store::new(RetryingStore::new(sqlite, retry))
        }
        StoreBackend::Rest => {
            let (url, key) = match (&settings.rest_url, &settings.rest_key) {
                (Some(url), Some(key)) => (url.clone(), key.clone()),
                _ => {
                    return Err(ConfigError::Invalid("rest backend needs rest_url and rest_key".into()).into())
                }
            };
            let config = RestConfig::new(url, key)
                .timeout(settings.call_timeout())
                .return_representation(settings.rest_return_representation);
            info!(url = %config.base_url, "Using PostgREST store");
            Store::new(RetryingStore::new(RestStore::new(config)?, retry))
        }
        StoreBackend::Memory => {
            info!("Using in-memory store; nothing survives a restart");
            Store::new(RetryingStore::new(MemoryStore::new(), retry))
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtManager;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use kasa_engine::Engine;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app() -> Router {
        let engine = Engine::new(Store::new(MemoryStore::new()));
        engine.auth.ensure_default_users().await.unwrap();
        router(AppState::new(engine, JwtManager::new("test-secret", 3600)))
    }

    async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn login(app: &Router) -> String {
        let (status, body) = call(
            app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"username": "kasiyer", "password": "kasiyer123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["role"], "cashier");
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = app().await;
        let (status, body) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["db_reachable"], true);
    }

    #[tokio::test]
    async fn test_protected_route_needs_token() {
        let app = app().await;
        let (status, body) = call(&app, Method::GET, "/api/products", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _) = call(&app, Method::GET, "/api/products", Some("not-a-token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bad_password() {
        let app = app().await;
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"username": "kasiyer", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_missing_product_is_404() {
        let app = app().await;
        let token = login(&app).await;
        let (status, body) = call(&app, Method::GET, "/api/products/999", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "PRODUCT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_sale_over_http() {
        let app = app().await;
        let token = login(&app).await;

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/products",
            Some(&token),
            Some(json!({"barcode": "001", "name": "Ayran", "price": 5.0, "quantity": 10})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/cash/open",
            Some(&token),
            Some(json!({"initial_amount": 100.0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let sale = json!({
            "items": [{"barcode": "001", "name": "Ayran", "quantity": 3, "price": 5.0}],
            "total": 15.0,
            "payment_method": "cash",
            "cash_amount": 15.0,
            "credit_card_amount": 0,
            "change_amount": 0
        });
        let (status, body) = call(&app, Method::POST, "/api/sale", Some(&token), Some(sale)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert!(body["sale_id"].as_i64().is_some());

        let too_many = json!({
            "items": [{"barcode": "001", "name": "Ayran", "quantity": 8, "price": 5.0}],
            "total": 40.0,
            "payment_method": "cash",
            "cash_amount": 40.0
        });
        let (status, body) = call(&app, Method::POST, "/api/sale", Some(&token), Some(too_many)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INSUFFICIENT_STOCK");

        let (_, body) = call(&app, Method::GET, "/api/products/001", Some(&token), None).await;
        assert_eq!(body["product"]["quantity"], 7);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/cash/close",
            Some(&token),
            Some(json!({"final_amount": 115.0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["expected_cash"], 115.0);
        assert_eq!(body["summary"]["difference"], 0.0);
    }

    #[tokio::test]
    async fn test_validation_lists_every_error() {
        let app = app().await;
        let token = login(&app).await;

        let sale = json!({"items": [], "total": 0, "payment_method": "cheque"});
        let (status, body) = call(&app, Method::POST, "/api/sale", Some(&token), Some(sale)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["errors"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_till_double_open() {
        let app = app().await;
        let token = login(&app).await;
        let open = json!({"initial_amount": 50});

        let (status, _) = call(&app, Method::POST, "/api/cash/open", Some(&token), Some(open.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&app, Method::POST, "/api/cash/open", Some(&token), Some(open)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "ALREADY_OPEN");

        let (_, body) = call(&app, Method::GET, "/api/cash/status", Some(&token), None).await;
        assert_eq!(body["cash_register"]["is_open"], true);
        assert_eq!(body["cash_register"]["expected_cash"], 50.0);
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let app = app().await;
        let token = login(&app).await;
        let (status, body) = call(&app, Method::POST, "/api/cash/open", Some(&token), Some(json!({"amount": 5}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }
}
