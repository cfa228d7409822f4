//! Product catalog. A missing barcode answers 404 here, unlike the sale
//! preflight.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::dto::{ApiJson, ProductBody, ProductPatchBody, ProductView};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn list(State(state): State<AppState>, _user: AuthUser) -> ApiResult<Json<Value>> {
    let products = state.engine.catalog.list_products().await?;
    let products: Vec<ProductView> = products.iter().map(ProductView::from).collect();
    Ok(Json(json!({ "status": "success", "products": products })))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(body): ApiJson<ProductBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let draft = body.into_draft()?;
    let product = state.engine.catalog.create_product(draft, &user.actor).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": format!("Product {} created", product.barcode),
            "product": ProductView::from(&product),
        })),
    ))
}

pub async fn get_one(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(barcode): Path<String>,
) -> ApiResult<Json<Value>> {
    let product = state
        .engine
        .catalog
        .get_product(&barcode)
        .await
        .map_err(ApiError::catalog)?;
    Ok(Json(json!({ "status": "success", "product": ProductView::from(&product) })))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(barcode): Path<String>,
    ApiJson(body): ApiJson<ProductPatchBody>,
) -> ApiResult<Json<Value>> {
    let patch = body.into_patch()?;
    let product = state
        .engine
        .catalog
        .update_product(&barcode, patch, &user.actor)
        .await
        .map_err(ApiError::catalog)?;

    Ok(Json(json!({
        "status": "success",
        "message": format!("Product {} updated", product.barcode),
        "product": ProductView::from(&product),
    })))
}

pub async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path(barcode): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .engine
        .catalog
        .delete_product(&barcode, &user.actor)
        .await
        .map_err(ApiError::catalog)?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("Product {} deleted", barcode),
    })))
}
