//! Read-only inventory endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use domain::Product;

use crate::AppState;
use crate::error::ApiError;

/// GET /api/v1/inventory/products
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.inventory.list_products().await?))
}

/// GET /api/v1/inventory/products/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product_id = ProductId::new(id);
    state
        .inventory
        .get_product(&product_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))
}

/// GET /api/v1/inventory/products/low-stock/{threshold}: products with
/// fewer than `threshold` units available.
pub async fn low_stock(
    State(state): State<Arc<AppState>>,
    Path(threshold): Path<String>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let threshold: i64 = threshold
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid threshold".to_string()))?;

    Ok(Json(state.inventory.low_stock(threshold).await?))
}
