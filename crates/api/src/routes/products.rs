//! Product stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use domain::{Product, StockMovement};
use inventory::{MovementContext, ReconciliationReport, StockChangeReport};
use serde::Deserialize;
use store::Datastore;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AdjustStockBody {
    /// New absolute stock level.
    pub quantity: i64,
    pub reason: String,
    pub performed_by: Option<String>,
}

/// GET /products/{id}: current stock and status of a product.
#[tracing::instrument(skip(state))]
pub async fn get<S: Datastore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product_id = parse_product_id(&id)?;
    state
        .store
        .get_product(product_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))
}

/// GET /products/{id}/movements: stock movement history, oldest first.
#[tracing::instrument(skip(state))]
pub async fn movements<S: Datastore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StockMovement>>, ApiError> {
    let product_id = parse_product_id(&id)?;
    Ok(Json(state.ledger.movements(product_id).await?))
}

/// POST /products/{id}/adjust: set stock to an absolute level.
#[tracing::instrument(skip(state, body), fields(quantity = body.quantity))]
pub async fn adjust<S: Datastore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(body): Json<AdjustStockBody>,
) -> Result<Json<StockChangeReport>, ApiError> {
    let product_id = parse_product_id(&id)?;
    if body.reason.trim().is_empty() {
        return Err(ApiError::BadRequest("reason is required".to_string()));
    }

    let ctx = MovementContext::new(body.reason).performed_by(body.performed_by);
    Ok(Json(state.ledger.adjust(product_id, body.quantity, &ctx).await?))
}

/// GET /products/{id}/reconciliation: compare cached stock with the ledger.
#[tracing::instrument(skip(state))]
pub async fn reconcile<S: Datastore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ReconciliationReport>, ApiError> {
    let product_id = parse_product_id(&id)?;
    Ok(Json(state.ledger.reconcile(product_id).await?))
}

fn parse_product_id(id: &str) -> Result<ProductId, ApiError> {
    ProductId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid product ID: {e}")))
}
