//! Payment capture endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::OrderId;
use payments::PaymentOutcome;
use serde::Deserialize;
use store::Datastore;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ProcessPaymentBody {
    pub order_id: OrderId,
    pub payment_method: String,
    #[serde(default)]
    pub payment_data: serde_json::Value,
}

/// POST /payments: run a payment through the order's provider.
///
/// Returns the normalized outcome; only `completed` changes the order.
#[tracing::instrument(skip(state, body), fields(order_id = %body.order_id, method = %body.payment_method))]
pub async fn process<S: Datastore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<ProcessPaymentBody>,
) -> Result<Json<PaymentOutcome>, ApiError> {
    let outcome = state
        .payments
        .process_payment(body.order_id, &body.payment_method, body.payment_data)
        .await?;
    Ok(Json(outcome))
}
