//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::LedgerError;
use payments::PaymentError;
use saga::SagaError;
use serde_json::{Map, Value, json};
use store::StoreError;

/// API-level error type that maps to HTTP responses.
///
/// Every response body is a JSON object with an `error` message, plus
/// detail fields for stock shortfalls, conflicts and voided orders.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Order creation, lifecycle or bulk error.
    Saga(SagaError),
    /// Stock ledger error.
    Ledger(LedgerError),
    /// Payment capture error.
    Payment(PaymentError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, detail) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, Map::new()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, Map::new()),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Ledger(err) => ledger_error_to_response(err),
            ApiError::Payment(err) => payment_error_to_response(err),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, Map::new()),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        }

        let mut body = detail;
        body.insert("error".to_string(), Value::String(message));
        (status, axum::Json(Value::Object(body))).into_response()
    }
}

fn detail(pairs: Value) -> Map<String, Value> {
    match pairs {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String, Map<String, Value>) {
    let message = err.to_string();
    match err {
        SagaError::Validation(_) => (StatusCode::BAD_REQUEST, message, Map::new()),
        SagaError::NotFound { .. } => (StatusCode::NOT_FOUND, message, Map::new()),
        SagaError::InsufficientStock { shortfalls } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            message,
            detail(json!({ "items": shortfalls })),
        ),
        SagaError::Conflict { order_ids, .. } => (
            StatusCode::CONFLICT,
            message,
            detail(json!({ "order_ids": order_ids })),
        ),
        SagaError::InventoryProcessing(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
            detail(json!({ "voided": true })),
        ),
        SagaError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, message, Map::new()),
    }
}

fn ledger_error_to_response(err: LedgerError) -> (StatusCode, String, Map<String, Value>) {
    let message = err.to_string();
    match err {
        LedgerError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, message, Map::new()),
        LedgerError::ProductNotFound(_) => (StatusCode::NOT_FOUND, message, Map::new()),
        LedgerError::InsufficientStock { shortfalls } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            message,
            detail(json!({ "items": shortfalls })),
        ),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, message, Map::new()),
    }
}

fn payment_error_to_response(err: PaymentError) -> (StatusCode, String, Map<String, Value>) {
    let message = err.to_string();
    if let PaymentError::CaptureNotRecorded {
        provider_reference, ..
    } = &err
    {
        return (
            StatusCode::CONFLICT,
            message,
            detail(json!({ "captured": true, "provider_reference": provider_reference })),
        );
    }
    let status = match &err {
        PaymentError::UnknownMethod(_) | PaymentError::InvalidPaymentData(_) => {
            StatusCode::BAD_REQUEST
        }
        PaymentError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        PaymentError::InvalidOrderState { .. } => StatusCode::CONFLICT,
        PaymentError::Store(StoreError::StatusChanged { .. }) => StatusCode::CONFLICT,
        PaymentError::Provider { .. } => StatusCode::BAD_GATEWAY,
        PaymentError::Store(_) | PaymentError::CaptureNotRecorded { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, message, Map::new())
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Saga(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderId, ProductId};
    use inventory::ItemAvailability;

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn insufficient_stock_lists_items() {
        let product_id = ProductId::new();
        let err = SagaError::InsufficientStock {
            shortfalls: vec![ItemAvailability {
                product_id,
                product_name: Some("Widget".to_string()),
                requested: 20,
                in_stock: 3,
                managed: true,
                available: false,
            }],
        };

        let (status, body) = render(err.into()).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["items"][0]["requested"], 20);
        assert_eq!(body["items"][0]["in_stock"], 3);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn voided_orders_are_flagged() {
        let (status, body) =
            render(SagaError::InventoryProcessing("disk full".to_string()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["voided"], true);
    }

    #[tokio::test]
    async fn unrecorded_captures_carry_the_provider_reference() {
        let (status, body) = render(
            PaymentError::CaptureNotRecorded {
                order_id: OrderId::new(),
                provider_reference: "pi_9".to_string(),
                reason: "order changed".to_string(),
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["captured"], true);
        assert_eq!(body["provider_reference"], "pi_9");
    }

    #[tokio::test]
    async fn status_codes_follow_error_kind() {
        let order_id = OrderId::new();
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (SagaError::Validation("x".into()).into(), StatusCode::BAD_REQUEST),
            (SagaError::order_not_found(order_id).into(), StatusCode::NOT_FOUND),
            (
                SagaError::conflict("shipped", vec![order_id]).into(),
                StatusCode::CONFLICT,
            ),
            (
                PaymentError::provider("card", "timeout").into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                PaymentError::UnknownMethod("cheque".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                LedgerError::ProductNotFound(ProductId::new()).into(),
                StatusCode::NOT_FOUND,
            ),
        ];

        for (err, expected) in cases {
            let (status, _) = render(err).await;
            assert_eq!(status, expected);
        }
    }
}
