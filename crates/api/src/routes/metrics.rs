//! Prometheus metrics endpoint and metric descriptions.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use metrics::{Unit, describe_counter, describe_histogram};
use metrics_exporter_prometheus::PrometheusHandle;

/// Registers help text for every metric the services emit.
pub fn describe() {
    describe_counter!("orders_created_total", "Orders placed successfully");
    describe_counter!(
        "order_creation_failed_total",
        "Order placements that failed, by reason"
    );
    describe_counter!(
        "order_saga_compensations_total",
        "Order sagas that had to undo written rows, by failed step"
    );
    describe_histogram!(
        "order_saga_duration_seconds",
        Unit::Seconds,
        "Duration of the order creation saga"
    );
    describe_counter!("stock_movements_total", "Stock movements written, by type");
    describe_counter!("stock_alerts_total", "Stock alerts raised, by kind");
    describe_counter!(
        "stock_restoration_failures_total",
        "Stock restorations that could not be written"
    );
    describe_counter!("orders_cancelled_total", "Orders moved to cancelled");
    describe_counter!("bulk_actions_total", "Bulk order actions, by action");
    describe_counter!(
        "payments_processed_total",
        "Payment attempts, by method and outcome"
    );
    describe_counter!(
        "payments_unrecorded_total",
        "Captured payments that could not be recorded on their order"
    );
}

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
