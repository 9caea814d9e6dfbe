//! HTTP API for the order and inventory core.
//!
//! Provides REST endpoints for placing and managing orders, bulk order
//! actions, payment capture and product stock, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use inventory::TracingNotifier;
use metrics_exporter_prometheus::PrometheusHandle;
use payments::{
    CardPaymentProvider, InMemoryCardGateway, InMemoryWalletGateway, ProviderRegistry,
    SimulatedProvider, WalletPaymentProvider,
};
use saga::InMemoryCustomerDirectory;
use store::Datastore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Datastore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/bulk", post(routes::orders::bulk::<S>))
        .route(
            "/orders/{id}",
            get(routes::orders::get::<S>).patch(routes::orders::update::<S>),
        )
        .route("/payments", post(routes::payments::process::<S>))
        .route("/products/{id}", get(routes::products::get::<S>))
        .route(
            "/products/{id}/movements",
            get(routes::products::movements::<S>),
        )
        .route("/products/{id}/adjust", post(routes::products::adjust::<S>))
        .route(
            "/products/{id}/reconciliation",
            get(routes::products::reconcile::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Payment providers available without external gateway credentials.
///
/// Card and wallet run against sandbox gateways; the remaining methods are
/// simulated and complete after the configured delay.
pub fn default_providers(config: &Config) -> ProviderRegistry {
    ProviderRegistry::new()
        .register(
            "card",
            Arc::new(CardPaymentProvider::new(Arc::new(
                InMemoryCardGateway::new(),
            ))),
        )
        .register(
            "wallet",
            Arc::new(WalletPaymentProvider::new(
                Arc::new(InMemoryWalletGateway::new()),
                config.wallet_config(),
            )),
        )
        .register(
            "bank_transfer",
            Arc::new(SimulatedProvider::new(
                "bank_transfer",
                config.simulated_provider_config(),
            )),
        )
        .register(
            "mobile_money",
            Arc::new(SimulatedProvider::new(
                "mobile_money",
                config.simulated_provider_config(),
            )),
        )
}

/// Creates the default application state: logging notifier, in-memory
/// customer directory and the default payment providers.
pub fn create_default_state<S: Datastore + Clone + 'static>(
    store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    Arc::new(AppState::new(
        store,
        config.ledger_config(),
        Arc::new(TracingNotifier),
        Arc::new(InMemoryCustomerDirectory::new()),
        default_providers(config),
        config.default_currency.clone(),
    ))
}
