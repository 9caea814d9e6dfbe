//! Order endpoints: creation, lookup, lifecycle updates and bulk actions.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{CustomerId, OrderId};
use domain::{Money, OrderCharges, OrderPatch, OrderStatus, PaymentStatus};
use inventory::StockAlert;
use saga::{
    BulkAction, BulkOutcome, BulkRequest, BulkTarget, CreateOrderRequest, CustomerDetails,
    OrderDetails, OrderLineRequest, OrderUpdateOutcome,
};
use serde::{Deserialize, Serialize};
use store::{Datastore, OrderFilter};

use crate::error::ApiError;
use crate::state::AppState;

/// Largest page `GET /orders` returns.
const MAX_PAGE_SIZE: usize = 200;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderBody {
    pub customer: CustomerDetails,
    pub items: Vec<OrderLineRequest>,
    pub payment_method: String,
    pub currency: Option<String>,
    #[serde(default)]
    pub tax_cents: i64,
    #[serde(default)]
    pub shipping_cents: i64,
    pub notes: Option<String>,
    pub performed_by: Option<String>,
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub customer_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct UpdateOrderBody {
    #[serde(flatten)]
    pub patch: OrderPatch,
    pub performed_by: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct BulkFilters {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub customer_id: Option<CustomerId>,
}

#[derive(Deserialize)]
pub struct BulkActionBody {
    pub action: String,
    pub status: Option<OrderStatus>,
    pub order_ids: Option<Vec<OrderId>>,
    pub filters: Option<BulkFilters>,
    pub performed_by: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: OrderId,
    pub order_number: String,
    pub total: Money,
    pub currency: String,
    pub alerts: Vec<StockAlert>,
}

// -- Handlers --

/// POST /orders: place an order and deduct its stock.
#[tracing::instrument(skip(state, body), fields(lines = body.items.len()))]
pub async fn create<S: Datastore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<CreateOrderBody>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let currency = body
        .currency
        .unwrap_or_else(|| state.default_currency.clone());
    let mut request =
        CreateOrderRequest::new(body.customer, body.items, body.payment_method, currency)
            .charges(OrderCharges {
                tax: Money::from_cents(body.tax_cents),
                shipping: Money::from_cents(body.shipping_cents),
            });
    if let Some(notes) = body.notes {
        request = request.notes(notes);
    }
    request.performed_by = body.performed_by;

    let placed = state.orders.create_order(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order_id: placed.order.id,
            order_number: placed.order.order_number,
            total: placed.order.total,
            currency: placed.order.currency,
            alerts: placed.alerts,
        }),
    ))
}

/// GET /orders: list orders, newest first.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: Datastore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<domain::Order>>, ApiError> {
    let mut filter = OrderFilter::new()
        .limit(query.limit.unwrap_or(50).min(MAX_PAGE_SIZE))
        .offset(query.offset.unwrap_or(0));
    if let Some(status) = query.status {
        filter = filter.status(status.parse().map_err(bad_request)?);
    }
    if let Some(payment_status) = query.payment_status {
        filter = filter.payment_status(payment_status.parse().map_err(bad_request)?);
    }
    if let Some(customer_id) = query.customer_id {
        let customer_id = CustomerId::parse(&customer_id)
            .map_err(|e| ApiError::BadRequest(format!("Invalid customer_id: {e}")))?;
        filter = filter.customer(customer_id);
    }

    Ok(Json(state.lifecycle.list_orders(&filter).await?))
}

/// GET /orders/{id}: load an order with its lines.
#[tracing::instrument(skip(state))]
pub async fn get<S: Datastore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetails>, ApiError> {
    let order_id = parse_order_id(&id)?;
    Ok(Json(state.lifecycle.get_order(order_id).await?))
}

/// PATCH /orders/{id}: change status, payment status or notes.
#[tracing::instrument(skip(state, body))]
pub async fn update<S: Datastore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateOrderBody>,
) -> Result<Json<OrderUpdateOutcome>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let outcome = state
        .lifecycle
        .update_order(order_id, body.patch, body.performed_by)
        .await?;
    Ok(Json(outcome))
}

/// POST /orders/bulk: apply one action to many orders.
#[tracing::instrument(skip(state, body), fields(action = %body.action))]
pub async fn bulk<S: Datastore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<BulkActionBody>,
) -> Result<Json<BulkOutcome>, ApiError> {
    let action = BulkAction::parse(&body.action, body.status)?;

    let target = match (body.order_ids, body.filters) {
        (Some(ids), _) => BulkTarget::Ids(ids),
        (None, Some(filters)) => BulkTarget::Filter(OrderFilter {
            status: filters.status,
            payment_status: filters.payment_status,
            customer_id: filters.customer_id,
            ..Default::default()
        }),
        (None, None) => {
            return Err(ApiError::BadRequest(
                "either order_ids or filters is required".to_string(),
            ));
        }
    };

    let outcome = state
        .bulk
        .execute(BulkRequest {
            action,
            target,
            performed_by: body.performed_by,
        })
        .await?;
    Ok(Json(outcome))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))
}

fn bad_request(err: domain::DomainError) -> ApiError {
    ApiError::BadRequest(err.to_string())
}
