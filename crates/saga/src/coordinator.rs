//! Saga coordinator for order creation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use common::ProductId;
use domain::{Order, OrderCharges, OrderItem, PricedLine, StockLine};
use inventory::{MovementContext, StockAlert, StockLedger};
use serde::{Deserialize, Serialize};
use store::Datastore;

use crate::compensation::{CompensableStep, SagaLog};
use crate::error::{Result, SagaError};
use crate::order_creation;
use crate::services::customer::{CustomerDetails, CustomerDirectory};

/// One requested order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Everything needed to place an order.
///
/// Unit prices are taken from the catalog at placement time; tax and
/// shipping are supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrderRequest {
    pub customer: CustomerDetails,
    pub items: Vec<OrderLineRequest>,
    pub payment_method: String,
    pub currency: String,
    pub charges: OrderCharges,
    pub notes: Option<String>,
    pub performed_by: Option<String>,
}

impl CreateOrderRequest {
    pub fn new(
        customer: CustomerDetails,
        items: Vec<OrderLineRequest>,
        payment_method: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            customer,
            items,
            payment_method: payment_method.into(),
            currency: currency.into(),
            charges: OrderCharges::default(),
            notes: None,
            performed_by: None,
        }
    }

    pub fn charges(mut self, charges: OrderCharges) -> Self {
        self.charges = charges;
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(SagaError::Validation(
                "order must contain at least one item".to_string(),
            ));
        }
        if let Some(line) = self.items.iter().find(|l| l.quantity == 0) {
            return Err(SagaError::Validation(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }
        if self.payment_method.trim().is_empty() {
            return Err(SagaError::Validation(
                "payment method is required".to_string(),
            ));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(SagaError::Validation(format!(
                "invalid currency code: {}",
                self.currency
            )));
        }
        if self.charges.tax.is_negative() || self.charges.shipping.is_negative() {
            return Err(SagaError::Validation(
                "tax and shipping must not be negative".to_string(),
            ));
        }
        self.customer.validate()
    }

    fn stock_lines(&self) -> Vec<StockLine> {
        self.items
            .iter()
            .map(|l| StockLine::new(l.product_id, l.quantity))
            .collect()
    }
}

/// A successfully placed order.
#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    /// Stock alerts raised by the deduction.
    pub alerts: Vec<StockAlert>,
}

/// Orchestrates order creation across the customer directory, the order
/// tables and the stock ledger.
///
/// The saga runs resolve customer → check stock → insert order → insert
/// items → deduct stock. A failure after the first write undoes the writes
/// already made, newest first, and the caller sees the original error.
pub struct OrderSagaCoordinator<S> {
    store: S,
    ledger: StockLedger<S>,
    customers: Arc<dyn CustomerDirectory>,
}

impl<S: Datastore + Clone> OrderSagaCoordinator<S> {
    /// Creates a new saga coordinator.
    pub fn new(ledger: StockLedger<S>, customers: Arc<dyn CustomerDirectory>) -> Self {
        Self {
            store: ledger.store().clone(),
            ledger,
            customers,
        }
    }

    /// Places an order and deducts its stock, or leaves no trace.
    #[tracing::instrument(skip(self, request), fields(saga_type = order_creation::SAGA_TYPE, lines = request.items.len()))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<PlacedOrder> {
        let saga_start = std::time::Instant::now();
        let result = self.run(request).await;
        metrics::histogram!("order_saga_duration_seconds")
            .record(saga_start.elapsed().as_secs_f64());

        match &result {
            Ok(placed) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    order_id = %placed.order.id,
                    order_number = %placed.order.order_number,
                    total = %placed.order.total,
                    "order created"
                );
            }
            Err(e) => {
                metrics::counter!("order_creation_failed_total", "reason" => e.kind())
                    .increment(1);
                tracing::warn!(error = %e, "order creation failed");
            }
        }
        result
    }

    async fn run(&self, request: CreateOrderRequest) -> Result<PlacedOrder> {
        request.validate()?;
        let stock_lines = request.stock_lines();

        // 1. Customer
        tracing::info!(step = order_creation::STEP_RESOLVE_CUSTOMER, "saga step started");
        let customer_id = self.customers.resolve_or_create(&request.customer).await?;

        // 2. Stock check, before any write
        tracing::info!(step = order_creation::STEP_CHECK_STOCK, "saga step started");
        let availability = self.ledger.check_availability(&stock_lines).await?;
        if !availability.is_valid {
            return Err(SagaError::InsufficientStock {
                shortfalls: availability.shortfalls(),
            });
        }

        let lines = self.price_lines(&request).await?;
        let order = Order::place(
            customer_id,
            &lines,
            request.charges,
            request.currency,
            request.payment_method,
            request.notes,
            Utc::now(),
        )?;
        let items: Vec<OrderItem> = lines.into_iter().map(|l| l.into_item(order.id)).collect();

        let mut log = SagaLog::new();

        // 3. Order header; nothing to undo if it fails
        tracing::info!(step = order_creation::STEP_INSERT_ORDER, order_id = %order.id, "saga step started");
        self.store
            .insert_order(&order)
            .await
            .map_err(|e| SagaError::Persistence(format!("could not store order: {e}")))?;
        log.record(CompensableStep::OrderInserted { order_id: order.id });

        // 4. Order lines
        tracing::info!(step = order_creation::STEP_INSERT_ITEMS, order_id = %order.id, "saga step started");
        if let Err(e) = self.store.insert_order_items(&items).await {
            let reason = format!("could not store order items: {e}");
            self.compensate(&mut log, order_creation::STEP_INSERT_ITEMS, &reason)
                .await;
            return Err(SagaError::Persistence(reason));
        }
        log.record(CompensableStep::ItemsInserted { order_id: order.id });

        // 5. Stock; the ledger undoes its own partial deductions
        tracing::info!(step = order_creation::STEP_DEDUCT_STOCK, order_id = %order.id, "saga step started");
        let ctx = MovementContext::new(order_creation::DEDUCTION_REASON)
            .reference(order.id.to_string())
            .performed_by(request.performed_by);
        let stock = match self.ledger.deduct(&stock_lines, &ctx).await {
            Ok(report) => report,
            Err(e) => {
                let reason = e.to_string();
                self.compensate(&mut log, order_creation::STEP_DEDUCT_STOCK, &reason)
                    .await;
                return Err(SagaError::InventoryProcessing(reason));
            }
        };

        log.finish();
        Ok(PlacedOrder {
            order,
            items,
            alerts: stock.alerts,
        })
    }

    async fn price_lines(&self, request: &CreateOrderRequest) -> Result<Vec<PricedLine>> {
        let ids: Vec<ProductId> = request.items.iter().map(|l| l.product_id).collect();
        let products: HashMap<ProductId, _> = self
            .store
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        request
            .items
            .iter()
            .map(|line| -> Result<PricedLine> {
                let product = products.get(&line.product_id).ok_or(SagaError::NotFound {
                    entity: "Product",
                    id: line.product_id.to_string(),
                })?;
                Ok(PricedLine::from_product(product, line.quantity)?)
            })
            .collect()
    }

    /// Undoes committed steps in reverse order.
    ///
    /// Undo failures are logged and recorded on the saga log; the caller
    /// still reports the error that triggered compensation.
    #[tracing::instrument(skip(self, log))]
    async fn compensate(&self, log: &mut SagaLog, failed_step: &'static str, reason: &str) {
        metrics::counter!("order_saga_compensations_total", "step" => failed_step).increment(1);

        for step in log.fail(failed_step, reason) {
            let result = match step {
                CompensableStep::ItemsInserted { order_id } => {
                    self.store.delete_order_items(order_id).await
                }
                CompensableStep::OrderInserted { order_id } => {
                    self.store.delete_order(order_id).await
                }
            };

            match result {
                Ok(()) => log.compensated(step, None),
                Err(e) => {
                    tracing::error!(step = step.name(), error = %e, "compensation step failed");
                    log.compensated(step, Some(e.to_string()));
                }
            }
        }

        log.finish();
        tracing::warn!(
            failed_step,
            orphans = log.has_orphans(),
            "order saga compensated"
        );
    }
}
