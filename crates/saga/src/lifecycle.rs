//! Order lifecycle manager: status transitions and their stock effect.

use chrono::Utc;
use common::OrderId;
use domain::{Order, OrderItem, OrderPatch, OrderStatus};
use inventory::{MovementContext, StockChangeReport, StockLedger};
use serde::Serialize;
use store::{Datastore, DatastoreExt, OrderFilter, OrderUpdate};

use crate::error::{Result, SagaError};

/// An order with its lines.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Stock restoration performed for an accepted cancellation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CancellationReport {
    pub restoration: StockChangeReport,
    /// Set when restoration could not run at all.
    pub error: Option<String>,
}

impl CancellationReport {
    /// Returns true if every cancelled unit went back on the shelf.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.restoration.is_complete()
    }
}

/// Result of a lifecycle update.
#[derive(Debug, Clone, Serialize)]
pub struct OrderUpdateOutcome {
    pub order: Order,
    /// Present only when this update cancelled the order.
    pub cancellation: Option<CancellationReport>,
}

/// Applies status and field updates to single orders.
///
/// The status write is guarded on the status the update was computed from,
/// so a cancellation can only be accepted once and only that accepting
/// request restores stock.
pub struct OrderLifecycleManager<S> {
    store: S,
    ledger: StockLedger<S>,
}

impl<S: Datastore + Clone> OrderLifecycleManager<S> {
    /// Creates a new lifecycle manager.
    pub fn new(ledger: StockLedger<S>) -> Self {
        Self {
            store: ledger.store().clone(),
            ledger,
        }
    }

    /// Loads an order and its lines.
    pub async fn get_order(&self, order_id: OrderId) -> Result<OrderDetails> {
        let order = self.store.require_order(order_id).await?;
        let items = self.store.get_order_items(order_id).await?;
        Ok(OrderDetails { order, items })
    }

    /// Lists orders matching a filter, newest first.
    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        Ok(self.store.list_orders(filter).await?)
    }

    /// Applies a patch to one order.
    ///
    /// Moving to `cancelled` from `pending` or `processing` returns the
    /// order's stock. Restoration failures are logged and reported on the
    /// outcome; they do not undo the cancellation.
    #[tracing::instrument(skip(self, patch), fields(status = ?patch.status))]
    pub async fn update_order(
        &self,
        order_id: OrderId,
        patch: OrderPatch,
        performed_by: Option<String>,
    ) -> Result<OrderUpdateOutcome> {
        if patch.is_empty() {
            return Err(SagaError::Validation("nothing to update".to_string()));
        }

        let current = self.store.require_order(order_id).await?;
        let expected = current.status;
        let mut updated = current;
        let previous = updated
            .apply_patch(&patch, Utc::now())
            .map_err(|e| SagaError::conflict(e.to_string(), vec![order_id]))?;

        self.store
            .update_order(OrderUpdate::new(updated.clone(), expected))
            .await?;

        let cancellation = match previous {
            Some(from) if updated.status == OrderStatus::Cancelled => {
                metrics::counter!("orders_cancelled_total").increment(1);
                tracing::info!(%order_id, %from, "order cancelled");
                Some(self.restore_stock(order_id, performed_by).await)
            }
            Some(from) => {
                tracing::info!(%order_id, %from, to = %updated.status, "order status changed");
                None
            }
            None => None,
        };

        Ok(OrderUpdateOutcome {
            order: updated,
            cancellation,
        })
    }

    /// Cancels one order.
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        performed_by: Option<String>,
    ) -> Result<OrderUpdateOutcome> {
        self.update_order(
            order_id,
            OrderPatch::status(OrderStatus::Cancelled),
            performed_by,
        )
        .await
    }

    async fn restore_stock(
        &self,
        order_id: OrderId,
        performed_by: Option<String>,
    ) -> CancellationReport {
        let items = match self.store.get_order_items(order_id).await {
            Ok(items) => items,
            Err(e) => return restoration_failed(order_id, e.to_string()),
        };
        let lines: Vec<_> = items.iter().map(OrderItem::stock_line).collect();
        if lines.is_empty() {
            return CancellationReport::default();
        }

        let ctx = MovementContext::new(format!("order cancelled: {order_id}"))
            .reference(order_id.to_string())
            .performed_by(performed_by);

        match self.ledger.add(&lines, &ctx).await {
            Ok(restoration) => {
                if !restoration.is_complete() {
                    tracing::error!(
                        %order_id,
                        failed_lines = restoration.failed.len(),
                        "stock restoration incomplete after cancellation"
                    );
                }
                CancellationReport {
                    restoration,
                    error: None,
                }
            }
            Err(e) => restoration_failed(order_id, e.to_string()),
        }
    }
}

fn restoration_failed(order_id: OrderId, error: String) -> CancellationReport {
    metrics::counter!("stock_restoration_failures_total").increment(1);
    tracing::error!(%order_id, %error, "stock restoration failed after cancellation");
    CancellationReport {
        restoration: StockChangeReport::default(),
        error: Some(error),
    }
}
