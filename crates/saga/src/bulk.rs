//! Bulk order actions.

use std::collections::HashMap;

use chrono::Utc;
use common::{OrderId, ProductId};
use domain::{Order, OrderStatus, PaymentStatus, StockLine};
use inventory::{MovementContext, StockChangeReport, StockLedger};
use serde::Serialize;
use store::{Datastore, OrderFilter, OrderUpdate};
use uuid::Uuid;

use crate::error::{Result, SagaError};

/// Movement reason written for bulk cancellations.
pub const BULK_CANCEL_REASON: &str = "bulk order cancellation";

/// One action applied to many orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "status", rename_all = "snake_case")]
pub enum BulkAction {
    UpdateStatus(OrderStatus),
    MarkPaid,
    MarkShipped,
    StartProduction,
    CancelOrders,
}

impl BulkAction {
    /// Parses an action tag; `update_status` needs a target status.
    pub fn parse(action: &str, status: Option<OrderStatus>) -> Result<Self> {
        match (action, status) {
            ("update_status", Some(OrderStatus::Cancelled)) => Err(SagaError::Validation(
                "use cancel_orders to cancel orders in bulk".to_string(),
            )),
            ("update_status", Some(status)) => Ok(BulkAction::UpdateStatus(status)),
            ("update_status", None) => Err(SagaError::Validation(
                "update_status requires a status".to_string(),
            )),
            ("mark_paid", _) => Ok(BulkAction::MarkPaid),
            ("mark_shipped", _) => Ok(BulkAction::MarkShipped),
            ("start_production", _) => Ok(BulkAction::StartProduction),
            ("cancel_orders", _) => Ok(BulkAction::CancelOrders),
            (other, _) => Err(SagaError::Validation(format!(
                "unknown bulk action: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::UpdateStatus(_) => "update_status",
            BulkAction::MarkPaid => "mark_paid",
            BulkAction::MarkShipped => "mark_shipped",
            BulkAction::StartProduction => "start_production",
            BulkAction::CancelOrders => "cancel_orders",
        }
    }

    /// Computes the updated order, `None` if it is already in the target state.
    fn apply(&self, order: &Order) -> std::result::Result<Option<Order>, String> {
        let now = Utc::now();
        let mut updated = order.clone();
        let target = match self {
            BulkAction::MarkPaid => {
                if order.payment_status == PaymentStatus::Paid {
                    return Ok(None);
                }
                if order.status == OrderStatus::Cancelled {
                    return Err("cancelled orders cannot be marked paid".to_string());
                }
                updated.payment_status = PaymentStatus::Paid;
                updated.updated_at = now;
                return Ok(Some(updated));
            }
            BulkAction::UpdateStatus(status) => *status,
            BulkAction::MarkShipped => OrderStatus::Shipped,
            BulkAction::StartProduction => OrderStatus::Processing,
            BulkAction::CancelOrders => OrderStatus::Cancelled,
        };

        if order.status == target {
            return Ok(None);
        }
        updated.transition(target, now).map_err(|e| e.to_string())?;
        Ok(Some(updated))
    }
}

/// Which orders a bulk action targets.
#[derive(Debug, Clone)]
pub enum BulkTarget {
    Ids(Vec<OrderId>),
    Filter(OrderFilter),
}

/// A bulk action request.
#[derive(Debug, Clone)]
pub struct BulkRequest {
    pub action: BulkAction,
    pub target: BulkTarget,
    pub performed_by: Option<String>,
}

/// An order left untouched by a bulk action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedOrder {
    pub order_id: OrderId,
    pub reason: String,
}

/// What a bulk action did.
#[derive(Debug, Clone, Serialize)]
pub struct BulkOutcome {
    pub action: BulkAction,
    pub affected_count: usize,
    pub affected: Vec<OrderId>,
    pub rejected: Vec<RejectedOrder>,
    /// Present for `cancel_orders`.
    pub restoration: Option<StockChangeReport>,
    pub message: String,
}

/// Applies one action to many orders.
///
/// Simple actions update every eligible order and report the rest as
/// rejected. `cancel_orders` is all or nothing with respect to eligibility
/// and returns stock with one ledger call per distinct product.
pub struct BulkOrderAggregator<S> {
    store: S,
    ledger: StockLedger<S>,
}

impl<S: Datastore + Clone> BulkOrderAggregator<S> {
    /// Creates a new bulk aggregator.
    pub fn new(ledger: StockLedger<S>) -> Self {
        Self {
            store: ledger.store().clone(),
            ledger,
        }
    }

    /// Runs a bulk action.
    #[tracing::instrument(skip(self, request), fields(action = request.action.as_str()))]
    pub async fn execute(&self, request: BulkRequest) -> Result<BulkOutcome> {
        metrics::counter!("bulk_actions_total", "action" => request.action.as_str()).increment(1);

        let (orders, missing) = self.resolve(&request.target).await?;
        let outcome = match request.action {
            BulkAction::CancelOrders => {
                if !missing.is_empty() {
                    return Err(SagaError::NotFound {
                        entity: "Order",
                        id: join_ids(&missing),
                    });
                }
                self.cancel_orders(orders, request.performed_by).await?
            }
            action => self.update_orders(action, orders, missing).await?,
        };

        tracing::info!(
            affected = outcome.affected_count,
            rejected = outcome.rejected.len(),
            "bulk action finished"
        );
        Ok(outcome)
    }

    async fn resolve(&self, target: &BulkTarget) -> Result<(Vec<Order>, Vec<OrderId>)> {
        match target {
            BulkTarget::Ids(ids) => {
                if ids.is_empty() {
                    return Err(SagaError::Validation("no orders selected".to_string()));
                }
                let orders = self
                    .store
                    .list_orders(&OrderFilter::for_ids(ids.clone()))
                    .await?;
                let missing = ids
                    .iter()
                    .filter(|id| !orders.iter().any(|o| o.id == **id))
                    .copied()
                    .collect();
                Ok((orders, missing))
            }
            BulkTarget::Filter(filter) => {
                if filter.is_unbounded() {
                    return Err(SagaError::Validation(
                        "bulk filters must narrow the order set".to_string(),
                    ));
                }
                Ok((self.store.list_orders(filter).await?, Vec::new()))
            }
        }
    }

    async fn update_orders(
        &self,
        action: BulkAction,
        orders: Vec<Order>,
        missing: Vec<OrderId>,
    ) -> Result<BulkOutcome> {
        let mut rejected: Vec<RejectedOrder> = missing
            .into_iter()
            .map(|order_id| RejectedOrder {
                order_id,
                reason: "order not found".to_string(),
            })
            .collect();

        let mut updates = Vec::with_capacity(orders.len());
        for order in &orders {
            match action.apply(order) {
                Ok(Some(updated)) => updates.push(OrderUpdate::new(updated, order.status)),
                Ok(None) => {}
                Err(reason) => rejected.push(RejectedOrder {
                    order_id: order.id,
                    reason,
                }),
            }
        }

        let attempted: Vec<OrderId> = updates.iter().map(|u| u.order.id).collect();
        let affected = self.store.update_orders(updates).await?;
        reject_stale(&attempted, &affected, &mut rejected);

        Ok(BulkOutcome {
            action,
            affected_count: affected.len(),
            message: format!("{} order(s) updated", affected.len()),
            affected,
            rejected,
            restoration: None,
        })
    }

    async fn cancel_orders(
        &self,
        orders: Vec<Order>,
        performed_by: Option<String>,
    ) -> Result<BulkOutcome> {
        let blocking: Vec<OrderId> = orders
            .iter()
            .filter(|o| o.status.is_fulfilled())
            .map(|o| o.id)
            .collect();
        if !blocking.is_empty() {
            return Err(SagaError::conflict(
                format!(
                    "{} order(s) already shipped or delivered: {}",
                    blocking.len(),
                    join_ids(&blocking)
                ),
                blocking,
            ));
        }

        let mut updates = Vec::with_capacity(orders.len());
        for order in &orders {
            if let Ok(Some(updated)) = BulkAction::CancelOrders.apply(order) {
                updates.push(OrderUpdate::new(updated, order.status));
            }
        }

        let attempted: Vec<OrderId> = updates.iter().map(|u| u.order.id).collect();
        let cancelled = self.store.update_orders(updates).await?;
        let mut rejected = Vec::new();
        reject_stale(&attempted, &cancelled, &mut rejected);
        metrics::counter!("orders_cancelled_total").increment(cancelled.len() as u64);

        let restoration = self.restore_stock(&cancelled, performed_by).await?;

        Ok(BulkOutcome {
            action: BulkAction::CancelOrders,
            affected_count: cancelled.len(),
            message: format!("{} order(s) cancelled", cancelled.len()),
            affected: cancelled,
            rejected,
            restoration: Some(restoration),
        })
    }

    /// Returns the stock of every cancelled order, one ledger call per product.
    async fn restore_stock(
        &self,
        cancelled: &[OrderId],
        performed_by: Option<String>,
    ) -> Result<StockChangeReport> {
        let mut report = StockChangeReport::default();
        if cancelled.is_empty() {
            return Ok(report);
        }

        let items = self.store.get_items_for_orders(cancelled).await?;
        let mut totals: HashMap<ProductId, u32> = HashMap::new();
        let mut order: Vec<ProductId> = Vec::new();
        for item in &items {
            let total = totals.entry(item.product_id).or_insert_with(|| {
                order.push(item.product_id);
                0
            });
            *total = total.saturating_add(item.quantity);
        }

        let ctx = MovementContext::new(BULK_CANCEL_REASON)
            .reference(format!("bulk-{}", Uuid::new_v4()))
            .performed_by(performed_by);

        for product_id in order {
            let quantity = totals[&product_id];
            match self
                .ledger
                .add(&[StockLine::new(product_id, quantity)], &ctx)
                .await
            {
                Ok(line) => {
                    report.movements.extend(line.movements);
                    report.alerts.extend(line.alerts);
                    report.failed.extend(line.failed);
                }
                Err(e) => {
                    metrics::counter!("stock_restoration_failures_total").increment(1);
                    tracing::error!(%product_id, quantity, error = %e, "bulk stock restoration failed");
                    report.failed.push(inventory::FailedLine {
                        product_id,
                        quantity,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

fn reject_stale(attempted: &[OrderId], written: &[OrderId], rejected: &mut Vec<RejectedOrder>) {
    for id in attempted.iter().filter(|id| !written.contains(id)) {
        rejected.push(RejectedOrder {
            order_id: *id,
            reason: "order changed concurrently".to_string(),
        });
    }
}

fn join_ids(ids: &[OrderId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_actions() {
        assert_eq!(
            BulkAction::parse("update_status", Some(OrderStatus::Shipped)).unwrap(),
            BulkAction::UpdateStatus(OrderStatus::Shipped)
        );
        assert_eq!(
            BulkAction::parse("mark_paid", None).unwrap(),
            BulkAction::MarkPaid
        );
        assert_eq!(
            BulkAction::parse("cancel_orders", None).unwrap(),
            BulkAction::CancelOrders
        );
    }

    #[test]
    fn parse_rejects_unknown_and_incomplete_actions() {
        for (action, status) in [
            ("archive", None),
            ("update_status", None),
            ("update_status", Some(OrderStatus::Cancelled)),
        ] {
            assert!(matches!(
                BulkAction::parse(action, status),
                Err(SagaError::Validation(_))
            ));
        }
    }
}
