//! The stock ledger service.

use std::collections::HashMap;
use std::sync::Arc;

use common::ProductId;
use domain::{MovementRequest, Product, StockLine, StockMovement, evaluate_alert};
use serde::Serialize;
use store::{Datastore, StoreError};

use crate::error::LedgerError;
use crate::notifier::{StockAlert, StockAlertNotifier};
use crate::reconcile::{self, ReconciliationReport};

/// Ledger settings fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct LedgerConfig {
    /// Who receives low-stock and out-of-stock alerts.
    pub alert_recipients: Vec<String>,
}

/// Why a batch of movements happens, copied onto every movement it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementContext {
    pub reason: String,
    /// Order id or bulk operation id.
    pub reference: Option<String>,
    pub performed_by: Option<String>,
}

impl MovementContext {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            reference: None,
            performed_by: None,
        }
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn performed_by(mut self, performed_by: Option<String>) -> Self {
        self.performed_by = performed_by;
        self
    }

    fn request(&self, request: MovementRequest) -> MovementRequest {
        let request = request.performed_by(self.performed_by.clone());
        match &self.reference {
            Some(reference) => request.reference(reference.clone()),
            None => request,
        }
    }
}

/// Availability of one requested product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemAvailability {
    pub product_id: ProductId,
    /// `None` when the product does not exist.
    pub product_name: Option<String>,
    pub requested: u32,
    pub in_stock: i64,
    pub managed: bool,
    pub available: bool,
}

/// Outcome of an availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityReport {
    pub is_valid: bool,
    pub results: Vec<ItemAvailability>,
}

impl AvailabilityReport {
    /// Returns the items that cannot be supplied.
    pub fn shortfalls(&self) -> Vec<ItemAvailability> {
        self.results
            .iter()
            .filter(|r| !r.available)
            .cloned()
            .collect()
    }
}

/// A restoration line that could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub error: String,
}

/// What a ledger operation wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StockChangeReport {
    pub movements: Vec<StockMovement>,
    pub alerts: Vec<StockAlert>,
    pub failed: Vec<FailedLine>,
}

impl StockChangeReport {
    /// Returns true if every requested line was written.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Owns product stock levels and their movement history.
///
/// Every change goes through [`Datastore::apply_movement`], so the cached
/// stock and the movement log are written together and decreases can never
/// take stock below zero. Products with `manage_stock == false` are always
/// available and are never touched.
#[derive(Clone)]
pub struct StockLedger<S> {
    store: S,
    notifier: Arc<dyn StockAlertNotifier>,
    config: LedgerConfig,
}

impl<S: Datastore> StockLedger<S> {
    /// Creates a new stock ledger.
    pub fn new(store: S, notifier: Arc<dyn StockAlertNotifier>, config: LedgerConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Returns the underlying datastore.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Checks whether every line can be supplied from current stock.
    ///
    /// Lines for the same product are merged first. Missing products are
    /// reported as unavailable rather than failing the check.
    pub async fn check_availability(
        &self,
        items: &[StockLine],
    ) -> Result<AvailabilityReport, LedgerError> {
        let lines = merge_lines(items)?;
        let products = self.load_products(&lines).await?;
        Ok(assess(&lines, &products))
    }

    /// Removes stock for every line, or for none of them.
    ///
    /// Availability is re-checked first. If a write fails part way, the lines
    /// already deducted are restored before the error is returned.
    #[tracing::instrument(skip(self, items, ctx), fields(reason = %ctx.reason, reference = ?ctx.reference))]
    pub async fn deduct(
        &self,
        items: &[StockLine],
        ctx: &MovementContext,
    ) -> Result<StockChangeReport, LedgerError> {
        let lines = merge_lines(items)?;
        let products = self.load_products(&lines).await?;
        let availability = assess(&lines, &products);

        if !availability.is_valid {
            let shortfalls = availability.shortfalls();
            tracing::info!(shortfalls = shortfalls.len(), "stock deduction rejected");
            return Err(LedgerError::InsufficientStock { shortfalls });
        }

        let mut report = StockChangeReport::default();
        for line in &lines {
            let Some(product) = products.get(&line.product_id) else {
                continue;
            };
            if !product.manage_stock {
                continue;
            }

            let request = ctx.request(MovementRequest::outbound(
                line.product_id,
                line.quantity,
                ctx.reason.clone(),
            ));

            match self.store.apply_movement(request).await {
                Ok(movement) => self.record(product, movement, &mut report).await,
                Err(e) => {
                    tracing::error!(
                        product_id = %line.product_id,
                        quantity = line.quantity,
                        error = %e,
                        "stock deduction failed, rolling back"
                    );
                    self.roll_back(&report.movements, ctx).await;
                    return Err(deduction_error(product, e));
                }
            }
        }

        Ok(report)
    }

    /// Returns stock for every line.
    ///
    /// No availability check is made. Lines that cannot be written are listed
    /// in [`StockChangeReport::failed`] and the remaining lines still run.
    #[tracing::instrument(skip(self, items, ctx), fields(reason = %ctx.reason, reference = ?ctx.reference))]
    pub async fn add(
        &self,
        items: &[StockLine],
        ctx: &MovementContext,
    ) -> Result<StockChangeReport, LedgerError> {
        let lines = merge_lines(items)?;
        let products = self.load_products(&lines).await?;

        let mut report = StockChangeReport::default();
        for line in &lines {
            let Some(product) = products.get(&line.product_id) else {
                report.failed.push(FailedLine {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    error: StoreError::ProductNotFound(line.product_id).to_string(),
                });
                continue;
            };
            if !product.manage_stock {
                continue;
            }

            let request = ctx.request(MovementRequest::inbound(
                line.product_id,
                line.quantity,
                ctx.reason.clone(),
            ));

            match self.store.apply_movement(request).await {
                Ok(movement) => self.record(product, movement, &mut report).await,
                Err(e) => {
                    metrics::counter!("stock_restoration_failures_total").increment(1);
                    tracing::error!(
                        product_id = %line.product_id,
                        quantity = line.quantity,
                        error = %e,
                        "stock restoration failed"
                    );
                    report.failed.push(FailedLine {
                        product_id: line.product_id,
                        quantity: line.quantity,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Sets a product's stock to an absolute level through an adjustment movement.
    #[tracing::instrument(skip(self, ctx), fields(reason = %ctx.reason))]
    pub async fn adjust(
        &self,
        product_id: ProductId,
        new_quantity: i64,
        ctx: &MovementContext,
    ) -> Result<StockChangeReport, LedgerError> {
        if new_quantity < 0 {
            return Err(LedgerError::InvalidRequest(format!(
                "stock cannot be set to {new_quantity}"
            )));
        }

        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or(LedgerError::ProductNotFound(product_id))?;

        let mut report = StockChangeReport::default();
        let delta = new_quantity - product.stock;
        if delta == 0 {
            return Ok(report);
        }

        let request = ctx.request(MovementRequest::adjustment(
            product_id,
            delta,
            ctx.reason.clone(),
        ));
        let movement = self
            .store
            .apply_movement(request)
            .await
            .map_err(|source| LedgerError::Persistence { product_id, source })?;

        self.record(&product, movement, &mut report).await;
        Ok(report)
    }

    /// Returns a product's movement history, oldest first.
    pub async fn movements(&self, product_id: ProductId) -> Result<Vec<StockMovement>, LedgerError> {
        if self.store.get_product(product_id).await?.is_none() {
            return Err(LedgerError::ProductNotFound(product_id));
        }
        Ok(self.store.movements_for_product(product_id).await?)
    }

    /// Replays the product's movement log against its cached stock.
    pub async fn reconcile(&self, product_id: ProductId) -> Result<ReconciliationReport, LedgerError> {
        reconcile::reconcile(&self.store, product_id).await
    }

    async fn load_products(
        &self,
        lines: &[StockLine],
    ) -> Result<HashMap<ProductId, Product>, LedgerError> {
        let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        let products = self.store.get_products(&ids).await?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn record(&self, product: &Product, movement: StockMovement, report: &mut StockChangeReport) {
        metrics::counter!("stock_movements_total", "type" => movement.movement_type.as_str())
            .increment(1);

        if let Some(kind) = evaluate_alert(
            movement.stock_before,
            movement.stock_after,
            product.low_stock_threshold,
        ) {
            let alert = StockAlert {
                product_id: product.id,
                product_name: product.name.clone(),
                kind,
                current_stock: movement.stock_after,
                threshold: product.low_stock_threshold,
            };
            metrics::counter!("stock_alerts_total", "kind" => kind.as_str()).increment(1);

            if let Err(e) = self
                .notifier
                .notify_low_stock(&self.config.alert_recipients, &alert)
                .await
            {
                tracing::warn!(product_id = %product.id, error = %e, "stock alert not delivered");
            }
            report.alerts.push(alert);
        }

        report.movements.push(movement);
    }

    async fn roll_back(&self, applied: &[StockMovement], ctx: &MovementContext) {
        for movement in applied.iter().rev() {
            let Ok(quantity) = u32::try_from(movement.quantity) else {
                continue;
            };
            let request = ctx.request(MovementRequest::inbound(
                movement.product_id,
                quantity,
                format!("rollback: {}", ctx.reason),
            ));
            if let Err(e) = self.store.apply_movement(request).await {
                metrics::counter!("stock_restoration_failures_total").increment(1);
                tracing::error!(
                    product_id = %movement.product_id,
                    quantity,
                    error = %e,
                    "rollback of partial deduction failed"
                );
            }
        }
    }
}

/// Merges lines for the same product, keeping first-seen order.
fn merge_lines(items: &[StockLine]) -> Result<Vec<StockLine>, LedgerError> {
    let mut merged: Vec<StockLine> = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity == 0 {
            return Err(LedgerError::InvalidRequest(format!(
                "quantity for product {} must be positive",
                item.product_id
            )));
        }
        match merged.iter_mut().find(|m| m.product_id == item.product_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
            None => merged.push(*item),
        }
    }
    Ok(merged)
}

fn assess(lines: &[StockLine], products: &HashMap<ProductId, Product>) -> AvailabilityReport {
    let results: Vec<ItemAvailability> = lines
        .iter()
        .map(|line| match products.get(&line.product_id) {
            Some(product) => ItemAvailability {
                product_id: line.product_id,
                product_name: Some(product.name.clone()),
                requested: line.quantity,
                in_stock: product.stock,
                managed: product.manage_stock,
                available: product.can_supply(line.quantity),
            },
            None => ItemAvailability {
                product_id: line.product_id,
                product_name: None,
                requested: line.quantity,
                in_stock: 0,
                managed: true,
                available: false,
            },
        })
        .collect();

    AvailabilityReport {
        is_valid: results.iter().all(|r| r.available),
        results,
    }
}

fn deduction_error(product: &Product, error: StoreError) -> LedgerError {
    match error {
        StoreError::InsufficientStock {
            product_id,
            requested,
            available,
        } => LedgerError::InsufficientStock {
            shortfalls: vec![ItemAvailability {
                product_id,
                product_name: Some(product.name.clone()),
                requested: u32::try_from(requested).unwrap_or(u32::MAX),
                in_stock: available,
                managed: true,
                available: false,
            }],
        },
        StoreError::ProductNotFound(id) => LedgerError::ProductNotFound(id),
        source => LedgerError::Persistence {
            product_id: product.id,
            source,
        },
    }
}
