//! Replays the movement log against the cached stock level.
//!
//! Stock restoration after a cancellation is best effort, so the cached stock
//! and the ledger can drift if a restoration write is lost. The report here is
//! how operators find and size that drift.

use common::{MovementId, ProductId};
use serde::Serialize;
use store::Datastore;

use crate::error::LedgerError;

/// A movement whose `stock_before` does not continue from its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainBreak {
    pub movement_id: MovementId,
    pub expected_before: i64,
    pub actual_before: i64,
}

/// Result of replaying one product's movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub product_id: ProductId,
    pub cached_stock: i64,
    /// `stock_before` of the first movement, or the cached stock when there are none.
    pub baseline: i64,
    /// Baseline plus the signed sum of all movements.
    pub ledger_stock: i64,
    /// `cached_stock - ledger_stock`.
    pub drift: i64,
    pub movement_count: usize,
    pub chain_breaks: Vec<ChainBreak>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.drift == 0 && self.chain_breaks.is_empty()
    }
}

/// Builds the reconciliation report for a product.
#[tracing::instrument(skip(store))]
pub async fn reconcile<S: Datastore + ?Sized>(
    store: &S,
    product_id: ProductId,
) -> Result<ReconciliationReport, LedgerError> {
    let product = store
        .get_product(product_id)
        .await?
        .ok_or(LedgerError::ProductNotFound(product_id))?;
    let movements = store.movements_for_product(product_id).await?;

    let baseline = movements
        .first()
        .map(|m| m.stock_before)
        .unwrap_or(product.stock);

    let mut ledger_stock = baseline;
    let mut chain_breaks = Vec::new();
    for movement in &movements {
        if movement.stock_before != ledger_stock {
            chain_breaks.push(ChainBreak {
                movement_id: movement.id,
                expected_before: ledger_stock,
                actual_before: movement.stock_before,
            });
        }
        ledger_stock += movement.signed_quantity();
    }

    let report = ReconciliationReport {
        product_id,
        cached_stock: product.stock,
        baseline,
        ledger_stock,
        drift: product.stock - ledger_stock,
        movement_count: movements.len(),
        chain_breaks,
    };

    if !report.is_consistent() {
        tracing::warn!(
            drift = report.drift,
            chain_breaks = report.chain_breaks.len(),
            "stock ledger out of step with cached stock"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Money, MovementRequest, Product};
    use store::InMemoryStore;

    async fn seeded() -> (InMemoryStore, Product) {
        let store = InMemoryStore::new();
        let product = Product::new("Widget", "W-1", Money::from_cents(100)).with_stock(10);
        store.upsert_product(product.clone()).await.unwrap();
        (store, product)
    }

    #[tokio::test]
    async fn untouched_product_is_consistent() {
        let (store, product) = seeded().await;

        let report = reconcile(&store, product.id).await.unwrap();

        assert!(report.is_consistent());
        assert_eq!(report.baseline, 10);
        assert_eq!(report.movement_count, 0);
    }

    #[tokio::test]
    async fn ledger_sum_reconstructs_stock() {
        let (store, product) = seeded().await;
        store
            .apply_movement(MovementRequest::outbound(product.id, 4, "sale"))
            .await
            .unwrap();
        store
            .apply_movement(MovementRequest::inbound(product.id, 1, "return"))
            .await
            .unwrap();
        store
            .apply_movement(MovementRequest::adjustment(product.id, -2, "count"))
            .await
            .unwrap();

        let report = reconcile(&store, product.id).await.unwrap();

        assert!(report.is_consistent());
        assert_eq!(report.ledger_stock, 5);
        assert_eq!(report.cached_stock, 5);
    }

    #[tokio::test]
    async fn out_of_band_write_shows_as_drift_and_break() {
        let (store, product) = seeded().await;
        store
            .apply_movement(MovementRequest::outbound(product.id, 4, "sale"))
            .await
            .unwrap();
        store.force_stock(product.id, 8).await;
        store
            .apply_movement(MovementRequest::outbound(product.id, 1, "sale"))
            .await
            .unwrap();

        let report = reconcile(&store, product.id).await.unwrap();

        assert!(!report.is_consistent());
        assert_eq!(report.ledger_stock, 5);
        assert_eq!(report.cached_stock, 7);
        assert_eq!(report.drift, 2);
        assert_eq!(report.chain_breaks.len(), 1);
        assert_eq!(report.chain_breaks[0].expected_before, 6);
        assert_eq!(report.chain_breaks[0].actual_before, 8);
    }

    #[tokio::test]
    async fn missing_product_is_an_error() {
        let store = InMemoryStore::new();
        assert!(matches!(
            reconcile(&store, ProductId::new()).await,
            Err(LedgerError::ProductNotFound(_))
        ));
    }
}
