//! Applies provider outcomes to orders.

use chrono::Utc;
use common::OrderId;
use domain::{Order, OrderPatch, OrderStatus, PaymentStatus};
use store::{Datastore, DatastoreExt, OrderUpdate, StoreError};

use crate::error::{PaymentError, Result};
use crate::provider::{PaymentOutcome, PaymentRequest, ProviderRegistry};

/// Runs a payment through the provider registered for its method.
///
/// Only a `Completed` outcome writes to the order: payment becomes `paid`,
/// a pending order moves to `processing`, and the provider reference is
/// stored. Every other outcome and every error leaves the order untouched.
pub struct PaymentProcessor<S> {
    store: S,
    registry: ProviderRegistry,
}

impl<S: Datastore> PaymentProcessor<S> {
    pub fn new(store: S, registry: ProviderRegistry) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    #[tracing::instrument(skip(self, payment_data))]
    pub async fn process_payment(
        &self,
        order_id: OrderId,
        method: &str,
        payment_data: serde_json::Value,
    ) -> Result<PaymentOutcome> {
        let provider = self.registry.get(method)?;

        let order = self.store.require_order(order_id).await.map_err(|e| match e {
            StoreError::OrderNotFound(id) => PaymentError::OrderNotFound(id),
            other => PaymentError::Store(other),
        })?;
        if order.payment_status == PaymentStatus::Paid {
            return Err(PaymentError::InvalidOrderState {
                order_id,
                reason: "order is already paid".to_string(),
            });
        }
        if order.status == OrderStatus::Cancelled {
            return Err(PaymentError::InvalidOrderState {
                order_id,
                reason: "order is cancelled".to_string(),
            });
        }

        let request = PaymentRequest {
            order_id,
            order_number: order.order_number.clone(),
            amount: order.total,
            currency: order.currency.clone(),
            data: payment_data,
        };

        let outcome = match provider.capture(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::counter!("payments_processed_total", "method" => method.to_string(), "outcome" => "error")
                    .increment(1);
                tracing::warn!(provider = provider.name(), error = %e, "payment capture failed");
                return Err(e);
            }
        };

        let outcome = self.verify_capture(&order, outcome).await?;

        if let PaymentOutcome::Completed {
            provider_reference, ..
        } = &outcome
        {
            self.record_capture(order, provider_reference).await?;
        }

        metrics::counter!("payments_processed_total", "method" => method.to_string(), "outcome" => outcome.label())
            .increment(1);
        Ok(outcome)
    }

    /// Downgrades a completed capture to `Failed` when it cannot belong to
    /// this order: the amount or currency differ from the order total, or the
    /// provider reference is already recorded on another order.
    async fn verify_capture(
        &self,
        order: &Order,
        outcome: PaymentOutcome,
    ) -> Result<PaymentOutcome> {
        let PaymentOutcome::Completed {
            provider_reference,
            amount,
            currency,
            ..
        } = &outcome
        else {
            return Ok(outcome);
        };

        if *amount != order.total || !currency.eq_ignore_ascii_case(&order.currency) {
            tracing::warn!(
                order_id = %order.id,
                %provider_reference,
                captured = %amount,
                total = %order.total,
                "captured amount does not match order total"
            );
            return Ok(PaymentOutcome::Failed {
                reason: format!(
                    "captured {amount} {currency} does not match order total {} {}",
                    order.total, order.currency
                ),
            });
        }

        if let Some(other) = self
            .store
            .find_order_by_payment_reference(provider_reference)
            .await?
            && other.id != order.id
        {
            tracing::warn!(
                order_id = %order.id,
                other_order_id = %other.id,
                %provider_reference,
                "payment reference already used by another order"
            );
            return Ok(PaymentOutcome::Failed {
                reason: format!("payment {provider_reference} is already recorded on another order"),
            });
        }

        Ok(outcome)
    }

    /// Marks the order paid. The funds are already captured at this point, so
    /// a failed write is logged with the provider reference for manual
    /// reconciliation.
    async fn record_capture(&self, order: Order, provider_reference: &str) -> Result<()> {
        let order_id = order.id;
        let patch = OrderPatch {
            status: (order.status == OrderStatus::Pending).then_some(OrderStatus::Processing),
            payment_status: Some(PaymentStatus::Paid),
            provider_payment_reference: Some(provider_reference.to_string()),
            ..Default::default()
        };
        let expected = order.status;
        let mut updated = order;

        let written = match updated.apply_patch(&patch, Utc::now()) {
            Ok(_) => self
                .store
                .update_order(OrderUpdate::new(updated, expected))
                .await
                .map_err(PaymentError::from),
            Err(e) => Err(PaymentError::InvalidOrderState {
                order_id,
                reason: e.to_string(),
            }),
        };

        if let Err(e) = written {
            metrics::counter!("payments_unrecorded_total").increment(1);
            tracing::error!(
                %order_id,
                %provider_reference,
                error = %e,
                "payment captured but order could not be marked paid"
            );
            return Err(PaymentError::CaptureNotRecorded {
                order_id,
                provider_reference: provider_reference.to_string(),
                reason: e.to_string(),
            });
        }

        tracing::info!(%order_id, %provider_reference, "payment completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::provider::PaymentProvider;
    use crate::providers::{
        CardGateway, CardPaymentProvider, InMemoryCardGateway, InMemoryWalletGateway, PaymentIntent,
        WalletConfig, WalletPaymentProvider,
    };
    use common::CustomerId;
    use domain::{Money, Order, OrderCharges, PricedLine, Product};
    use async_trait::async_trait;
    use serde_json::json;
    use store::InMemoryStore;

    struct Fixture {
        store: InMemoryStore,
        card: InMemoryCardGateway,
        wallet: InMemoryWalletGateway,
        processor: PaymentProcessor<InMemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let card = InMemoryCardGateway::new();
        let wallet = InMemoryWalletGateway::new();
        let registry = ProviderRegistry::new()
            .register("card", Arc::new(CardPaymentProvider::new(Arc::new(card.clone()))))
            .register(
                "wallet",
                Arc::new(WalletPaymentProvider::new(
                    Arc::new(wallet.clone()),
                    WalletConfig::default(),
                )),
            );
        Fixture {
            processor: PaymentProcessor::new(store.clone(), registry),
            store,
            card,
            wallet,
        }
    }

    async fn order(store: &InMemoryStore) -> Order {
        let product = Product::new("Widget", "W-1", Money::from_cents(2000)).with_stock(10);
        let lines = vec![PricedLine::from_product(&product, 2).unwrap()];
        let order = Order::place(
            CustomerId::new(),
            &lines,
            OrderCharges::default(),
            "USD",
            "card",
            None,
            Utc::now(),
        )
        .unwrap();
        store.insert_order(&order).await.unwrap();
        order
    }

    fn succeeded(id: &str, order: &Order) -> PaymentIntent {
        PaymentIntent {
            id: id.to_string(),
            status: "succeeded".to_string(),
            amount: order.total,
            currency: order.currency.clone(),
            order_id: Some(order.id),
        }
    }

    /// Completes every request with the same reference and a fixed amount.
    struct FixedCapture {
        reference: &'static str,
        amount: Option<Money>,
    }

    #[async_trait]
    impl PaymentProvider for FixedCapture {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn capture(&self, request: &PaymentRequest) -> Result<PaymentOutcome> {
            Ok(PaymentOutcome::Completed {
                provider_reference: self.reference.to_string(),
                amount: self.amount.unwrap_or(request.amount),
                currency: request.currency.clone(),
                status: "succeeded".to_string(),
            })
        }
    }

    /// Card processor that cancels the order while the intent is being
    /// retrieved, as a concurrent cancellation would.
    struct CancellingCardGateway {
        store: InMemoryStore,
        intent: PaymentIntent,
    }

    #[async_trait]
    impl CardGateway for CancellingCardGateway {
        async fn retrieve_payment_intent(&self, _id: &str) -> Result<Option<PaymentIntent>> {
            let order_id = self.intent.order_id.unwrap();
            let mut order = self.store.require_order(order_id).await.unwrap();
            let expected = order.status;
            order
                .apply_patch(
                    &OrderPatch {
                        status: Some(OrderStatus::Cancelled),
                        ..Default::default()
                    },
                    Utc::now(),
                )
                .unwrap();
            self.store
                .update_order(OrderUpdate::new(order, expected))
                .await
                .unwrap();
            Ok(Some(self.intent.clone()))
        }
    }

    fn processor_with(
        store: &InMemoryStore,
        method: &str,
        provider: Arc<dyn PaymentProvider>,
    ) -> PaymentProcessor<InMemoryStore> {
        PaymentProcessor::new(store.clone(), ProviderRegistry::new().register(method, provider))
    }

    #[tokio::test]
    async fn completed_payment_marks_order_paid_and_processing() {
        let f = fixture();
        let order = order(&f.store).await;
        f.card.insert(succeeded("pi_1", &order));

        let outcome = f
            .processor
            .process_payment(order.id, "card", json!({ "payment_intent_id": "pi_1" }))
            .await
            .unwrap();

        assert_eq!(outcome.label(), "completed");
        let stored = f.store.require_order(order.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert_eq!(stored.status, OrderStatus::Processing);
        assert_eq!(stored.provider_payment_reference.as_deref(), Some("pi_1"));
    }

    #[tokio::test]
    async fn failed_payment_leaves_order_unpaid() {
        let f = fixture();
        let order = order(&f.store).await;
        f.card.insert(PaymentIntent {
            status: "canceled".to_string(),
            ..succeeded("pi_1", &order)
        });

        let outcome = f
            .processor
            .process_payment(order.id, "card", json!({ "payment_intent_id": "pi_1" }))
            .await
            .unwrap();

        assert!(matches!(outcome, PaymentOutcome::Failed { .. }));
        let stored = f.store.require_order(order.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert_eq!(stored.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn approval_flow_only_writes_on_capture() {
        let f = fixture();
        let order = order(&f.store).await;

        let outcome = f
            .processor
            .process_payment(order.id, "wallet", json!({}))
            .await
            .unwrap();
        let PaymentOutcome::RequiresApproval {
            provider_order_id, ..
        } = outcome
        else {
            panic!("expected RequiresApproval");
        };
        let stored = f.store.require_order(order.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Pending);

        f.wallet.approve(&provider_order_id);
        f.processor
            .process_payment(
                order.id,
                "wallet",
                json!({ "wallet_order_id": &provider_order_id }),
            )
            .await
            .unwrap();

        let stored = f.store.require_order(order.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert_eq!(
            stored.provider_payment_reference,
            Some(format!("cap-{provider_order_id}"))
        );
    }

    #[tokio::test]
    async fn provider_errors_do_not_touch_the_order() {
        let f = fixture();
        let order = order(&f.store).await;
        f.card.set_fail_on_retrieve(true);

        let err = f
            .processor
            .process_payment(order.id, "card", json!({ "payment_intent_id": "pi_1" }))
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Provider { .. }));
        let stored = f.store.require_order(order.id).await.unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn unknown_method_and_missing_order_are_rejected() {
        let f = fixture();
        let order = order(&f.store).await;

        let err = f
            .processor
            .process_payment(order.id, "cheque", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::UnknownMethod(_)));

        let err = f
            .processor
            .process_payment(OrderId::new(), "card", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn paid_orders_cannot_be_paid_twice() {
        let f = fixture();
        let order = order(&f.store).await;
        f.card.insert(succeeded("pi_1", &order));
        let data = json!({ "payment_intent_id": "pi_1" });

        f.processor
            .process_payment(order.id, "card", data.clone())
            .await
            .unwrap();
        let err = f
            .processor
            .process_payment(order.id, "card", data)
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::InvalidOrderState { .. }));
    }

    #[tokio::test]
    async fn one_payment_reference_cannot_pay_two_orders() {
        let store = InMemoryStore::new();
        let processor = processor_with(
            &store,
            "card",
            Arc::new(FixedCapture {
                reference: "pi_1",
                amount: None,
            }),
        );
        let first = order(&store).await;
        let second = order(&store).await;

        let outcome = processor
            .process_payment(first.id, "card", json!({}))
            .await
            .unwrap();
        assert_eq!(outcome.label(), "completed");

        let outcome = processor
            .process_payment(second.id, "card", json!({}))
            .await
            .unwrap();
        assert!(matches!(outcome, PaymentOutcome::Failed { .. }));
        let stored = store.require_order(second.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert_eq!(stored.provider_payment_reference, None);
    }

    #[tokio::test]
    async fn capture_below_the_order_total_is_not_recorded() {
        let store = InMemoryStore::new();
        let processor = processor_with(
            &store,
            "card",
            Arc::new(FixedCapture {
                reference: "pi_small",
                amount: Some(Money::from_cents(100)),
            }),
        );
        let order = order(&store).await;

        let outcome = processor
            .process_payment(order.id, "card", json!({}))
            .await
            .unwrap();

        assert!(matches!(outcome, PaymentOutcome::Failed { .. }));
        let stored = store.require_order(order.id).await.unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn wallet_order_of_a_small_order_cannot_pay_a_large_one() {
        let f = fixture();
        let small = order(&f.store).await;
        let product = Product::new("Crate", "C-1", Money::from_cents(1_000_000)).with_stock(1);
        let lines = vec![PricedLine::from_product(&product, 1).unwrap()];
        let large = Order::place(
            CustomerId::new(),
            &lines,
            OrderCharges::default(),
            "USD",
            "wallet",
            None,
            Utc::now(),
        )
        .unwrap();
        f.store.insert_order(&large).await.unwrap();

        let PaymentOutcome::RequiresApproval {
            provider_order_id, ..
        } = f
            .processor
            .process_payment(small.id, "wallet", json!({}))
            .await
            .unwrap()
        else {
            panic!("expected RequiresApproval");
        };
        f.wallet.approve(&provider_order_id);

        let outcome = f
            .processor
            .process_payment(
                large.id,
                "wallet",
                json!({ "wallet_order_id": &provider_order_id }),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, PaymentOutcome::Failed { .. }));
        let stored = f.store.require_order(large.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn capture_on_a_cancelled_order_reports_the_reference() {
        let store = InMemoryStore::new();
        let order = order(&store).await;
        let gateway = CancellingCardGateway {
            store: store.clone(),
            intent: succeeded("pi_late", &order),
        };
        let processor = processor_with(
            &store,
            "card",
            Arc::new(CardPaymentProvider::new(Arc::new(gateway))),
        );

        let err = processor
            .process_payment(order.id, "card", json!({ "payment_intent_id": "pi_late" }))
            .await
            .unwrap_err();

        match err {
            PaymentError::CaptureNotRecorded {
                order_id,
                provider_reference,
                ..
            } => {
                assert_eq!(order_id, order.id);
                assert_eq!(provider_reference, "pi_late");
            }
            other => panic!("expected CaptureNotRecorded, got {other:?}"),
        }
        let stored = store.require_order(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
    }
}
