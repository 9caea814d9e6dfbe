//! Direct-confirmation card payments.
//!
//! The client confirms a payment intent with the card processor and sends us
//! its id; we retrieve the intent server-side and trust only what the
//! processor reports.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::Money;

use crate::error::{PaymentError, Result};
use crate::provider::{PaymentOutcome, PaymentProvider, PaymentRequest};

/// Intent status meaning the funds were captured.
pub const STATUS_SUCCEEDED: &str = "succeeded";

/// A payment intent as reported by the card processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    pub amount: Money,
    pub currency: String,
    /// Order id written into the intent's metadata when checkout created it.
    pub order_id: Option<OrderId>,
}

/// Card processor API.
#[async_trait]
pub trait CardGateway: Send + Sync {
    /// Retrieves a payment intent by id; `None` if the processor does not know it.
    async fn retrieve_payment_intent(&self, id: &str) -> Result<Option<PaymentIntent>>;
}

/// Card provider: completed only when the processor says `succeeded`.
pub struct CardPaymentProvider {
    gateway: Arc<dyn CardGateway>,
}

impl CardPaymentProvider {
    pub fn new(gateway: Arc<dyn CardGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl PaymentProvider for CardPaymentProvider {
    fn name(&self) -> &'static str {
        "card"
    }

    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn capture(&self, request: &PaymentRequest) -> Result<PaymentOutcome> {
        let intent_id = request.require_str("payment_intent_id")?;

        let Some(intent) = self.gateway.retrieve_payment_intent(intent_id).await? else {
            return Ok(PaymentOutcome::Failed {
                reason: format!("unknown payment intent {intent_id}"),
            });
        };

        if intent.order_id != Some(request.order_id) {
            tracing::warn!(intent_id = %intent.id, "payment intent is not bound to this order");
            return Ok(PaymentOutcome::Failed {
                reason: format!("payment intent {} was not created for this order", intent.id),
            });
        }
        if intent.status != STATUS_SUCCEEDED {
            return Ok(PaymentOutcome::Failed {
                reason: format!("payment intent status is {}", intent.status),
            });
        }
        if intent.amount != request.amount || !intent.currency.eq_ignore_ascii_case(&request.currency)
        {
            tracing::warn!(
                intent_amount = %intent.amount,
                order_amount = %request.amount,
                "payment intent does not match order total"
            );
            return Ok(PaymentOutcome::Failed {
                reason: format!(
                    "captured {} {} does not match order total {} {}",
                    intent.amount, intent.currency, request.amount, request.currency
                ),
            });
        }

        Ok(PaymentOutcome::Completed {
            provider_reference: intent.id,
            amount: intent.amount,
            currency: request.currency.clone(),
            status: intent.status,
        })
    }
}

#[derive(Debug, Default)]
struct InMemoryCardState {
    intents: HashMap<String, PaymentIntent>,
    fail_on_retrieve: bool,
}

/// In-memory card processor for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCardGateway {
    state: Arc<RwLock<InMemoryCardState>>,
}

impl InMemoryCardGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an intent the processor will report.
    pub fn insert(&self, intent: PaymentIntent) {
        self.state
            .write()
            .unwrap()
            .intents
            .insert(intent.id.clone(), intent);
    }

    /// Configures the gateway to be unreachable.
    pub fn set_fail_on_retrieve(&self, fail: bool) {
        self.state.write().unwrap().fail_on_retrieve = fail;
    }
}

#[async_trait]
impl CardGateway for InMemoryCardGateway {
    async fn retrieve_payment_intent(&self, id: &str) -> Result<Option<PaymentIntent>> {
        let state = self.state.read().unwrap();
        if state.fail_on_retrieve {
            return Err(PaymentError::provider("card", "card processor unreachable"));
        }
        Ok(state.intents.get(id).cloned())
    }
}
