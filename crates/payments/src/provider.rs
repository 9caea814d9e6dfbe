//! Provider contract, outcome type and registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::Money;
use serde::Serialize;

use crate::error::{PaymentError, Result};

/// Normalized result of a payment attempt, whatever the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// Funds are captured; the order can be marked paid.
    Completed {
        provider_reference: String,
        amount: Money,
        currency: String,
        status: String,
    },
    /// The payer has to approve the payment at `redirect_url` first.
    RequiresApproval {
        redirect_url: String,
        provider_order_id: String,
    },
    /// The provider declined; the order stays unpaid.
    Failed { reason: String },
}

impl PaymentOutcome {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            PaymentOutcome::Completed { .. } => "completed",
            PaymentOutcome::RequiresApproval { .. } => "requires_approval",
            PaymentOutcome::Failed { .. } => "failed",
        }
    }
}

/// What a provider is asked to capture.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub order_number: String,
    pub amount: Money,
    pub currency: String,
    /// Provider-specific payload passed through from the caller.
    pub data: serde_json::Value,
}

impl PaymentRequest {
    /// Reads an optional string field from the payload.
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(|v| v.as_str())
    }

    /// Reads a required string field from the payload.
    pub fn require_str(&self, field: &str) -> Result<&str> {
        self.data_str(field)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PaymentError::InvalidPaymentData(format!("missing field `{field}`")))
    }
}

/// One payment backend.
///
/// Implementations translate their provider's flow into a [`PaymentOutcome`].
/// A declined payment is an `Ok(Failed)`; `Err` is reserved for malformed
/// requests and unreachable gateways.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &'static str;

    async fn capture(&self, request: &PaymentRequest) -> Result<PaymentOutcome>;
}

/// Providers keyed by the payment method tag stored on the order.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider for a method tag, replacing any previous one.
    pub fn register(mut self, method: impl Into<String>, provider: Arc<dyn PaymentProvider>) -> Self {
        self.providers.insert(method.into(), provider);
        self
    }

    /// Looks up the provider for a method tag.
    pub fn get(&self, method: &str) -> Result<Arc<dyn PaymentProvider>> {
        self.providers
            .get(method)
            .cloned()
            .ok_or_else(|| PaymentError::UnknownMethod(method.to_string()))
    }

    /// Returns the registered method tags, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.providers.keys().cloned().collect();
        methods.sort();
        methods
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct AlwaysFails;

    #[async_trait]
    impl PaymentProvider for AlwaysFails {
        fn name(&self) -> &'static str {
            "always_fails"
        }

        async fn capture(&self, _request: &PaymentRequest) -> Result<PaymentOutcome> {
            Ok(PaymentOutcome::Failed {
                reason: "declined".to_string(),
            })
        }
    }

    #[test]
    fn registry_resolves_by_method() {
        let registry = ProviderRegistry::new()
            .register("card", Arc::new(AlwaysFails))
            .register("bank_transfer", Arc::new(AlwaysFails));

        assert_eq!(registry.get("card").unwrap().name(), "always_fails");
        assert_eq!(registry.methods(), vec!["bank_transfer", "card"]);
        assert!(matches!(
            registry.get("cheque"),
            Err(PaymentError::UnknownMethod(m)) if m == "cheque"
        ));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let outcome = PaymentOutcome::RequiresApproval {
            redirect_url: "https://wallet.test/approve/1".to_string(),
            provider_order_id: "1".to_string(),
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["outcome"], "requires_approval");
        assert_eq!(value["provider_order_id"], "1");
    }

    #[test]
    fn required_fields_must_be_present() {
        let request = PaymentRequest {
            order_id: OrderId::new(),
            order_number: "ORD-1".to_string(),
            amount: Money::from_cents(100),
            currency: "USD".to_string(),
            data: json!({ "payment_intent_id": "pi_1", "empty": "" }),
        };
        assert_eq!(request.require_str("payment_intent_id").unwrap(), "pi_1");
        assert!(request.require_str("empty").is_err());
        assert!(request.require_str("missing").is_err());
    }
}
