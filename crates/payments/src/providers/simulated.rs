//! Stand-in provider that always completes after a fixed delay.
//!
//! Used for methods without a real backend integration yet.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::provider::{PaymentOutcome, PaymentProvider, PaymentRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedProviderConfig {
    pub delay: Duration,
}

impl Default for SimulatedProviderConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1500),
        }
    }
}

pub struct SimulatedProvider {
    name: &'static str,
    config: SimulatedProviderConfig,
}

impl SimulatedProvider {
    pub fn new(name: &'static str, config: SimulatedProviderConfig) -> Self {
        Self { name, config }
    }
}

#[async_trait]
impl PaymentProvider for SimulatedProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn capture(&self, request: &PaymentRequest) -> Result<PaymentOutcome> {
        tokio::time::sleep(self.config.delay).await;
        Ok(PaymentOutcome::Completed {
            provider_reference: format!("{}-{}", self.name, Uuid::new_v4().simple()),
            amount: request.amount,
            currency: request.currency.clone(),
            status: "completed".to_string(),
        })
    }
}
