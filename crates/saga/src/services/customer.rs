//! Customer directory trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::CustomerId;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// Customer details supplied with an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl CustomerDetails {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            first_name: None,
            last_name: None,
        }
    }

    /// Lower-cased, trimmed email used as the lookup key.
    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }

    /// Rejects details that cannot identify a customer.
    pub fn validate(&self) -> Result<(), SagaError> {
        let email = self.normalized_email();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err(SagaError::Validation(format!(
                "invalid customer email: {}",
                self.email
            ))),
        }
    }
}

/// Finds the customer for an order, registering a new one if needed.
///
/// Customer records themselves are owned elsewhere; the order core only needs
/// an id to attach to the order.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn resolve_or_create(&self, details: &CustomerDetails) -> Result<CustomerId, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryCustomerState {
    by_email: HashMap<String, CustomerId>,
    fail_on_resolve: bool,
}

/// In-memory customer directory keyed by email.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustomerDirectory {
    state: Arc<RwLock<InMemoryCustomerState>>,
}

impl InMemoryCustomerDirectory {
    /// Creates a new in-memory customer directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the directory to fail every lookup.
    pub fn set_fail_on_resolve(&self, fail: bool) {
        self.state.write().unwrap().fail_on_resolve = fail;
    }

    /// Returns the number of known customers.
    pub fn customer_count(&self) -> usize {
        self.state.read().unwrap().by_email.len()
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn resolve_or_create(&self, details: &CustomerDetails) -> Result<CustomerId, SagaError> {
        details.validate()?;

        let mut state = self.state.write().unwrap();
        if state.fail_on_resolve {
            return Err(SagaError::Persistence(
                "customer directory unavailable".to_string(),
            ));
        }

        let id = *state
            .by_email
            .entry(details.normalized_email())
            .or_insert_with(CustomerId::new);
        Ok(id)
    }
}
