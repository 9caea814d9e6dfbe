//! Low-stock notification collaborator.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::ProductId;
use domain::StockAlertKind;
use serde::Serialize;
use thiserror::Error;

/// An alert raised by a single stock movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockAlert {
    pub product_id: ProductId,
    pub product_name: String,
    pub kind: StockAlertKind,
    pub current_stock: i64,
    pub threshold: i64,
}

/// Delivery of an alert failed.
#[derive(Debug, Clone, Error)]
#[error("Alert delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Sends stock alerts to people who can act on them.
///
/// Delivery failures are reported back to the ledger, which logs them and
/// carries on; they never fail the stock operation that raised the alert.
#[async_trait]
pub trait StockAlertNotifier: Send + Sync {
    /// Notifies `recipients` that a product crossed into a low or empty band.
    async fn notify_low_stock(
        &self,
        recipients: &[String],
        alert: &StockAlert,
    ) -> Result<(), NotifyError>;
}

/// Notifier that writes alerts to the log.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl StockAlertNotifier for TracingNotifier {
    async fn notify_low_stock(
        &self,
        recipients: &[String],
        alert: &StockAlert,
    ) -> Result<(), NotifyError> {
        tracing::warn!(
            product_id = %alert.product_id,
            product_name = %alert.product_name,
            kind = alert.kind.as_str(),
            current_stock = alert.current_stock,
            threshold = alert.threshold,
            recipients = recipients.len(),
            "stock alert"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<(Vec<String>, StockAlert)>,
    fail_on_notify: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every delivery.
    pub fn set_fail_on_notify(&self, fail: bool) {
        self.state.write().unwrap().fail_on_notify = fail;
    }

    /// Returns every alert delivered so far.
    pub fn sent(&self) -> Vec<StockAlert> {
        self.state
            .read()
            .unwrap()
            .sent
            .iter()
            .map(|(_, alert)| alert.clone())
            .collect()
    }

    /// Returns the recipients of the most recent delivery.
    pub fn last_recipients(&self) -> Option<Vec<String>> {
        self.state
            .read()
            .unwrap()
            .sent
            .last()
            .map(|(recipients, _)| recipients.clone())
    }
}

#[async_trait]
impl StockAlertNotifier for InMemoryNotifier {
    async fn notify_low_stock(
        &self,
        recipients: &[String],
        alert: &StockAlert,
    ) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_notify {
            return Err(NotifyError("mail server unreachable".to_string()));
        }
        state.sent.push((recipients.to_vec(), alert.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert() -> StockAlert {
        StockAlert {
            product_id: ProductId::new(),
            product_name: "Widget".to_string(),
            kind: StockAlertKind::LowStock,
            current_stock: 4,
            threshold: 5,
        }
    }

    #[tokio::test]
    async fn records_deliveries() {
        let notifier = InMemoryNotifier::new();
        let recipients = vec!["ops@example.com".to_string()];

        notifier.notify_low_stock(&recipients, &alert()).await.unwrap();

        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(notifier.last_recipients(), Some(recipients));
    }

    #[tokio::test]
    async fn fail_switch_rejects_delivery() {
        let notifier = InMemoryNotifier::new();
        notifier.set_fail_on_notify(true);

        assert!(notifier.notify_low_stock(&[], &alert()).await.is_err());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn tracing_notifier_never_fails() {
        assert!(TracingNotifier.notify_low_stock(&[], &alert()).await.is_ok());
    }
}
