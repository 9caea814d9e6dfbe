//! Redirect wallet payments.
//!
//! Two calls: the first creates a wallet order and hands back an approval
//! URL; after the payer approves, the second call (carrying the wallet order
//! id) captures it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::Money;
use uuid::Uuid;

use crate::error::{PaymentError, Result};
use crate::provider::{PaymentOutcome, PaymentProvider, PaymentRequest};

/// Capture status meaning the funds were taken.
pub const STATUS_COMPLETED: &str = "COMPLETED";

/// Where the wallet sends the payer after approving or cancelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletConfig {
    pub return_url: String,
    pub cancel_url: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            return_url: "http://localhost:3000/payments/wallet/return".to_string(),
            cancel_url: "http://localhost:3000/payments/wallet/cancel".to_string(),
        }
    }
}

/// A wallet order awaiting payer approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletOrder {
    pub id: String,
    pub approval_url: String,
}

/// What the wallet recorded when an order was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletOrderDetails {
    pub id: String,
    /// Our order id, sent as the wallet order's reference.
    pub reference_id: OrderId,
    pub amount: Money,
    pub currency: String,
}

/// Result of capturing a wallet order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletCapture {
    pub capture_id: String,
    pub status: String,
    pub amount: Money,
}

/// Wallet API.
#[async_trait]
pub trait WalletGateway: Send + Sync {
    async fn create_order(
        &self,
        request: &PaymentRequest,
        config: &WalletConfig,
    ) -> Result<WalletOrder>;

    /// Looks up a wallet order; `None` if the wallet does not know it.
    async fn retrieve_order(&self, wallet_order_id: &str) -> Result<Option<WalletOrderDetails>>;

    async fn capture_order(&self, wallet_order_id: &str) -> Result<WalletCapture>;
}

/// Wallet provider.
pub struct WalletPaymentProvider {
    gateway: Arc<dyn WalletGateway>,
    config: WalletConfig,
}

impl WalletPaymentProvider {
    pub fn new(gateway: Arc<dyn WalletGateway>, config: WalletConfig) -> Self {
        Self { gateway, config }
    }
}

#[async_trait]
impl PaymentProvider for WalletPaymentProvider {
    fn name(&self) -> &'static str {
        "wallet"
    }

    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn capture(&self, request: &PaymentRequest) -> Result<PaymentOutcome> {
        let Some(wallet_order_id) = request.data_str("wallet_order_id") else {
            let order = self.gateway.create_order(request, &self.config).await?;
            tracing::info!(wallet_order_id = %order.id, "wallet approval requested");
            return Ok(PaymentOutcome::RequiresApproval {
                redirect_url: order.approval_url,
                provider_order_id: order.id,
            });
        };

        let details = self
            .gateway
            .retrieve_order(wallet_order_id)
            .await?
            .ok_or_else(|| {
                PaymentError::provider("wallet", format!("unknown wallet order {wallet_order_id}"))
            })?;
        if details.reference_id != request.order_id {
            tracing::warn!(
                %wallet_order_id,
                reference_id = %details.reference_id,
                "wallet order belongs to another order"
            );
            return Ok(PaymentOutcome::Failed {
                reason: format!("wallet order {wallet_order_id} was not created for this order"),
            });
        }
        if details.amount != request.amount
            || !details.currency.eq_ignore_ascii_case(&request.currency)
        {
            return Ok(PaymentOutcome::Failed {
                reason: format!(
                    "wallet order is for {} {}, order total is {} {}",
                    details.amount, details.currency, request.amount, request.currency
                ),
            });
        }

        let capture = self.gateway.capture_order(wallet_order_id).await?;
        if capture.status != STATUS_COMPLETED {
            return Ok(PaymentOutcome::Failed {
                reason: format!("wallet capture status is {}", capture.status),
            });
        }
        if capture.amount != request.amount {
            return Ok(PaymentOutcome::Failed {
                reason: format!(
                    "captured {} does not match order total {}",
                    capture.amount, request.amount
                ),
            });
        }

        Ok(PaymentOutcome::Completed {
            provider_reference: capture.capture_id,
            amount: capture.amount,
            currency: request.currency.clone(),
            status: capture.status,
        })
    }
}

#[derive(Debug, Clone)]
struct WalletOrderRecord {
    reference_id: OrderId,
    amount: Money,
    currency: String,
    approved: bool,
    captured: bool,
}

#[derive(Debug, Default)]
struct InMemoryWalletState {
    orders: HashMap<String, WalletOrderRecord>,
    fail_on_create: bool,
}

/// In-memory wallet for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWalletGateway {
    state: Arc<RwLock<InMemoryWalletState>>,
}

impl InMemoryWalletGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the payer approving a wallet order.
    pub fn approve(&self, wallet_order_id: &str) {
        if let Some(order) = self.state.write().unwrap().orders.get_mut(wallet_order_id) {
            order.approved = true;
        }
    }

    /// Configures the gateway to refuse new orders.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }
}

#[async_trait]
impl WalletGateway for InMemoryWalletGateway {
    async fn create_order(
        &self,
        request: &PaymentRequest,
        config: &WalletConfig,
    ) -> Result<WalletOrder> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_create {
            return Err(PaymentError::provider("wallet", "wallet unreachable"));
        }

        let id = Uuid::new_v4().simple().to_string();
        state.orders.insert(
            id.clone(),
            WalletOrderRecord {
                reference_id: request.order_id,
                amount: request.amount,
                currency: request.currency.clone(),
                approved: false,
                captured: false,
            },
        );
        Ok(WalletOrder {
            approval_url: format!(
                "https://wallet.test/checkout?token={id}&return={}&cancel={}",
                config.return_url, config.cancel_url
            ),
            id,
        })
    }

    async fn retrieve_order(&self, wallet_order_id: &str) -> Result<Option<WalletOrderDetails>> {
        let state = self.state.read().unwrap();
        Ok(state.orders.get(wallet_order_id).map(|order| WalletOrderDetails {
            id: wallet_order_id.to_string(),
            reference_id: order.reference_id,
            amount: order.amount,
            currency: order.currency.clone(),
        }))
    }

    async fn capture_order(&self, wallet_order_id: &str) -> Result<WalletCapture> {
        let mut state = self.state.write().unwrap();
        let order = state.orders.get_mut(wallet_order_id).ok_or_else(|| {
            PaymentError::provider("wallet", format!("unknown wallet order {wallet_order_id}"))
        })?;

        let status = match (order.approved, order.captured) {
            (false, _) => "PAYER_ACTION_REQUIRED",
            (true, true) => "ALREADY_CAPTURED",
            (true, false) => {
                order.captured = true;
                STATUS_COMPLETED
            }
        };
        Ok(WalletCapture {
            capture_id: format!("cap-{wallet_order_id}"),
            status: status.to_string(),
            amount: order.amount,
        })
    }
}
