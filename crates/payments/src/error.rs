//! Payment error types.

use common::OrderId;
use store::StoreError;
use thiserror::Error;

/// Errors raised while capturing a payment.
///
/// None of these leave a trace on the order: the order is only written after
/// a provider reports a completed payment. `CaptureNotRecorded` is the one
/// case where money moved without the order knowing.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// No provider is registered for the requested method.
    #[error("Unsupported payment method: {0}")]
    UnknownMethod(String),

    /// The provider-specific payload is missing a field or malformed.
    #[error("Invalid payment data: {0}")]
    InvalidPaymentData(String),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order cannot take a payment in its current state.
    #[error("Order {order_id} cannot be paid: {reason}")]
    InvalidOrderState { order_id: OrderId, reason: String },

    /// The provider or its gateway failed.
    #[error("Payment provider {provider} failed: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// The provider captured the funds but the order could not be marked paid.
    #[error("Payment {provider_reference} was captured but not recorded on order {order_id}: {reason}")]
    CaptureNotRecorded {
        order_id: OrderId,
        provider_reference: String,
        reason: String,
    },

    /// Writing the payment result failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl PaymentError {
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        PaymentError::Provider {
            provider,
            message: message.into(),
        }
    }
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;
