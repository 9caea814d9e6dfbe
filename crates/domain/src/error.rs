//! Domain error types.

use thiserror::Error;

use crate::money::Money;
use crate::order::OrderStatus;

/// Errors raised by domain rules before anything touches the datastore.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Quantities must be strictly positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// A monetary field was negative.
    #[error("Invalid amount for {field}: {amount} (must not be negative)")]
    NegativeAmount { field: &'static str, amount: Money },

    /// An order needs at least one line.
    #[error("Order has no items")]
    NoItems,

    /// The status machine does not allow this move.
    #[error("Invalid status transition: cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Line totals do not add up to the order subtotal.
    #[error("Order totals mismatch: expected {expected}, found {actual}")]
    TotalsMismatch { expected: Money, actual: Money },

    /// A status string did not match any known value.
    #[error("Unknown {kind}: {value}")]
    UnknownValue { kind: &'static str, value: String },

    /// A stock movement was requested with no effect.
    #[error("Stock movement for product {product} has zero quantity")]
    EmptyMovement { product: String },
}
