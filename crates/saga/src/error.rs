//! Saga error types.

use common::OrderId;
use domain::DomainError;
use inventory::{ItemAvailability, LedgerError};
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by order creation, lifecycle updates and bulk actions.
///
/// Validation, not-found and availability errors are always returned before
/// anything is written.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request is malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// One or more items cannot be supplied from current stock.
    #[error("Insufficient stock for {} item(s)", shortfalls.len())]
    InsufficientStock { shortfalls: Vec<ItemAvailability> },

    /// The request conflicts with the current state of one or more orders.
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        order_ids: Vec<OrderId>,
    },

    /// A write failed; anything already written has been compensated.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Stock deduction failed after the order was written; the order was voided.
    #[error("Inventory processing failed, order voided: {0}")]
    InventoryProcessing(String),
}

impl SagaError {
    pub fn conflict(message: impl Into<String>, order_ids: Vec<OrderId>) -> Self {
        SagaError::Conflict {
            message: message.into(),
            order_ids,
        }
    }

    pub fn order_not_found(id: OrderId) -> Self {
        SagaError::NotFound {
            entity: "Order",
            id: id.to_string(),
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SagaError::Validation(_) => "validation",
            SagaError::NotFound { .. } => "not_found",
            SagaError::InsufficientStock { .. } => "insufficient_stock",
            SagaError::Conflict { .. } => "conflict",
            SagaError::Persistence(_) => "persistence",
            SagaError::InventoryProcessing(_) => "inventory_processing",
        }
    }
}

impl From<DomainError> for SagaError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidTransition { .. } => SagaError::conflict(err.to_string(), vec![]),
            other => SagaError::Validation(other.to_string()),
        }
    }
}

impl From<StoreError> for SagaError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OrderNotFound(id) => SagaError::order_not_found(id),
            StoreError::ProductNotFound(id) => SagaError::NotFound {
                entity: "Product",
                id: id.to_string(),
            },
            StoreError::StatusChanged { order_id, .. } => {
                SagaError::conflict(err.to_string(), vec![order_id])
            }
            StoreError::Domain(e) => e.into(),
            other => SagaError::Persistence(other.to_string()),
        }
    }
}

impl From<LedgerError> for SagaError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientStock { shortfalls } => {
                SagaError::InsufficientStock { shortfalls }
            }
            LedgerError::ProductNotFound(id) => SagaError::NotFound {
                entity: "Product",
                id: id.to_string(),
            },
            LedgerError::InvalidRequest(msg) => SagaError::Validation(msg),
            other => SagaError::Persistence(other.to_string()),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
