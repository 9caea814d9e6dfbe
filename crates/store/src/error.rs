use common::{OrderId, ProductId};
use domain::{DomainError, OrderStatus};
use thiserror::Error;

/// Errors that can occur when reading or writing the datastore.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No product row with this id.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// No order row with this id.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A guarded stock decrease found less stock than requested.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u64,
        available: i64,
    },

    /// The order's status changed since it was read.
    #[error("Order {order_id} is no longer {expected}")]
    StatusChanged {
        order_id: OrderId,
        expected: OrderStatus,
    },

    /// A row or request violated a domain rule.
    #[error("Domain rule violated: {0}")]
    Domain(#[from] DomainError),

    /// A stored value could not be mapped back into the model.
    #[error("Invalid row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },

    /// Write refused by an injected fault (in-memory store only).
    #[error("Datastore unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for datastore operations.
pub type Result<T> = std::result::Result<T, StoreError>;
