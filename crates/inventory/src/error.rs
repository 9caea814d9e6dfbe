//! Stock ledger error types.

use common::ProductId;
use store::StoreError;
use thiserror::Error;

use crate::ledger::ItemAvailability;

/// Errors that can occur during stock ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// One or more items cannot be supplied from current stock.
    #[error("Insufficient stock for {} item(s)", shortfalls.len())]
    InsufficientStock { shortfalls: Vec<ItemAvailability> },

    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The request itself is malformed.
    #[error("Invalid stock request: {0}")]
    InvalidRequest(String),

    /// A stock write failed after the request was validated.
    #[error("Stock write failed for product {product_id}: {source}")]
    Persistence {
        product_id: ProductId,
        #[source]
        source: StoreError,
    },

    /// A read from the datastore failed.
    #[error("Datastore error: {0}")]
    Store(#[from] StoreError),
}
