//! Shared identifier types used across the order and inventory crates.

pub mod types;

pub use types::{CustomerId, MovementId, OrderId, OrderItemId, ProductId};
