//! Domain model for the order and inventory core.
//!
//! Everything here is pure: products and their derived stock status, the
//! stock movement record and the alert rule evaluated on each movement, and
//! orders with their status machine. Persistence lives in the `store` crate.

pub mod error;
pub mod money;
pub mod order;
pub mod product;
pub mod stock;

pub use error::DomainError;
pub use money::Money;
pub use order::{
    Order, OrderCharges, OrderItem, OrderPatch, OrderStatus, PaymentStatus, PricedLine,
};
pub use product::{DEFAULT_LOW_STOCK_THRESHOLD, Product, StockStatus};
pub use stock::{
    MovementRequest, MovementType, StockAlertKind, StockLine, StockMovement, evaluate_alert,
};
