//! Orders, order lines and their status rules.

mod aggregate;
mod state;

pub use aggregate::{Order, OrderCharges, OrderItem, OrderPatch, PricedLine, order_number};
pub use state::{OrderStatus, PaymentStatus};
