//! Order orchestration: creation saga, lifecycle updates and bulk actions.
//!
//! Order creation follows the saga pattern: each step that writes records
//! how to undo itself, and a failure after the first write compensates the
//! completed steps in reverse order.
//!
//! 1. Resolve the customer
//! 2. Check stock for every line
//! 3. Insert the order header
//! 4. Insert the order lines
//! 5. Deduct stock through the ledger
//!
//! Lifecycle updates and bulk actions guard every status write on the status
//! they were computed from, so stock is returned exactly once per cancelled
//! order.

pub mod bulk;
pub mod compensation;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod order_creation;
pub mod services;

pub use bulk::{BulkAction, BulkOrderAggregator, BulkOutcome, BulkRequest, BulkTarget, RejectedOrder};
pub use compensation::{CompensableStep, CompensationOutcome, SagaLog, SagaState};
pub use coordinator::{CreateOrderRequest, OrderLineRequest, OrderSagaCoordinator, PlacedOrder};
pub use error::{Result, SagaError};
pub use lifecycle::{CancellationReport, OrderDetails, OrderLifecycleManager, OrderUpdateOutcome};
pub use services::{CustomerDetails, CustomerDirectory, InMemoryCustomerDirectory};
