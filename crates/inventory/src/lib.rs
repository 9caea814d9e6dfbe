//! Stock ledger for the order core.
//!
//! [`StockLedger`] owns product stock levels: it checks availability,
//! deducts and restores stock through guarded movements, applies manual
//! adjustments and raises low-stock alerts through a [`StockAlertNotifier`].

pub mod error;
pub mod ledger;
pub mod notifier;
pub mod reconcile;

pub use error::LedgerError;
pub use ledger::{
    AvailabilityReport, FailedLine, ItemAvailability, LedgerConfig, MovementContext,
    StockChangeReport, StockLedger,
};
pub use notifier::{
    InMemoryNotifier, NotifyError, StockAlert, StockAlertNotifier, TracingNotifier,
};
pub use reconcile::{ChainBreak, ReconciliationReport, reconcile};
