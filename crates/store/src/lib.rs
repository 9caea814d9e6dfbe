//! Persistence for products, orders, order items and the stock movement ledger.
//!
//! [`Datastore`] is the contract the inventory ledger and the order sagas are
//! written against. [`InMemoryStore`] backs tests and local runs;
//! [`PostgresStore`] is the production implementation.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::OrderFilter;
pub use store::{Datastore, DatastoreExt, OrderUpdate};
