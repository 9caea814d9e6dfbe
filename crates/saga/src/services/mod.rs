//! External collaborators of the order saga.

pub mod customer;

pub use customer::{CustomerDetails, CustomerDirectory, InMemoryCustomerDirectory};
