//! Payment capture for placed orders.
//!
//! Every provider flow is reduced to one [`PaymentOutcome`]:
//!
//! - `Completed`: funds captured; the order is marked paid
//! - `RequiresApproval`: the payer must approve at a redirect URL first
//! - `Failed`: declined; the order stays unpaid
//!
//! Providers are selected through a [`ProviderRegistry`] keyed by the
//! order's payment method tag.

pub mod error;
pub mod processor;
pub mod provider;
pub mod providers;

pub use error::{PaymentError, Result};
pub use processor::PaymentProcessor;
pub use provider::{PaymentOutcome, PaymentProvider, PaymentRequest, ProviderRegistry};
pub use providers::{
    CardGateway, CardPaymentProvider, InMemoryCardGateway, InMemoryWalletGateway, PaymentIntent,
    SimulatedProvider, SimulatedProviderConfig, WalletConfig, WalletGateway, WalletOrderDetails,
    WalletPaymentProvider,
};
