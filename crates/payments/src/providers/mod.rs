//! Provider implementations.

pub mod card;
pub mod simulated;
pub mod wallet;

pub use card::{CardGateway, CardPaymentProvider, InMemoryCardGateway, PaymentIntent};
pub use simulated::{SimulatedProvider, SimulatedProviderConfig};
pub use wallet::{
    InMemoryWalletGateway, WalletCapture, WalletConfig, WalletGateway, WalletOrder,
    WalletOrderDetails, WalletPaymentProvider,
};
