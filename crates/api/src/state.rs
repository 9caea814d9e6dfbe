//! Shared application state.

use std::sync::Arc;

use inventory::{StockAlertNotifier, StockLedger};
use payments::{PaymentProcessor, ProviderRegistry};
use saga::{BulkOrderAggregator, CustomerDirectory, OrderLifecycleManager, OrderSagaCoordinator};
use store::Datastore;

/// Services shared by all handlers.
pub struct AppState<S> {
    pub store: S,
    pub ledger: StockLedger<S>,
    pub orders: OrderSagaCoordinator<S>,
    pub lifecycle: OrderLifecycleManager<S>,
    pub bulk: BulkOrderAggregator<S>,
    pub payments: PaymentProcessor<S>,
    /// Currency applied to orders that do not name one.
    pub default_currency: String,
}

impl<S: Datastore + Clone> AppState<S> {
    /// Wires every service onto one datastore.
    pub fn new(
        store: S,
        ledger_config: inventory::LedgerConfig,
        notifier: Arc<dyn StockAlertNotifier>,
        customers: Arc<dyn CustomerDirectory>,
        providers: ProviderRegistry,
        default_currency: impl Into<String>,
    ) -> Self {
        let ledger = StockLedger::new(store.clone(), notifier, ledger_config);
        Self {
            orders: OrderSagaCoordinator::new(ledger.clone(), customers),
            lifecycle: OrderLifecycleManager::new(ledger.clone()),
            bulk: BulkOrderAggregator::new(ledger.clone()),
            payments: PaymentProcessor::new(store.clone(), providers),
            ledger,
            store,
            default_currency: default_currency.into(),
        }
    }
}
