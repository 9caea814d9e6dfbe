//! Application configuration loaded from environment variables.

use std::time::Duration;

use inventory::LedgerConfig;
use payments::{SimulatedProviderConfig, WalletConfig};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: Postgres connection string; in-memory store when unset
/// - `STOCK_ALERT_RECIPIENTS`: comma-separated addresses for stock alerts
/// - `DEFAULT_CURRENCY`: currency for orders that do not name one (default: `"USD"`)
/// - `SIMULATED_PAYMENT_DELAY_MS`: delay of the stand-in providers (default: `1500`)
/// - `WALLET_RETURN_URL` / `WALLET_CANCEL_URL`: wallet redirect targets
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub stock_alert_recipients: Vec<String>,
    pub default_currency: String,
    pub simulated_payment_delay: Duration,
    pub wallet_return_url: String,
    pub wallet_cancel_url: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            stock_alert_recipients: lookup("STOCK_ALERT_RECIPIENTS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            default_currency: lookup("DEFAULT_CURRENCY")
                .map(|c| c.to_uppercase())
                .unwrap_or(defaults.default_currency),
            simulated_payment_delay: lookup("SIMULATED_PAYMENT_DELAY_MS")
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.simulated_payment_delay),
            wallet_return_url: lookup("WALLET_RETURN_URL").unwrap_or(defaults.wallet_return_url),
            wallet_cancel_url: lookup("WALLET_CANCEL_URL").unwrap_or(defaults.wallet_cancel_url),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            alert_recipients: self.stock_alert_recipients.clone(),
        }
    }

    pub fn simulated_provider_config(&self) -> SimulatedProviderConfig {
        SimulatedProviderConfig {
            delay: self.simulated_payment_delay,
        }
    }

    pub fn wallet_config(&self) -> WalletConfig {
        WalletConfig {
            return_url: self.wallet_return_url.clone(),
            cancel_url: self.wallet_cancel_url.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let wallet = WalletConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            stock_alert_recipients: Vec::new(),
            default_currency: "USD".to_string(),
            simulated_payment_delay: Duration::from_millis(1500),
            wallet_return_url: wallet.return_url,
            wallet_cancel_url: wallet.cancel_url,
        }
    }
}
