//! Catalog products as seen by the stock ledger.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;

/// Threshold used when a product does not carry its own.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;

/// Availability classification of a product.
///
/// For products whose stock is managed, the status is always derived from the
/// stock level and threshold (see [`StockStatus::derive`]). `OnBackorder` and
/// `PreOrder` are assigned by the catalog and only survive on unmanaged products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    #[default]
    InStock,
    LowStock,
    OutOfStock,
    OnBackorder,
    PreOrder,
}

impl StockStatus {
    /// Derives the status for a managed product.
    pub fn derive(stock: i64, low_stock_threshold: i64) -> Self {
        if stock <= 0 {
            StockStatus::OutOfStock
        } else if stock <= low_stock_threshold {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::OnBackorder => "on_backorder",
            StockStatus::PreOrder => "pre_order",
        }
    }
}

impl std::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StockStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_stock" => Ok(StockStatus::InStock),
            "low_stock" => Ok(StockStatus::LowStock),
            "out_of_stock" => Ok(StockStatus::OutOfStock),
            "on_backorder" => Ok(StockStatus::OnBackorder),
            "pre_order" => Ok(StockStatus::PreOrder),
            other => Err(DomainError::UnknownValue {
                kind: "stock status",
                value: other.to_string(),
            }),
        }
    }
}

/// A product row: the catalog snapshot fields plus its cached stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub price: Money,
    /// Cached projection of the movement ledger. Never negative.
    pub stock: i64,
    /// When false, availability checks always pass and stock is left alone.
    pub manage_stock: bool,
    pub stock_status: StockStatus,
    pub low_stock_threshold: i64,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates a managed product with no stock and the default threshold.
    pub fn new(name: impl Into<String>, sku: impl Into<String>, price: Money) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            sku: sku.into(),
            price,
            stock: 0,
            manage_stock: true,
            stock_status: StockStatus::OutOfStock,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            updated_at: Utc::now(),
        }
    }

    /// Sets the starting stock level.
    pub fn with_stock(mut self, stock: i64) -> Self {
        self.stock = stock.max(0);
        self.refresh_status();
        self
    }

    /// Sets the low-stock threshold.
    pub fn with_threshold(mut self, threshold: i64) -> Self {
        self.low_stock_threshold = threshold;
        self.refresh_status();
        self
    }

    /// Turns off stock management, keeping the given catalog status.
    pub fn unmanaged(mut self, status: StockStatus) -> Self {
        self.manage_stock = false;
        self.stock_status = status;
        self
    }

    /// Returns true if `quantity` units can be sold right now.
    pub fn can_supply(&self, quantity: u32) -> bool {
        !self.manage_stock || i64::from(quantity) <= self.stock
    }

    /// Stores a new stock level and re-derives the status.
    pub fn set_stock(&mut self, stock: i64, now: DateTime<Utc>) {
        self.stock = stock;
        self.updated_at = now;
        self.refresh_status();
    }

    fn refresh_status(&mut self) {
        if self.manage_stock {
            self.stock_status = StockStatus::derive(self.stock, self.low_stock_threshold);
        }
    }
}
