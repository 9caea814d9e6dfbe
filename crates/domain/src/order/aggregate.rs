//! Order root and its line items.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, OrderItemId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;
use crate::product::Product;
use crate::stock::StockLine;

use super::{OrderStatus, PaymentStatus};

/// Builds the human-facing order number, e.g. `ORD-20261018-1A2B3C4D`.
pub fn order_number(id: OrderId, placed_at: DateTime<Utc>) -> String {
    let simple = id.as_uuid().simple().to_string().to_uppercase();
    format!("ORD-{}-{}", placed_at.format("%Y%m%d"), &simple[..8])
}

/// Monetary breakdown supplied when an order is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderCharges {
    pub tax: Money,
    pub shipping: Money,
}

/// An order header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    /// Always `subtotal + tax + shipping`.
    pub total: Money,
    pub currency: String,
    pub payment_method: String,
    pub provider_payment_reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Creates a pending, unpaid order for the given line items.
    pub fn place(
        customer_id: CustomerId,
        items: &[PricedLine],
        charges: OrderCharges,
        currency: impl Into<String>,
        payment_method: impl Into<String>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if items.is_empty() {
            return Err(DomainError::NoItems);
        }
        for (field, amount) in [("tax", charges.tax), ("shipping", charges.shipping)] {
            if amount.is_negative() {
                return Err(DomainError::NegativeAmount { field, amount });
            }
        }

        let subtotal: Money = items.iter().map(PricedLine::line_total).sum();
        let id = OrderId::new();

        Ok(Self {
            id,
            order_number: order_number(id, now),
            customer_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            subtotal,
            tax: charges.tax,
            shipping: charges.shipping,
            total: subtotal + charges.tax + charges.shipping,
            currency: currency.into(),
            payment_method: payment_method.into(),
            provider_payment_reference: None,
            notes,
            created_at: now,
            updated_at: now,
            shipped_at: None,
            delivered_at: None,
        })
    }

    /// Checks the stored line totals against the order subtotal.
    pub fn verify_items(&self, items: &[OrderItem]) -> Result<(), DomainError> {
        let actual: Money = items.iter().map(|item| item.line_total).sum();
        if actual != self.subtotal {
            return Err(DomainError::TotalsMismatch {
                expected: self.subtotal,
                actual,
            });
        }
        Ok(())
    }

    /// Moves the order to `next`, stamping fulfilment timestamps.
    pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.status.ensure_transition(next)?;
        self.status = next;
        self.updated_at = now;
        match next {
            OrderStatus::Shipped => self.shipped_at = Some(now),
            OrderStatus::Delivered => {
                self.shipped_at.get_or_insert(now);
                self.delivered_at = Some(now);
            }
            _ => {}
        }
        Ok(())
    }

    /// Applies a partial update.
    ///
    /// Requesting the current status is a no-op, except for `Cancelled`, which
    /// is rejected so that stock restoration can only ever run once. Returns
    /// the previous status when the status actually changed.
    pub fn apply_patch(
        &mut self,
        patch: &OrderPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderStatus>, DomainError> {
        let mut previous = None;
        if let Some(next) = patch.status
            && (next != self.status || next == OrderStatus::Cancelled)
        {
            let from = self.status;
            self.transition(next, now)?;
            previous = Some(from);
        }
        if let Some(payment_status) = patch.payment_status {
            self.payment_status = payment_status;
        }
        if let Some(notes) = &patch.notes {
            self.notes = Some(notes.clone());
        }
        if let Some(reference) = &patch.provider_payment_reference {
            self.provider_payment_reference = Some(reference.clone());
        }
        self.updated_at = now;
        Ok(previous)
    }
}

/// Requested changes to an existing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub notes: Option<String>,
    pub provider_payment_reference: Option<String>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn payment(payment_status: PaymentStatus) -> Self {
        Self {
            payment_status: Some(payment_status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.payment_status.is_none()
            && self.notes.is_none()
            && self.provider_payment_reference.is_none()
    }
}

/// A requested line resolved against the catalog, before it belongs to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub product_sku: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl PricedLine {
    /// Captures name, sku and price from the product as of now.
    pub fn from_product(product: &Product, quantity: u32) -> Result<Self, DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity { quantity });
        }
        Ok(Self {
            product_id: product.id,
            product_name: product.name.clone(),
            product_sku: product.sku.clone(),
            quantity,
            unit_price: product.price,
        })
    }

    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }

    /// Attaches the line to a placed order.
    pub fn into_item(self, order_id: OrderId) -> OrderItem {
        let line_total = self.line_total();
        OrderItem {
            id: OrderItemId::new(),
            order_id,
            product_id: self.product_id,
            quantity: self.quantity,
            unit_price: self.unit_price,
            line_total,
            product_name: self.product_name,
            product_sku: self.product_sku,
        }
    }
}

/// A persisted order line with catalog snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    pub product_name: String,
    pub product_sku: String,
}

impl OrderItem {
    pub fn stock_line(&self) -> StockLine {
        StockLine::new(self.product_id, self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> Product {
        Product::new("Widget", "W-1", Money::from_cents(1000)).with_stock(10)
    }

    fn placed(lines: &[PricedLine]) -> Order {
        Order::place(
            CustomerId::new(),
            lines,
            OrderCharges {
                tax: Money::from_cents(200),
                shipping: Money::from_cents(500),
            },
            "USD",
            "card",
            None,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn place_computes_totals() {
        let lines = vec![PricedLine::from_product(&widget(), 3).unwrap()];
        let order = placed(&lines);

        assert_eq!(order.subtotal.cents(), 3000);
        assert_eq!(order.total.cents(), 3700);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.order_number.starts_with("ORD-"));
    }

    #[test]
    fn place_rejects_empty_and_negative() {
        let err = Order::place(
            CustomerId::new(),
            &[],
            OrderCharges::default(),
            "USD",
            "card",
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::NoItems);

        let lines = vec![PricedLine::from_product(&widget(), 1).unwrap()];
        let err = Order::place(
            CustomerId::new(),
            &lines,
            OrderCharges {
                tax: Money::from_cents(-1),
                shipping: Money::zero(),
            },
            "USD",
            "card",
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::NegativeAmount { field: "tax", .. }));
    }

    #[test]
    fn zero_quantity_line_is_rejected() {
        let err = PricedLine::from_product(&widget(), 0).unwrap_err();
        assert_eq!(err, DomainError::InvalidQuantity { quantity: 0 });
    }

    #[test]
    fn items_snapshot_catalog_and_match_subtotal() {
        let mut product = widget();
        let lines = vec![PricedLine::from_product(&product, 2).unwrap()];
        let order = placed(&lines);
        let items: Vec<OrderItem> = lines.into_iter().map(|l| l.into_item(order.id)).collect();

        product.name = "Renamed".to_string();
        assert_eq!(items[0].product_name, "Widget");
        assert_eq!(items[0].line_total.cents(), 2000);
        assert!(order.verify_items(&items).is_ok());
        assert!(order.verify_items(&items[..0]).is_err());
    }

    #[test]
    fn transition_stamps_timestamps() {
        let lines = vec![PricedLine::from_product(&widget(), 1).unwrap()];
        let mut order = placed(&lines);
        let now = Utc::now();

        order.transition(OrderStatus::Shipped, now).unwrap();
        assert_eq!(order.shipped_at, Some(now));

        order.transition(OrderStatus::Delivered, now).unwrap();
        assert_eq!(order.delivered_at, Some(now));
        assert!(order.transition(OrderStatus::Cancelled, now).is_err());
    }

    #[test]
    fn patch_same_status_is_noop_but_double_cancel_is_rejected() {
        let lines = vec![PricedLine::from_product(&widget(), 1).unwrap()];
        let mut order = placed(&lines);

        let previous = order
            .apply_patch(&OrderPatch::status(OrderStatus::Pending), Utc::now())
            .unwrap();
        assert_eq!(previous, None);

        let previous = order
            .apply_patch(&OrderPatch::status(OrderStatus::Cancelled), Utc::now())
            .unwrap();
        assert_eq!(previous, Some(OrderStatus::Pending));

        let err = order
            .apply_patch(&OrderPatch::status(OrderStatus::Cancelled), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn patch_updates_payment_fields() {
        let lines = vec![PricedLine::from_product(&widget(), 1).unwrap()];
        let mut order = placed(&lines);
        let patch = OrderPatch {
            payment_status: Some(PaymentStatus::Paid),
            provider_payment_reference: Some("pi_123".to_string()),
            ..OrderPatch::default()
        };

        order.apply_patch(&patch, Utc::now()).unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.provider_payment_reference.as_deref(), Some("pi_123"));
    }

    #[test]
    fn order_number_uses_date_and_id_prefix() {
        let id = OrderId::new();
        let at = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 10, 18, 12, 0, 0).unwrap();
        let number = order_number(id, at);
        assert!(number.starts_with("ORD-20261018-"));
        assert_eq!(number.len(), "ORD-20261018-".len() + 8);
    }
}
