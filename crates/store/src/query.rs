use common::{CustomerId, OrderId};
use domain::{Order, OrderStatus, PaymentStatus};
use serde::Deserialize;

/// Filter for listing orders.
///
/// Used by order listings and by bulk actions whose target set is described
/// by criteria instead of explicit ids.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    /// Only these orders.
    pub ids: Option<Vec<OrderId>>,

    /// Filter by fulfilment status.
    pub status: Option<OrderStatus>,

    /// Filter by payment status.
    pub payment_status: Option<PaymentStatus>,

    /// Filter by customer.
    pub customer_id: Option<CustomerId>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderFilter {
    /// Creates a new empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter matching exactly the given orders.
    pub fn for_ids(ids: Vec<OrderId>) -> Self {
        Self {
            ids: Some(ids),
            ..Default::default()
        }
    }

    /// Filters by fulfilment status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters by payment status.
    pub fn payment_status(mut self, payment_status: PaymentStatus) -> Self {
        self.payment_status = Some(payment_status);
        self
    }

    /// Filters by customer.
    pub fn customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    /// Sets the maximum number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of results to skip.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if no criterion narrows the set.
    pub fn is_unbounded(&self) -> bool {
        self.ids.is_none()
            && self.status.is_none()
            && self.payment_status.is_none()
            && self.customer_id.is_none()
    }

    /// Returns true if the order satisfies every criterion.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(ref ids) = self.ids
            && !ids.contains(&order.id)
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if let Some(payment_status) = self.payment_status
            && order.payment_status != payment_status
        {
            return false;
        }
        if let Some(customer_id) = self.customer_id
            && order.customer_id != customer_id
        {
            return false;
        }
        true
    }
}
