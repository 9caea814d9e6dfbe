use async_trait::async_trait;
use common::{OrderId, ProductId};
use domain::{MovementRequest, Order, OrderItem, OrderStatus, Product, StockMovement};

use crate::{OrderFilter, Result, StoreError};

/// A guarded write of an order row.
///
/// The row is replaced only if the stored status still equals
/// `expected_status`, so two requests racing on the same order cannot both
/// win a status transition.
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub order: Order,
    pub expected_status: OrderStatus,
}

impl OrderUpdate {
    pub fn new(order: Order, expected_status: OrderStatus) -> Self {
        Self {
            order,
            expected_status,
        }
    }
}

/// Core trait for datastore implementations.
///
/// The datastore owns four tables: `products`, `orders`, `order_items` and
/// `inventory_movements`. Each method is a single round trip; multi-row
/// writes (`insert_order_items`, `apply_movement`, `update_orders`) are atomic.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Short name of the backing storage, for health reporting.
    fn backend(&self) -> &'static str;

    /// Inserts or replaces a catalog product.
    async fn upsert_product(&self, product: Product) -> Result<()>;

    /// Loads a product by id.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Loads several products; missing ids are simply absent from the result.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Applies a stock change and appends its movement record atomically.
    ///
    /// Negative deltas are conditional: if the product has less stock than
    /// requested, nothing is written and `InsufficientStock` is returned. The
    /// stored stock status is re-derived in the same write for managed products.
    async fn apply_movement(&self, request: MovementRequest) -> Result<StockMovement>;

    /// Returns a product's movements, oldest first.
    async fn movements_for_product(&self, product_id: ProductId) -> Result<Vec<StockMovement>>;

    /// Returns all movements carrying the given reference, oldest first.
    async fn movements_by_reference(&self, reference: &str) -> Result<Vec<StockMovement>>;

    /// Inserts a new order header.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Loads an order by id.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Finds the order a provider payment reference is recorded on.
    async fn find_order_by_payment_reference(&self, reference: &str) -> Result<Option<Order>>;

    /// Lists orders matching a filter, newest first.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>>;

    /// Replaces an order row if its status is unchanged since it was read.
    ///
    /// Fails with `StatusChanged` when the guard does not hold.
    async fn update_order(&self, update: OrderUpdate) -> Result<()>;

    /// Applies several guarded updates in one transaction.
    ///
    /// Rows whose guard fails are skipped; returns the ids actually written.
    async fn update_orders(&self, updates: Vec<OrderUpdate>) -> Result<Vec<OrderId>>;

    /// Deletes an order header.
    async fn delete_order(&self, id: OrderId) -> Result<()>;

    /// Inserts all lines of an order, all or nothing.
    async fn insert_order_items(&self, items: &[OrderItem]) -> Result<()>;

    /// Loads the lines of several orders.
    async fn get_items_for_orders(&self, order_ids: &[OrderId]) -> Result<Vec<OrderItem>>;

    /// Deletes every line of an order.
    async fn delete_order_items(&self, order_id: OrderId) -> Result<()>;
}

/// Extension trait providing convenience methods for datastores.
#[async_trait]
pub trait DatastoreExt: Datastore {
    /// Loads an order, failing with `OrderNotFound` if it is absent.
    async fn require_order(&self, id: OrderId) -> Result<Order> {
        self.get_order(id)
            .await?
            .ok_or(StoreError::OrderNotFound(id))
    }

    /// Loads a product, failing with `ProductNotFound` if it is absent.
    async fn require_product(&self, id: ProductId) -> Result<Product> {
        self.get_product(id)
            .await?
            .ok_or(StoreError::ProductNotFound(id))
    }

    /// Loads the lines of a single order.
    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        self.get_items_for_orders(&[order_id]).await
    }
}

// Blanket implementation for all Datastore implementations
impl<T: Datastore + ?Sized> DatastoreExt for T {}
