use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, ProductId};
use domain::{MovementRequest, Order, OrderItem, Product, StockMovement};
use tokio::sync::RwLock;

use crate::{
    OrderFilter, Result, StoreError,
    store::{Datastore, OrderUpdate},
};

/// Write failures that tests can switch on to exercise compensation paths.
#[derive(Debug, Default)]
struct Faults {
    order_insert: bool,
    item_insert: bool,
    order_delete: bool,
    restock: bool,
    movement_for: HashSet<ProductId>,
}

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    movements: Vec<StockMovement>,
    orders: HashMap<OrderId, Order>,
    items: Vec<OrderItem>,
    faults: Faults,
}

/// In-memory datastore for tests and local runs.
///
/// A single lock guards all four tables, so every method is atomic with
/// respect to the others, matching the transactional behaviour of the
/// PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of order rows.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns the number of order item rows.
    pub async fn item_count(&self) -> usize {
        self.tables.read().await.items.len()
    }

    /// Returns the number of movement rows.
    pub async fn movement_count(&self) -> usize {
        self.tables.read().await.movements.len()
    }

    /// Overwrites a product's cached stock without writing a movement.
    ///
    /// Only useful for simulating drift between the cache and the ledger.
    pub async fn force_stock(&self, product_id: ProductId, stock: i64) {
        if let Some(product) = self.tables.write().await.products.get_mut(&product_id) {
            product.stock = stock;
        }
    }

    /// Makes the next order inserts fail.
    pub async fn set_fail_on_order_insert(&self, fail: bool) {
        self.tables.write().await.faults.order_insert = fail;
    }

    /// Makes order item inserts fail.
    pub async fn set_fail_on_item_insert(&self, fail: bool) {
        self.tables.write().await.faults.item_insert = fail;
    }

    /// Makes order deletes fail.
    pub async fn set_fail_on_order_delete(&self, fail: bool) {
        self.tables.write().await.faults.order_delete = fail;
    }

    /// Makes every stock increase fail.
    pub async fn set_fail_on_restock(&self, fail: bool) {
        self.tables.write().await.faults.restock = fail;
    }

    /// Makes every movement for one product fail.
    pub async fn fail_movements_for(&self, product_id: ProductId) {
        self.tables
            .write()
            .await
            .faults
            .movement_for
            .insert(product_id);
    }

    /// Switches all injected failures off.
    pub async fn clear_faults(&self) {
        self.tables.write().await.faults = Faults::default();
    }
}

#[async_trait]
impl Datastore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        self.tables
            .write()
            .await
            .products
            .insert(product.id, product);
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.products.get(id).cloned())
            .collect())
    }

    async fn apply_movement(&self, request: MovementRequest) -> Result<StockMovement> {
        request.validate()?;

        let mut tables = self.tables.write().await;

        if tables.faults.movement_for.contains(&request.product_id)
            || (tables.faults.restock && request.delta > 0)
        {
            return Err(StoreError::Unavailable(format!(
                "movement write refused for product {}",
                request.product_id
            )));
        }

        let product = tables
            .products
            .get_mut(&request.product_id)
            .ok_or(StoreError::ProductNotFound(request.product_id))?;

        let before = product.stock;
        let after = before + request.delta;
        if after < 0 {
            return Err(StoreError::InsufficientStock {
                product_id: request.product_id,
                requested: request.delta.unsigned_abs(),
                available: before,
            });
        }

        let now = Utc::now();
        product.set_stock(after, now);

        let movement = request.into_movement(before, now);
        tables.movements.push(movement.clone());
        Ok(movement)
    }

    async fn movements_for_product(&self, product_id: ProductId) -> Result<Vec<StockMovement>> {
        let tables = self.tables.read().await;
        Ok(tables
            .movements
            .iter()
            .filter(|m| m.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn movements_by_reference(&self, reference: &str) -> Result<Vec<StockMovement>> {
        let tables = self.tables.read().await;
        Ok(tables
            .movements
            .iter()
            .filter(|m| m.reference.as_deref() == Some(reference))
            .cloned()
            .collect())
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.faults.order_insert {
            return Err(StoreError::Unavailable("order insert refused".to_string()));
        }
        tables.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_payment_reference(&self, reference: &str) -> Result<Option<Order>> {
        Ok(self
            .tables
            .read()
            .await
            .orders
            .values()
            .find(|o| o.provider_payment_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<_> = tables
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let offset = filter.offset.unwrap_or(0);
        let orders = orders.into_iter().skip(offset);
        Ok(match filter.limit {
            Some(limit) => orders.take(limit).collect(),
            None => orders.collect(),
        })
    }

    async fn update_order(&self, update: OrderUpdate) -> Result<()> {
        let mut tables = self.tables.write().await;
        let order_id = update.order.id;
        let stored = tables
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if stored.status != update.expected_status {
            return Err(StoreError::StatusChanged {
                order_id,
                expected: update.expected_status,
            });
        }
        *stored = update.order;
        Ok(())
    }

    async fn update_orders(&self, updates: Vec<OrderUpdate>) -> Result<Vec<OrderId>> {
        let mut tables = self.tables.write().await;
        let mut written = Vec::with_capacity(updates.len());

        for update in updates {
            if let Some(stored) = tables.orders.get_mut(&update.order.id)
                && stored.status == update.expected_status
            {
                written.push(update.order.id);
                *stored = update.order;
            }
        }
        Ok(written)
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.faults.order_delete {
            return Err(StoreError::Unavailable("order delete refused".to_string()));
        }
        tables.orders.remove(&id);
        tables.items.retain(|item| item.order_id != id);
        Ok(())
    }

    async fn insert_order_items(&self, items: &[OrderItem]) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.faults.item_insert {
            return Err(StoreError::Unavailable("order item insert refused".to_string()));
        }
        if let Some(item) = items.iter().find(|i| !tables.orders.contains_key(&i.order_id)) {
            return Err(StoreError::OrderNotFound(item.order_id));
        }
        tables.items.extend_from_slice(items);
        Ok(())
    }

    async fn get_items_for_orders(&self, order_ids: &[OrderId]) -> Result<Vec<OrderItem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .items
            .iter()
            .filter(|item| order_ids.contains(&item.order_id))
            .cloned()
            .collect())
    }

    async fn delete_order_items(&self, order_id: OrderId) -> Result<()> {
        self.tables
            .write()
            .await
            .items
            .retain(|item| item.order_id != order_id);
        Ok(())
    }
}
