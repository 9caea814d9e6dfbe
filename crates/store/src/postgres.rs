use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, MovementId, OrderId, OrderItemId, ProductId};
use domain::{DomainError, Money, MovementRequest, Order, OrderItem, Product, StockMovement};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderFilter, Result, StoreError,
    store::{Datastore, OrderUpdate},
};

const PRODUCT_COLUMNS: &str = "id, name, sku, price_cents, stock, manage_stock, stock_status, low_stock_threshold, updated_at";

const ORDER_COLUMNS: &str = "id, order_number, customer_id, status, payment_status, subtotal_cents, tax_cents, shipping_cents, total_cents, currency, payment_method, provider_payment_reference, notes, created_at, updated_at, shipped_at, delivered_at";

const MOVEMENT_COLUMNS: &str = "id, product_id, movement_type, quantity, stock_before, stock_after, reason, reference, performed_by, created_at";

/// PostgreSQL-backed datastore implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL datastore.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            sku: row.try_get("sku")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: row.try_get("stock")?,
            manage_stock: row.try_get("manage_stock")?,
            stock_status: parse_column("products", row.try_get("stock_status")?)?,
            low_stock_threshold: row.try_get("low_stock_threshold")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_number: row.try_get("order_number")?,
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            status: parse_column("orders", row.try_get("status")?)?,
            payment_status: parse_column("orders", row.try_get("payment_status")?)?,
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            tax: Money::from_cents(row.try_get("tax_cents")?),
            shipping: Money::from_cents(row.try_get("shipping_cents")?),
            total: Money::from_cents(row.try_get("total_cents")?),
            currency: row.try_get("currency")?,
            payment_method: row.try_get("payment_method")?,
            provider_payment_reference: row.try_get("provider_payment_reference")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            shipped_at: row.try_get("shipped_at")?,
            delivered_at: row.try_get("delivered_at")?,
        })
    }

    fn row_to_item(row: PgRow) -> Result<OrderItem> {
        let quantity: i32 = row.try_get("quantity")?;
        Ok(OrderItem {
            id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            quantity: u32::try_from(quantity).map_err(|_| StoreError::InvalidRow {
                table: "order_items",
                reason: format!("negative quantity {quantity}"),
            })?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            line_total: Money::from_cents(row.try_get("line_total_cents")?),
            product_name: row.try_get("product_name")?,
            product_sku: row.try_get("product_sku")?,
        })
    }

    fn row_to_movement(row: PgRow) -> Result<StockMovement> {
        let quantity: i64 = row.try_get("quantity")?;
        Ok(StockMovement {
            id: MovementId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            movement_type: parse_column("inventory_movements", row.try_get("movement_type")?)?,
            quantity: quantity.unsigned_abs(),
            stock_before: row.try_get("stock_before")?,
            stock_after: row.try_get("stock_after")?,
            reason: row.try_get("reason")?,
            reference: row.try_get("reference")?,
            performed_by: row.try_get("performed_by")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn write_order<'e, E>(executor: E, update: &OrderUpdate) -> Result<u64>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let order = &update.order;
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = $3,
                payment_status = $4,
                provider_payment_reference = $5,
                notes = $6,
                updated_at = $7,
                shipped_at = $8,
                delivered_at = $9
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(update.expected_status.as_str())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.provider_payment_reference)
        .bind(&order.notes)
        .bind(order.updated_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }
}

fn parse_column<T>(table: &'static str, value: String) -> Result<T>
where
    T: FromStr<Err = DomainError>,
{
    value.parse().map_err(|e: DomainError| StoreError::InvalidRow {
        table,
        reason: e.to_string(),
    })
}

#[async_trait]
impl Datastore for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, sku, price_cents, stock, manage_stock, stock_status, low_stock_threshold, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                sku = EXCLUDED.sku,
                price_cents = EXCLUDED.price_cents,
                stock = EXCLUDED.stock,
                manage_stock = EXCLUDED.manage_stock,
                stock_status = EXCLUDED.stock_status,
                low_stock_threshold = EXCLUDED.low_stock_threshold,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.price.cents())
        .bind(product.stock)
        .bind(product.manage_stock)
        .bind(product.stock_status.as_str())
        .bind(product.low_stock_threshold)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    #[tracing::instrument(skip(self, request), fields(product_id = %request.product_id, delta = request.delta))]
    async fn apply_movement(&self, request: MovementRequest) -> Result<StockMovement> {
        request.validate()?;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        // Guarded change: a decrease only matches while enough stock remains
        let row = sqlx::query(&format!(
            "UPDATE products SET stock = stock + $2, updated_at = $3 \
             WHERE id = $1 AND stock + $2 >= 0 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(request.product_id.as_uuid())
        .bind(request.delta)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let available: Option<i64> =
                sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
                    .bind(request.product_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match available {
                Some(available) => StoreError::InsufficientStock {
                    product_id: request.product_id,
                    requested: request.delta.unsigned_abs(),
                    available,
                },
                None => StoreError::ProductNotFound(request.product_id),
            });
        };

        let mut product = Self::row_to_product(row)?;
        let before = product.stock - request.delta;
        let stored_status = product.stock_status;
        product.set_stock(product.stock, now);

        if product.stock_status != stored_status {
            sqlx::query("UPDATE products SET stock_status = $2 WHERE id = $1")
                .bind(product.id.as_uuid())
                .bind(product.stock_status.as_str())
                .execute(&mut *tx)
                .await?;
        }

        let movement = request.into_movement(before, now);
        sqlx::query(
            r#"
            INSERT INTO inventory_movements (id, product_id, movement_type, quantity, stock_before, stock_after, reason, reference, performed_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.product_id.as_uuid())
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity as i64)
        .bind(movement.stock_before)
        .bind(movement.stock_after)
        .bind(&movement.reason)
        .bind(&movement.reference)
        .bind(&movement.performed_by)
        .bind(movement.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(movement)
    }

    async fn movements_for_product(&self, product_id: ProductId) -> Result<Vec<StockMovement>> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements WHERE product_id = $1 ORDER BY seq ASC"
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_movement).collect()
    }

    async fn movements_by_reference(&self, reference: &str) -> Result<Vec<StockMovement>> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements WHERE reference = $1 ORDER BY seq ASC"
        ))
        .bind(reference)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_movement).collect()
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, customer_id, status, payment_status, subtotal_cents, tax_cents, shipping_cents, total_cents, currency, payment_method, provider_payment_reference, notes, created_at, updated_at, shipped_at, delivered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.customer_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.subtotal.cents())
        .bind(order.tax.cents())
        .bind(order.shipping.cents())
        .bind(order.total.cents())
        .bind(&order.currency)
        .bind(&order.payment_method)
        .bind(&order.provider_payment_reference)
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_order_by_payment_reference(&self, reference: &str) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE provider_payment_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if filter.ids.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND id = ANY(${param_count})"));
        }
        if filter.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }
        if filter.payment_status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND payment_status = ${param_count}"));
        }
        if filter.customer_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND customer_id = ${param_count}"));
        }

        sql.push_str(" ORDER BY created_at DESC, id ASC");

        if filter.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if filter.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut query = sqlx::query(&sql);

        if let Some(ids) = &filter.ids {
            query = query.bind(ids.iter().map(|id| id.as_uuid()).collect::<Vec<_>>());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(payment_status) = filter.payment_status {
            query = query.bind(payment_status.as_str());
        }
        if let Some(customer_id) = filter.customer_id {
            query = query.bind(customer_id.as_uuid());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit as i64);
        }
        if let Some(offset) = filter.offset {
            query = query.bind(offset as i64);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn update_order(&self, update: OrderUpdate) -> Result<()> {
        let written = Self::write_order(&self.pool, &update).await?;
        if written == 1 {
            return Ok(());
        }

        let order_id = update.order.id;
        let exists: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Err(StoreError::StatusChanged {
                order_id,
                expected: update.expected_status,
            }),
            None => Err(StoreError::OrderNotFound(order_id)),
        }
    }

    async fn update_orders(&self, updates: Vec<OrderUpdate>) -> Result<Vec<OrderId>> {
        let mut tx = self.pool.begin().await?;
        let mut written = Vec::with_capacity(updates.len());

        for update in &updates {
            if Self::write_order(&mut *tx, update).await? == 1 {
                written.push(update.order.id);
            }
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_order_items(&self, items: &[OrderItem]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, quantity, unit_price_cents, line_total_cents, product_name, product_sku)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(item.quantity as i32)
            .bind(item.unit_price.cents())
            .bind(item.line_total.cents())
            .bind(&item.product_name)
            .bind(&item.product_sku)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("order_items_order_id_fkey")
                {
                    return StoreError::OrderNotFound(item.order_id);
                }
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("order_items_product_id_fkey")
                {
                    return StoreError::ProductNotFound(item.product_id);
                }
                StoreError::Database(e)
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_items_for_orders(&self, order_ids: &[OrderId]) -> Result<Vec<OrderItem>> {
        let ids: Vec<Uuid> = order_ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, quantity, unit_price_cents, line_total_cents, product_name, product_sku
            FROM order_items
            WHERE order_id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn delete_order_items(&self, order_id: OrderId) -> Result<()> {
        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
