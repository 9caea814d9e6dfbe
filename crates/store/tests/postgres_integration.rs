//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{CustomerId, OrderId, ProductId};
use domain::{
    Money, MovementRequest, MovementType, Order, OrderCharges, OrderItem, OrderStatus,
    PaymentStatus, PricedLine, Product, StockStatus,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{Datastore, DatastoreExt, OrderFilter, OrderUpdate, PostgresStore, StoreError};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_commerce_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    // Create a fresh pool for each test to avoid connection issues
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    // Clear tables for test isolation
    sqlx::query("TRUNCATE TABLE inventory_movements, order_items, orders, products")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

async fn seed_product(store: &PostgresStore, sku: &str, stock: i64) -> Product {
    let product = Product::new(format!("Product {sku}"), sku, Money::from_cents(1250))
        .with_stock(stock);
    store.upsert_product(product.clone()).await.unwrap();
    product
}

fn place_order(products: &[(&Product, u32)]) -> (Order, Vec<OrderItem>) {
    let lines: Vec<PricedLine> = products
        .iter()
        .map(|(p, q)| PricedLine::from_product(p, *q).unwrap())
        .collect();
    let order = Order::place(
        CustomerId::new(),
        &lines,
        OrderCharges {
            tax: Money::from_cents(100),
            shipping: Money::from_cents(500),
        },
        "USD",
        "card",
        Some("leave at door".to_string()),
        Utc::now(),
    )
    .unwrap();
    let items = lines.into_iter().map(|l| l.into_item(order.id)).collect();
    (order, items)
}

#[tokio::test]
#[serial]
async fn product_round_trip() {
    let store = get_test_store().await;
    let product = seed_product(&store, "SKU-1", 12).await;

    let loaded = store.require_product(product.id).await.unwrap();
    assert_eq!(loaded.sku, "SKU-1");
    assert_eq!(loaded.stock, 12);
    assert_eq!(loaded.price, Money::from_cents(1250));
    assert_eq!(loaded.stock_status, StockStatus::InStock);

    assert!(store.get_product(ProductId::new()).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn movement_updates_stock_status_and_ledger() {
    let store = get_test_store().await;
    let product = seed_product(&store, "SKU-2", 8).await;

    let movement = store
        .apply_movement(
            MovementRequest::outbound(product.id, 5, "order placed").reference("ORD-TEST-1"),
        )
        .await
        .unwrap();
    assert_eq!(movement.stock_before, 8);
    assert_eq!(movement.stock_after, 3);

    let loaded = store.require_product(product.id).await.unwrap();
    assert_eq!(loaded.stock, 3);
    assert_eq!(loaded.stock_status, StockStatus::LowStock);

    store
        .apply_movement(MovementRequest::inbound(product.id, 2, "order cancelled"))
        .await
        .unwrap();

    let history = store.movements_for_product(product.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].movement_type, MovementType::Out);
    assert_eq!(history[1].movement_type, MovementType::In);
    assert_eq!(history[1].stock_after, 5);

    let referenced = store.movements_by_reference("ORD-TEST-1").await.unwrap();
    assert_eq!(referenced.len(), 1);
}

#[tokio::test]
#[serial]
async fn guarded_decrement_refuses_oversell() {
    let store = get_test_store().await;
    let product = seed_product(&store, "SKU-3", 2).await;

    let err = store
        .apply_movement(MovementRequest::outbound(product.id, 3, "order placed"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::InsufficientStock {
            requested: 3,
            available: 2,
            ..
        }
    ));

    assert_eq!(store.require_product(product.id).await.unwrap().stock, 2);
    assert!(store.movements_for_product(product.id).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn concurrent_decrements_never_oversell() {
    let store = get_test_store().await;
    let product = seed_product(&store, "SKU-4", 5).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        let product_id = product.id;
        handles.push(tokio::spawn(async move {
            store
                .apply_movement(MovementRequest::outbound(product_id, 1, "order placed"))
                .await
                .is_ok()
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 5);
    let loaded = store.require_product(product.id).await.unwrap();
    assert_eq!(loaded.stock, 0);
    assert_eq!(loaded.stock_status, StockStatus::OutOfStock);
}

#[tokio::test]
#[serial]
async fn order_and_items_round_trip() {
    let store = get_test_store().await;
    let a = seed_product(&store, "SKU-5", 10).await;
    let b = seed_product(&store, "SKU-6", 10).await;
    let (order, items) = place_order(&[(&a, 2), (&b, 1)]);

    store.insert_order(&order).await.unwrap();
    store.insert_order_items(&items).await.unwrap();

    let loaded = store.require_order(order.id).await.unwrap();
    assert_eq!(loaded.order_number, order.order_number);
    assert_eq!(loaded.total, order.total);
    assert_eq!(loaded.notes.as_deref(), Some("leave at door"));

    let stored_items = store.get_order_items(order.id).await.unwrap();
    assert_eq!(stored_items.len(), 2);
    assert!(loaded.verify_items(&stored_items).is_ok());
}

#[tokio::test]
#[serial]
async fn items_for_missing_order_are_rejected_atomically() {
    let store = get_test_store().await;
    let product = seed_product(&store, "SKU-7", 10).await;
    let (_, items) = place_order(&[(&product, 1)]);

    let err = store.insert_order_items(&items).await.unwrap_err();
    assert!(matches!(err, StoreError::OrderNotFound(_)));
}

#[tokio::test]
#[serial]
async fn delete_order_cascades_items() {
    let store = get_test_store().await;
    let product = seed_product(&store, "SKU-8", 10).await;
    let (order, items) = place_order(&[(&product, 1)]);
    store.insert_order(&order).await.unwrap();
    store.insert_order_items(&items).await.unwrap();

    store.delete_order(order.id).await.unwrap();

    assert!(store.get_order(order.id).await.unwrap().is_none());
    assert!(store.get_order_items(order.id).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn guarded_update_rejects_stale_status() {
    let store = get_test_store().await;
    let product = seed_product(&store, "SKU-9", 10).await;
    let (order, _) = place_order(&[(&product, 1)]);
    store.insert_order(&order).await.unwrap();

    let mut cancelled = order.clone();
    cancelled
        .transition(OrderStatus::Cancelled, Utc::now())
        .unwrap();
    store
        .update_order(OrderUpdate::new(cancelled.clone(), OrderStatus::Pending))
        .await
        .unwrap();

    let err = store
        .update_order(OrderUpdate::new(cancelled, OrderStatus::Pending))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::StatusChanged { .. }));

    let mut missing = order.clone();
    missing.id = OrderId::new();
    let err = store
        .update_order(OrderUpdate::new(missing, OrderStatus::Pending))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::OrderNotFound(_)));
}

#[tokio::test]
#[serial]
async fn list_orders_filters_and_pages() {
    let store = get_test_store().await;
    let product = seed_product(&store, "SKU-10", 10).await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let (order, _) = place_order(&[(&product, 1)]);
        store.insert_order(&order).await.unwrap();
        ids.push(order.id);
    }

    let mut paid = store.require_order(ids[0]).await.unwrap();
    paid.payment_status = PaymentStatus::Paid;
    store
        .update_order(OrderUpdate::new(paid, OrderStatus::Pending))
        .await
        .unwrap();

    let all = store.list_orders(&OrderFilter::new()).await.unwrap();
    assert_eq!(all.len(), 3);

    let paid_only = store
        .list_orders(&OrderFilter::new().payment_status(PaymentStatus::Paid))
        .await
        .unwrap();
    assert_eq!(paid_only.len(), 1);
    assert_eq!(paid_only[0].id, ids[0]);

    let subset = store
        .list_orders(&OrderFilter::for_ids(vec![ids[1], ids[2]]).limit(1))
        .await
        .unwrap();
    assert_eq!(subset.len(), 1);
}

#[tokio::test]
#[serial]
async fn batch_update_writes_only_matching_rows() {
    let store = get_test_store().await;
    let product = seed_product(&store, "SKU-11", 10).await;
    let (a, _) = place_order(&[(&product, 1)]);
    let (b, _) = place_order(&[(&product, 1)]);
    store.insert_order(&a).await.unwrap();
    store.insert_order(&b).await.unwrap();

    let mut a2 = a.clone();
    a2.transition(OrderStatus::Shipped, Utc::now()).unwrap();
    let mut b2 = b.clone();
    b2.transition(OrderStatus::Shipped, Utc::now()).unwrap();

    let written = store
        .update_orders(vec![
            OrderUpdate::new(a2, OrderStatus::Pending),
            OrderUpdate::new(b2, OrderStatus::Processing),
        ])
        .await
        .unwrap();

    assert_eq!(written, vec![a.id]);
    let shipped = store.require_order(a.id).await.unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);
    assert!(shipped.shipped_at.is_some());
    assert_eq!(
        store.require_order(b.id).await.unwrap().status,
        OrderStatus::Pending
    );
}
