//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{CartId, CustomerId, OrderId};
use domain::{
    Address, Coupon, Money, Order, OrderCode, OrderEvent, OrderLineItem, OrderStatus,
    PaymentMethod, PaymentStatus, Shipment, SkuId,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{Datastore, InventoryLedger, PostgresInventoryLedger, PostgresStore, StoreError};
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

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_storefront_tables.sql"
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

async fn connect() -> PgPool {
    let info = get_container_info().await;
    PgPool::connect(&info.connection_string).await.unwrap()
}

fn sample_order(code: &str) -> Order {
    Order {
        id: OrderId::new(),
        code: OrderCode::from_string(code),
        customer_id: CustomerId::new(),
        cart_id: CartId::new(),
        status: OrderStatus::Pending,
        payment_method: PaymentMethod::CashOnDelivery,
        payment_status: PaymentStatus::Unpaid,
        total_price: Money::new(120_000),
        shipping_fee: Money::new(25_000),
        discount_applied: Money::new(5_000),
        loyalty_redeemed: 0,
        coupon_code: None,
        ship_to: Address {
            province: "Thanh pho Ho Chi Minh".into(),
            district: "Quan 7".into(),
            ward: "Phuong Tan Phong".into(),
            detail: "19 Nguyen Huu Tho".into(),
        },
        is_provisional_guest_account: false,
        guest_password: None,
        held_reservations: Vec::new(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
#[serial]
async fn reserve_release_commit_roundtrip() {
    let ledger = PostgresInventoryLedger::new(connect().await);
    let sku = SkuId::new("PG-SKU-ROUNDTRIP");
    ledger.set_stock(&sku, 10).await.unwrap();

    let reservation = ledger.reserve(&sku, 4).await.unwrap();
    let record = ledger.record(&sku).await.unwrap().unwrap();
    assert_eq!(record.quantity_owned, 10);
    assert_eq!(record.quantity_reserved, 4);

    ledger.release(&reservation).await.unwrap();
    let record = ledger.record(&sku).await.unwrap().unwrap();
    assert_eq!(record.quantity_reserved, 0);

    let reservation = ledger.reserve(&sku, 3).await.unwrap();
    ledger.commit(&reservation).await.unwrap();
    let record = ledger.record(&sku).await.unwrap().unwrap();
    assert_eq!(record.quantity_owned, 7);
    assert_eq!(record.quantity_reserved, 0);
}

#[tokio::test]
#[serial]
async fn release_is_idempotent() {
    let ledger = PostgresInventoryLedger::new(connect().await);
    let sku = SkuId::new("PG-SKU-IDEMPOTENT");
    ledger.set_stock(&sku, 5).await.unwrap();

    let reservation = ledger.reserve(&sku, 2).await.unwrap();
    ledger.release(&reservation).await.unwrap();
    ledger.release(&reservation).await.unwrap();

    let record = ledger.record(&sku).await.unwrap().unwrap();
    assert_eq!(record.quantity_reserved, 0);
}

#[tokio::test]
#[serial]
async fn commit_of_unknown_reservation_fails() {
    let ledger = PostgresInventoryLedger::new(connect().await);
    let sku = SkuId::new("PG-SKU-UNKNOWN");
    ledger.set_stock(&sku, 5).await.unwrap();

    let reservation = ledger.reserve(&sku, 2).await.unwrap();
    ledger.commit(&reservation).await.unwrap();

    let err = ledger.commit(&reservation).await.unwrap_err();
    assert!(matches!(err, StoreError::UnknownReservation(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[serial]
async fn concurrent_reservations_never_oversell() {
    const STOCK: u32 = 3;
    const CONTENDERS: usize = 20;

    let pool = connect().await;
    let ledger = PostgresInventoryLedger::new(pool);
    let sku = SkuId::new("PG-SKU-HOT");
    ledger.set_stock(&sku, STOCK).await.unwrap();

    let mut handles = Vec::with_capacity(CONTENDERS);
    for _ in 0..CONTENDERS {
        let ledger = ledger.clone();
        let sku = sku.clone();
        handles.push(tokio::spawn(async move { ledger.reserve(&sku, 1).await }));
    }

    let mut won = 0;
    let mut lost = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(StoreError::InsufficientStock { .. }) => lost += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(won, STOCK as usize);
    assert_eq!(lost, CONTENDERS - STOCK as usize);

    let record = ledger.record(&sku).await.unwrap().unwrap();
    assert_eq!(record.quantity_reserved, STOCK);
}

#[tokio::test]
#[serial]
async fn persist_checkout_roundtrip() {
    let store = PostgresStore::new(connect().await);

    let order = sample_order("PG-ORD-1");
    let line = OrderLineItem::new(
        order.id,
        SkuId::new("PG-SKU-LINE"),
        "Widget",
        Money::new(30_000),
        2,
    )
    .unwrap();
    let shipment = Shipment {
        order_id: order.id,
        carrier_reference: "CARRIER-1".into(),
        fee: Money::new(25_000),
        carrier_status: "PENDING".into(),
        eta: None,
    };
    let event = OrderEvent::now(order.id, OrderStatus::Pending);

    store
        .persist_checkout(&order, &[line.clone()], Some(&shipment), &event)
        .await
        .unwrap();

    let loaded = store.order_by_code("PG-ORD-1").await.unwrap().unwrap();
    assert_eq!(loaded.id, order.id);
    assert_eq!(loaded.status, OrderStatus::Pending);
    assert_eq!(loaded.total_price, order.total_price);
    assert_eq!(loaded.ship_to, order.ship_to);

    assert_eq!(store.order_lines(order.id).await.unwrap(), vec![line]);
    assert_eq!(
        store.shipment_for_order(order.id).await.unwrap(),
        Some(shipment)
    );
    assert_eq!(store.order_events(order.id).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn delete_order_cascades() {
    let store = PostgresStore::new(connect().await);

    let order = sample_order("PG-ORD-2");
    let event = OrderEvent::now(order.id, OrderStatus::PendingPayment);
    store
        .persist_checkout(&order, &[], None, &event)
        .await
        .unwrap();

    store.delete_order(order.id).await.unwrap();

    assert!(store.order_by_code("PG-ORD-2").await.unwrap().is_none());
    assert!(store.order_events(order.id).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn coupon_guarded_redemption() {
    let store = PostgresStore::new(connect().await);
    store
        .upsert_coupon(&Coupon::new("PG-SALE", Money::new(5_000), 1))
        .await
        .unwrap();

    assert!(store.try_redeem_coupon("PG-SALE").await.unwrap());
    assert!(!store.try_redeem_coupon("PG-SALE").await.unwrap());

    store.release_coupon("PG-SALE").await.unwrap();
    assert!(store.try_redeem_coupon("PG-SALE").await.unwrap());
}
