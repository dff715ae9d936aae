//! PostgreSQL-backed implementations of the persistence seams.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, CustomerId, OrderId};
use domain::{
    Address, Cart, CartOwner, CatalogEntry, Coupon, Customer, LineItem, Money, Order, OrderCode,
    OrderEvent, OrderLineItem, OrderStatus, PaymentMethod, PaymentStatus, Reservation, Shipment,
    SkuId,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::datastore::Datastore;
use crate::error::{Result, StoreError};
use crate::inventory::InventoryLedger;

/// PostgreSQL-backed inventory ledger.
///
/// The reserve guard is a single conditional UPDATE, so the database's
/// row lock serializes the read-check-write cycle; concurrent
/// reservations on the last unit cannot both pass the availability
/// predicate.
#[derive(Clone)]
pub struct PostgresInventoryLedger {
    pool: PgPool,
}

impl PostgresInventoryLedger {
    /// Creates a ledger over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Sets the owned stock for a SKU, creating the record if needed.
    pub async fn set_stock(&self, sku_id: &SkuId, quantity_owned: u32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory (sku_id, quantity_owned)
            VALUES ($1, $2)
            ON CONFLICT (sku_id) DO UPDATE SET
                quantity_owned = EXCLUDED.quantity_owned,
                version = inventory.version + 1
            "#,
        )
        .bind(sku_id.as_str())
        .bind(i64::from(quantity_owned))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for PostgresInventoryLedger {
    async fn reserve(&self, sku_id: &SkuId, quantity: u32) -> Result<Reservation> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE inventory
            SET quantity_reserved = quantity_reserved + $2,
                version = version + 1
            WHERE sku_id = $1
              AND quantity_owned - quantity_reserved >= $2
            "#,
        )
        .bind(sku_id.as_str())
        .bind(i64::from(quantity))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let row = sqlx::query(
                "SELECT quantity_owned, quantity_reserved FROM inventory WHERE sku_id = $1",
            )
            .bind(sku_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            metrics::counter!("inventory_reserve_rejected").increment(1);
            return match row {
                None => Err(StoreError::SkuNotFound(sku_id.to_string())),
                Some(row) => {
                    let owned: i64 = row.try_get("quantity_owned")?;
                    let reserved: i64 = row.try_get("quantity_reserved")?;
                    Err(StoreError::InsufficientStock {
                        sku_id: sku_id.to_string(),
                        requested: quantity,
                        available: (owned - reserved) as u32,
                    })
                }
            };
        }

        let reservation = Reservation::new(sku_id.clone(), quantity);
        sqlx::query("INSERT INTO reservations (id, sku_id, quantity) VALUES ($1, $2, $3)")
            .bind(reservation.id.as_uuid())
            .bind(sku_id.as_str())
            .bind(i64::from(quantity))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        metrics::counter!("inventory_reserved").increment(1);
        Ok(reservation)
    }

    async fn release(&self, reservation: &Reservation) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("DELETE FROM reservations WHERE id = $1 RETURNING sku_id, quantity")
            .bind(reservation.id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;

        // Absent row: already released or committed. Idempotent no-op.
        if let Some(row) = row {
            let sku_id: String = row.try_get("sku_id")?;
            let quantity: i64 = row.try_get("quantity")?;
            sqlx::query(
                r#"
                UPDATE inventory
                SET quantity_reserved = quantity_reserved - $2,
                    version = version + 1
                WHERE sku_id = $1
                "#,
            )
            .bind(&sku_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
            metrics::counter!("inventory_released").increment(1);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn commit(&self, reservation: &Reservation) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("DELETE FROM reservations WHERE id = $1 RETURNING sku_id, quantity")
            .bind(reservation.id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Err(StoreError::UnknownReservation(reservation.id));
        };

        let sku_id: String = row.try_get("sku_id")?;
        let quantity: i64 = row.try_get("quantity")?;
        sqlx::query(
            r#"
            UPDATE inventory
            SET quantity_owned = quantity_owned - $2,
                quantity_reserved = quantity_reserved - $2,
                version = version + 1
            WHERE sku_id = $1
            "#,
        )
        .bind(&sku_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        metrics::counter!("inventory_committed").increment(1);
        Ok(())
    }

    async fn record(&self, sku_id: &SkuId) -> Result<Option<domain::InventoryRecord>> {
        let row = sqlx::query(
            "SELECT sku_id, quantity_owned, quantity_reserved, version FROM inventory WHERE sku_id = $1",
        )
        .bind(sku_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(domain::InventoryRecord {
                sku_id: SkuId::new(row.try_get::<String, _>("sku_id")?),
                quantity_owned: row.try_get::<i64, _>("quantity_owned")? as u32,
                quantity_reserved: row.try_get::<i64, _>("quantity_reserved")? as u32,
                version: row.try_get::<i64, _>("version")? as u64,
            })),
        }
    }
}

/// PostgreSQL-backed datastore.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_cart(row: PgRow) -> Result<Cart> {
        let customer_id: Option<Uuid> = row.try_get("customer_id")?;
        let session_token: Option<String> = row.try_get("session_token")?;
        let owner = match (customer_id, session_token) {
            (Some(id), _) => CartOwner::Customer(CustomerId::from_uuid(id)),
            (None, Some(token)) => CartOwner::Session(token),
            (None, None) => return Err(StoreError::Decode("cart row has no owner".into())),
        };

        Ok(Cart {
            id: CartId::from_uuid(row.try_get("id")?),
            owner,
            expires_at: row.try_get::<Option<DateTime<Utc>>, _>("expires_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status_raw: String = row.try_get("status")?;
        let method_raw: String = row.try_get("payment_method")?;
        let payment_raw: String = row.try_get("payment_status")?;
        let reservations_json: serde_json::Value = row.try_get("held_reservations")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get("id")?),
            code: OrderCode::from_string(row.try_get::<String, _>("code")?),
            customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
            cart_id: CartId::from_uuid(row.try_get("cart_id")?),
            status: OrderStatus::parse(&status_raw)
                .ok_or_else(|| StoreError::Decode(format!("order status {status_raw}")))?,
            payment_method: PaymentMethod::parse(&method_raw)
                .ok_or_else(|| StoreError::Decode(format!("payment method {method_raw}")))?,
            payment_status: PaymentStatus::parse(&payment_raw)
                .ok_or_else(|| StoreError::Decode(format!("payment status {payment_raw}")))?,
            total_price: Money::new(row.try_get("total_price")?),
            shipping_fee: Money::new(row.try_get("shipping_fee")?),
            discount_applied: Money::new(row.try_get("discount_applied")?),
            loyalty_redeemed: row.try_get::<i64, _>("loyalty_redeemed")? as u32,
            coupon_code: row.try_get("coupon_code")?,
            ship_to: Address {
                province: row.try_get("province")?,
                district: row.try_get("district")?,
                ward: row.try_get("ward")?,
                detail: row.try_get("address_detail")?,
            },
            is_provisional_guest_account: row.try_get("is_provisional_guest_account")?,
            guest_password: row.try_get("guest_password")?,
            held_reservations: serde_json::from_value(reservations_json)?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_customer(row: PgRow) -> Result<Customer> {
        Ok(Customer {
            id: CustomerId::from_uuid(row.try_get("id")?),
            email: row.try_get("email")?,
            full_name: row.try_get("full_name")?,
            phone_number: row.try_get("phone_number")?,
            loyalty_points: row.try_get::<i64, _>("loyalty_points")? as u32,
            is_active: row.try_get("is_active")?,
        })
    }

    async fn write_order<'e, E>(order: &Order, executor: E) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, code, customer_id, cart_id, status, payment_method,
                payment_status, total_price, shipping_fee, discount_applied,
                loyalty_redeemed, coupon_code, province, district, ward,
                address_detail, is_provisional_guest_account, guest_password,
                held_reservations, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                payment_status = EXCLUDED.payment_status,
                total_price = EXCLUDED.total_price,
                shipping_fee = EXCLUDED.shipping_fee,
                guest_password = EXCLUDED.guest_password,
                held_reservations = EXCLUDED.held_reservations
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.code.as_str())
        .bind(order.customer_id.as_uuid())
        .bind(order.cart_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_method.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.total_price.amount())
        .bind(order.shipping_fee.amount())
        .bind(order.discount_applied.amount())
        .bind(i64::from(order.loyalty_redeemed))
        .bind(&order.coupon_code)
        .bind(&order.ship_to.province)
        .bind(&order.ship_to.district)
        .bind(&order.ship_to.ward)
        .bind(&order.ship_to.detail)
        .bind(order.is_provisional_guest_account)
        .bind(&order.guest_password)
        .bind(serde_json::to_value(&order.held_reservations)?)
        .bind(order.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    async fn write_shipment<'e, E>(shipment: &Shipment, executor: E) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO shipments (order_id, carrier_reference, fee, carrier_status, eta)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO UPDATE SET
                carrier_reference = EXCLUDED.carrier_reference,
                fee = EXCLUDED.fee,
                carrier_status = EXCLUDED.carrier_status,
                eta = EXCLUDED.eta
            "#,
        )
        .bind(shipment.order_id.as_uuid())
        .bind(&shipment.carrier_reference)
        .bind(shipment.fee.amount())
        .bind(&shipment.carrier_status)
        .bind(shipment.eta)
        .execute(executor)
        .await?;
        Ok(())
    }

    async fn write_event<'e, E>(event: &OrderEvent, executor: E) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"INSERT INTO order_events (order_id, status, timestamp) VALUES ($1, $2, $3)"#,
        )
        .bind(event.order_id.as_uuid())
        .bind(event.status.as_str())
        .bind(event.timestamp)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Datastore for PostgresStore {
    async fn cart_by_id(&self, id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query(
            "SELECT id, customer_id, session_token, expires_at FROM carts WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_cart).transpose()
    }

    async fn cart_by_session(&self, session_token: &str) -> Result<Option<Cart>> {
        let row = sqlx::query(
            "SELECT id, customer_id, session_token, expires_at FROM carts WHERE session_token = $1",
        )
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_cart).transpose()
    }

    async fn cart_by_customer(&self, customer_id: CustomerId) -> Result<Option<Cart>> {
        let row = sqlx::query(
            "SELECT id, customer_id, session_token, expires_at FROM carts WHERE customer_id = $1",
        )
        .bind(customer_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_cart).transpose()
    }

    async fn insert_cart(&self, cart: &Cart) -> Result<()> {
        sqlx::query(
            "INSERT INTO carts (id, customer_id, session_token, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(cart.id.as_uuid())
        .bind(cart.owner.customer_id().map(|c| c.as_uuid()))
        .bind(cart.owner.session_token())
        .bind(cart.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_cart(&self, cart: &Cart) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE carts
            SET customer_id = $2, session_token = $3, expires_at = $4
            WHERE id = $1
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(cart.owner.customer_id().map(|c| c.as_uuid()))
        .bind(cart.owner.session_token())
        .bind(cart.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_cart(&self, id: CartId) -> Result<()> {
        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cart_lines(&self, id: CartId) -> Result<Vec<LineItem>> {
        let rows = sqlx::query("SELECT sku_id, quantity FROM cart_lines WHERE cart_id = $1")
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(LineItem {
                    sku_id: SkuId::new(row.try_get::<String, _>("sku_id")?),
                    quantity: row.try_get::<i64, _>("quantity")? as u32,
                })
            })
            .collect()
    }

    async fn set_cart_line(&self, id: CartId, sku_id: &SkuId, quantity: u32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_lines (cart_id, sku_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, sku_id) DO UPDATE SET quantity = EXCLUDED.quantity
            "#,
        )
        .bind(id.as_uuid())
        .bind(sku_id.as_str())
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn catalog_entry(&self, sku_id: &SkuId) -> Result<Option<CatalogEntry>> {
        let row = sqlx::query(
            r#"
            SELECT sku_id, name, unit_price, weight_grams, length_cm, width_cm, height_cm, active
            FROM catalog_entries WHERE sku_id = $1
            "#,
        )
        .bind(sku_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(CatalogEntry {
                sku_id: SkuId::new(row.try_get::<String, _>("sku_id")?),
                name: row.try_get("name")?,
                unit_price: Money::new(row.try_get("unit_price")?),
                weight_grams: row.try_get::<i64, _>("weight_grams")? as u32,
                length_cm: row.try_get::<i64, _>("length_cm")? as u32,
                width_cm: row.try_get::<i64, _>("width_cm")? as u32,
                height_cm: row.try_get::<i64, _>("height_cm")? as u32,
                active: row.try_get("active")?,
            })),
        }
    }

    async fn upsert_catalog_entry(&self, entry: &CatalogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO catalog_entries
                (sku_id, name, unit_price, weight_grams, length_cm, width_cm, height_cm, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (sku_id) DO UPDATE SET
                name = EXCLUDED.name,
                unit_price = EXCLUDED.unit_price,
                weight_grams = EXCLUDED.weight_grams,
                length_cm = EXCLUDED.length_cm,
                width_cm = EXCLUDED.width_cm,
                height_cm = EXCLUDED.height_cm,
                active = EXCLUDED.active
            "#,
        )
        .bind(entry.sku_id.as_str())
        .bind(&entry.name)
        .bind(entry.unit_price.amount())
        .bind(i64::from(entry.weight_grams))
        .bind(i64::from(entry.length_cm))
        .bind(i64::from(entry.width_cm))
        .bind(i64::from(entry.height_cm))
        .bind(entry.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let row =
            sqlx::query("SELECT code, discount, usage_limit, used_count FROM coupons WHERE code = $1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(Coupon {
                code: row.try_get("code")?,
                discount: Money::new(row.try_get("discount")?),
                usage_limit: row.try_get::<i64, _>("usage_limit")? as u32,
                used_count: row.try_get::<i64, _>("used_count")? as u32,
            })),
        }
    }

    async fn upsert_coupon(&self, coupon: &Coupon) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO coupons (code, discount, usage_limit, used_count)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (code) DO UPDATE SET
                discount = EXCLUDED.discount,
                usage_limit = EXCLUDED.usage_limit,
                used_count = EXCLUDED.used_count
            "#,
        )
        .bind(&coupon.code)
        .bind(coupon.discount.amount())
        .bind(i64::from(coupon.usage_limit))
        .bind(i64::from(coupon.used_count))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn try_redeem_coupon(&self, code: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE coupons
            SET used_count = used_count + 1
            WHERE code = $1 AND used_count < usage_limit
            "#,
        )
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_coupon(&self, code: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE coupons
            SET used_count = used_count - 1
            WHERE code = $1 AND used_count > 0
            "#,
        )
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn customer_by_id(&self, id: CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query(
            "SELECT id, email, full_name, phone_number, loyalty_points, is_active FROM customers WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_customer).transpose()
    }

    async fn customer_by_email(&self, email: &str) -> Result<Option<Customer>> {
        let row = sqlx::query(
            "SELECT id, email, full_name, phone_number, loyalty_points, is_active FROM customers WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_customer).transpose()
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, email, full_name, phone_number, loyalty_points, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.email)
        .bind(&customer.full_name)
        .bind(&customer.phone_number)
        .bind(i64::from(customer.loyalty_points))
        .bind(customer.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn adjust_loyalty(&self, id: CustomerId, delta: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET loyalty_points = loyalty_points + $2
            WHERE id = $1 AND loyalty_points + $2 >= 0
            "#,
        )
        .bind(id.as_uuid())
        .bind(delta)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_customer_active(&self, id: CustomerId, active: bool) -> Result<()> {
        sqlx::query("UPDATE customers SET is_active = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_customer(&self, id: CustomerId) -> Result<()> {
        // Addresses cascade.
        sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn default_address(&self, customer_id: CustomerId) -> Result<Option<Address>> {
        let row = sqlx::query(
            "SELECT province, district, ward, detail FROM addresses WHERE customer_id = $1",
        )
        .bind(customer_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(Address {
                province: row.try_get("province")?,
                district: row.try_get("district")?,
                ward: row.try_get("ward")?,
                detail: row.try_get("detail")?,
            })),
        }
    }

    async fn upsert_default_address(
        &self,
        customer_id: CustomerId,
        address: &Address,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO addresses (customer_id, province, district, ward, detail)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (customer_id) DO UPDATE SET
                province = EXCLUDED.province,
                district = EXCLUDED.district,
                ward = EXCLUDED.ward,
                detail = EXCLUDED.detail
            "#,
        )
        .bind(customer_id.as_uuid())
        .bind(&address.province)
        .bind(&address.district)
        .bind(&address.ward)
        .bind(&address.detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn persist_checkout(
        &self,
        order: &Order,
        lines: &[OrderLineItem],
        shipment: Option<&Shipment>,
        event: &OrderEvent,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        Self::write_order(order, &mut *tx).await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, sku_id, name, unit_price, quantity)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(line.order_id.as_uuid())
            .bind(line.sku_id.as_str())
            .bind(&line.name)
            .bind(line.unit_price.amount())
            .bind(i64::from(line.quantity))
            .execute(&mut *tx)
            .await?;
        }

        if let Some(shipment) = shipment {
            Self::write_shipment(shipment, &mut *tx).await?;
        }

        Self::write_event(event, &mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn order_by_code(&self, code: &str) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        Self::write_order(order, &self.pool).await
    }

    async fn insert_shipment(&self, shipment: &Shipment) -> Result<()> {
        Self::write_shipment(shipment, &self.pool).await
    }

    async fn append_order_event(&self, event: &OrderEvent) -> Result<()> {
        Self::write_event(event, &self.pool).await
    }

    async fn order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>> {
        let rows = sqlx::query(
            "SELECT order_id, sku_id, name, unit_price, quantity FROM order_lines WHERE order_id = $1",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderLineItem {
                    order_id: OrderId::from_uuid(row.try_get("order_id")?),
                    sku_id: SkuId::new(row.try_get::<String, _>("sku_id")?),
                    name: row.try_get("name")?,
                    unit_price: Money::new(row.try_get("unit_price")?),
                    quantity: row.try_get::<i64, _>("quantity")? as u32,
                })
            })
            .collect()
    }

    async fn order_events(&self, order_id: OrderId) -> Result<Vec<OrderEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, status, timestamp
            FROM order_events
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let status_raw: String = row.try_get("status")?;
                Ok(OrderEvent {
                    order_id: OrderId::from_uuid(row.try_get("order_id")?),
                    status: OrderStatus::parse(&status_raw)
                        .ok_or_else(|| StoreError::Decode(format!("event status {status_raw}")))?,
                    timestamp: row.try_get("timestamp")?,
                })
            })
            .collect()
    }

    async fn shipment_for_order(&self, order_id: OrderId) -> Result<Option<Shipment>> {
        let row = sqlx::query(
            "SELECT order_id, carrier_reference, fee, carrier_status, eta FROM shipments WHERE order_id = $1",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(Shipment {
                order_id: OrderId::from_uuid(row.try_get("order_id")?),
                carrier_reference: row.try_get("carrier_reference")?,
                fee: Money::new(row.try_get("fee")?),
                carrier_status: row.try_get("carrier_status")?,
                eta: row.try_get("eta")?,
            })),
        }
    }

    async fn delete_order(&self, order_id: OrderId) -> Result<()> {
        // Lines, shipments, and events cascade.
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
