//! In-memory datastore implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CartId, CustomerId, OrderId};
use domain::{
    Address, Cart, CatalogEntry, Coupon, Customer, LineItem, Order, OrderEvent, OrderLineItem,
    Shipment, SkuId,
};
use tokio::sync::RwLock;

use crate::datastore::Datastore;
use crate::error::Result;

#[derive(Debug, Default)]
struct StoreState {
    carts: HashMap<CartId, Cart>,
    cart_lines: HashMap<CartId, Vec<LineItem>>,
    catalog: HashMap<SkuId, CatalogEntry>,
    coupons: HashMap<String, Coupon>,
    customers: HashMap<CustomerId, Customer>,
    addresses: HashMap<CustomerId, Address>,
    orders: HashMap<OrderId, Order>,
    order_lines: HashMap<OrderId, Vec<OrderLineItem>>,
    shipments: HashMap<OrderId, Shipment>,
    order_events: HashMap<OrderId, Vec<OrderEvent>>,
}

/// In-memory datastore.
///
/// Backs the API binary and the test suites. Composite operations hold
/// the single write lock for their whole duration, giving the same
/// all-or-nothing visibility as the PostgreSQL transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of orders currently stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the number of carts currently stored.
    pub async fn cart_count(&self) -> usize {
        self.state.read().await.carts.len()
    }
}

#[async_trait]
impl Datastore for InMemoryStore {
    async fn cart_by_id(&self, id: CartId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&id).cloned())
    }

    async fn cart_by_session(&self, session_token: &str) -> Result<Option<Cart>> {
        Ok(self
            .state
            .read()
            .await
            .carts
            .values()
            .find(|c| c.owner.session_token() == Some(session_token))
            .cloned())
    }

    async fn cart_by_customer(&self, customer_id: CustomerId) -> Result<Option<Cart>> {
        Ok(self
            .state
            .read()
            .await
            .carts
            .values()
            .find(|c| c.owner.customer_id() == Some(customer_id))
            .cloned())
    }

    async fn insert_cart(&self, cart: &Cart) -> Result<()> {
        let mut state = self.state.write().await;
        state.carts.insert(cart.id, cart.clone());
        state.cart_lines.entry(cart.id).or_default();
        Ok(())
    }

    async fn update_cart(&self, cart: &Cart) -> Result<()> {
        self.state.write().await.carts.insert(cart.id, cart.clone());
        Ok(())
    }

    async fn delete_cart(&self, id: CartId) -> Result<()> {
        let mut state = self.state.write().await;
        state.carts.remove(&id);
        state.cart_lines.remove(&id);
        Ok(())
    }

    async fn cart_lines(&self, id: CartId) -> Result<Vec<LineItem>> {
        Ok(self
            .state
            .read()
            .await
            .cart_lines
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_cart_line(&self, id: CartId, sku_id: &SkuId, quantity: u32) -> Result<()> {
        let mut state = self.state.write().await;
        let lines = state.cart_lines.entry(id).or_default();
        match lines.iter_mut().find(|l| &l.sku_id == sku_id) {
            Some(line) => line.quantity = quantity,
            None => lines.push(LineItem::new(sku_id.clone(), quantity)),
        }
        Ok(())
    }

    async fn catalog_entry(&self, sku_id: &SkuId) -> Result<Option<CatalogEntry>> {
        Ok(self.state.read().await.catalog.get(sku_id).cloned())
    }

    async fn upsert_catalog_entry(&self, entry: &CatalogEntry) -> Result<()> {
        self.state
            .write()
            .await
            .catalog
            .insert(entry.sku_id.clone(), entry.clone());
        Ok(())
    }

    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(self.state.read().await.coupons.get(code).cloned())
    }

    async fn upsert_coupon(&self, coupon: &Coupon) -> Result<()> {
        self.state
            .write()
            .await
            .coupons
            .insert(coupon.code.clone(), coupon.clone());
        Ok(())
    }

    async fn try_redeem_coupon(&self, code: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.coupons.get_mut(code) {
            Some(coupon) if !coupon.is_exhausted() => {
                coupon.used_count += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_coupon(&self, code: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(coupon) = state.coupons.get_mut(code) {
            coupon.used_count = coupon.used_count.saturating_sub(1);
        }
        Ok(())
    }

    async fn customer_by_id(&self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self.state.read().await.customers.get(&id).cloned())
    }

    async fn customer_by_email(&self, email: &str) -> Result<Option<Customer>> {
        Ok(self
            .state
            .read()
            .await
            .customers
            .values()
            .find(|c| c.email == email)
            .cloned())
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        self.state
            .write()
            .await
            .customers
            .insert(customer.id, customer.clone());
        Ok(())
    }

    async fn adjust_loyalty(&self, id: CustomerId, delta: i64) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(customer) = state.customers.get_mut(&id) else {
            return Ok(false);
        };
        let next = i64::from(customer.loyalty_points) + delta;
        if next < 0 {
            return Ok(false);
        }
        customer.loyalty_points = next as u32;
        Ok(true)
    }

    async fn set_customer_active(&self, id: CustomerId, active: bool) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(customer) = state.customers.get_mut(&id) {
            customer.is_active = active;
        }
        Ok(())
    }

    async fn purge_customer(&self, id: CustomerId) -> Result<()> {
        let mut state = self.state.write().await;
        state.customers.remove(&id);
        state.addresses.remove(&id);
        Ok(())
    }

    async fn default_address(&self, customer_id: CustomerId) -> Result<Option<Address>> {
        Ok(self.state.read().await.addresses.get(&customer_id).cloned())
    }

    async fn upsert_default_address(
        &self,
        customer_id: CustomerId,
        address: &Address,
    ) -> Result<()> {
        self.state
            .write()
            .await
            .addresses
            .insert(customer_id, address.clone());
        Ok(())
    }

    async fn persist_checkout(
        &self,
        order: &Order,
        lines: &[OrderLineItem],
        shipment: Option<&Shipment>,
        event: &OrderEvent,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.insert(order.id, order.clone());
        state.order_lines.insert(order.id, lines.to_vec());
        if let Some(shipment) = shipment {
            state.shipments.insert(order.id, shipment.clone());
        }
        state
            .order_events
            .entry(order.id)
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn order_by_code(&self, code: &str) -> Result<Option<Order>> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .values()
            .find(|o| o.code.as_str() == code)
            .cloned())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        self.state
            .write()
            .await
            .orders
            .insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_shipment(&self, shipment: &Shipment) -> Result<()> {
        self.state
            .write()
            .await
            .shipments
            .insert(shipment.order_id, shipment.clone());
        Ok(())
    }

    async fn append_order_event(&self, event: &OrderEvent) -> Result<()> {
        self.state
            .write()
            .await
            .order_events
            .entry(event.order_id)
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>> {
        Ok(self
            .state
            .read()
            .await
            .order_lines
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn order_events(&self, order_id: OrderId) -> Result<Vec<OrderEvent>> {
        Ok(self
            .state
            .read()
            .await
            .order_events
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn shipment_for_order(&self, order_id: OrderId) -> Result<Option<Shipment>> {
        Ok(self.state.read().await.shipments.get(&order_id).cloned())
    }

    async fn delete_order(&self, order_id: OrderId) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.remove(&order_id);
        state.order_lines.remove(&order_id);
        state.shipments.remove(&order_id);
        state.order_events.remove(&order_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{Money, OrderCode, OrderStatus, PaymentMethod, PaymentStatus};

    fn sample_order(code: &str) -> Order {
        Order {
            id: OrderId::new(),
            code: OrderCode::from_string(code),
            customer_id: CustomerId::new(),
            cart_id: CartId::new(),
            status: OrderStatus::Pending,
            payment_method: PaymentMethod::CashOnDelivery,
            payment_status: PaymentStatus::Unpaid,
            total_price: Money::new(100_000),
            shipping_fee: Money::new(20_000),
            discount_applied: Money::zero(),
            loyalty_redeemed: 0,
            coupon_code: None,
            ship_to: Address {
                province: "P".into(),
                district: "D".into(),
                ward: "W".into(),
                detail: "detail".into(),
            },
            is_provisional_guest_account: false,
            guest_password: None,
            held_reservations: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn cart_lookup_by_session_and_customer() {
        let store = InMemoryStore::new();
        let customer_id = CustomerId::new();

        let anon = Cart::for_session("tok-1");
        let owned = Cart::for_customer(customer_id);
        store.insert_cart(&anon).await.unwrap();
        store.insert_cart(&owned).await.unwrap();

        assert_eq!(
            store.cart_by_session("tok-1").await.unwrap().unwrap().id,
            anon.id
        );
        assert_eq!(
            store.cart_by_customer(customer_id).await.unwrap().unwrap().id,
            owned.id
        );
        assert!(store.cart_by_session("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_cart_line_upserts() {
        let store = InMemoryStore::new();
        let cart = Cart::for_session("tok");
        store.insert_cart(&cart).await.unwrap();

        let sku = SkuId::new("SKU-001");
        store.set_cart_line(cart.id, &sku, 2).await.unwrap();
        store.set_cart_line(cart.id, &sku, 5).await.unwrap();

        let lines = store.cart_lines(cart.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 5);
    }

    #[tokio::test]
    async fn coupon_guarded_redemption_stops_at_limit() {
        let store = InMemoryStore::new();
        store
            .upsert_coupon(&Coupon::new("SALE", Money::new(5_000), 2))
            .await
            .unwrap();

        assert!(store.try_redeem_coupon("SALE").await.unwrap());
        assert!(store.try_redeem_coupon("SALE").await.unwrap());
        assert!(!store.try_redeem_coupon("SALE").await.unwrap());

        store.release_coupon("SALE").await.unwrap();
        assert!(store.try_redeem_coupon("SALE").await.unwrap());
    }

    #[tokio::test]
    async fn redeeming_a_missing_coupon_returns_false() {
        let store = InMemoryStore::new();
        assert!(!store.try_redeem_coupon("NOPE").await.unwrap());
    }

    #[tokio::test]
    async fn loyalty_adjustment_rejects_overdraft() {
        let store = InMemoryStore::new();
        let mut customer = Customer::guest("a@example.com", "An", "0935");
        customer.loyalty_points = 10;
        store.insert_customer(&customer).await.unwrap();

        assert!(store.adjust_loyalty(customer.id, -10).await.unwrap());
        assert!(!store.adjust_loyalty(customer.id, -1).await.unwrap());
        assert!(store.adjust_loyalty(customer.id, 3).await.unwrap());

        let stored = store.customer_by_id(customer.id).await.unwrap().unwrap();
        assert_eq!(stored.loyalty_points, 3);
    }

    #[tokio::test]
    async fn persist_checkout_stores_all_parts() {
        let store = InMemoryStore::new();
        let order = sample_order("ORD1");
        let line = OrderLineItem::new(
            order.id,
            SkuId::new("SKU-001"),
            "Widget",
            Money::new(10_000),
            2,
        )
        .unwrap();
        let shipment = Shipment {
            order_id: order.id,
            carrier_reference: "CARRIER-1".into(),
            fee: Money::new(20_000),
            carrier_status: "PENDING".into(),
            eta: None,
        };
        let event = OrderEvent::now(order.id, OrderStatus::Pending);

        store
            .persist_checkout(&order, &[line.clone()], Some(&shipment), &event)
            .await
            .unwrap();

        assert!(store.order_by_code("ORD1").await.unwrap().is_some());
        assert_eq!(store.order_lines(order.id).await.unwrap(), vec![line]);
        assert_eq!(
            store.shipment_for_order(order.id).await.unwrap(),
            Some(shipment)
        );
        assert_eq!(store.order_events(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_order_removes_everything() {
        let store = InMemoryStore::new();
        let order = sample_order("ORD2");
        let event = OrderEvent::now(order.id, OrderStatus::PendingPayment);
        store
            .persist_checkout(&order, &[], None, &event)
            .await
            .unwrap();

        store.delete_order(order.id).await.unwrap();

        assert!(store.order_by_code("ORD2").await.unwrap().is_none());
        assert!(store.order_events(order.id).await.unwrap().is_empty());
        assert!(store.shipment_for_order(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_customer_removes_identity_and_address() {
        let store = InMemoryStore::new();
        let customer = Customer::guest("g@example.com", "Guest", "0900");
        store.insert_customer(&customer).await.unwrap();
        store
            .upsert_default_address(
                customer.id,
                &Address {
                    province: "P".into(),
                    district: "D".into(),
                    ward: "W".into(),
                    detail: "detail".into(),
                },
            )
            .await
            .unwrap();

        store.purge_customer(customer.id).await.unwrap();

        assert!(store.customer_by_id(customer.id).await.unwrap().is_none());
        assert!(store.default_address(customer.id).await.unwrap().is_none());
    }
}
