//! The local datastore seam: carts, catalog, coupons, customers, orders.

use async_trait::async_trait;
use common::{CartId, CustomerId, OrderId};
use domain::{
    Address, Cart, CatalogEntry, Coupon, Customer, LineItem, Order, OrderEvent, OrderLineItem,
    Shipment, SkuId,
};

use crate::error::Result;

/// Everything checkout reads and writes in the local database, other
/// than the inventory ledger.
///
/// Writes that must land together are exposed as composite operations
/// (`persist_checkout`, `delete_order`, `delete_cart`, `purge_customer`)
/// so each implementation can make them all-or-nothing: the in-memory
/// store applies them under one lock, the PostgreSQL store inside one
/// transaction. External calls (carrier, payment gateway) are never part
/// of these operations; undoing their effects is the saga's job.
#[async_trait]
pub trait Datastore: Send + Sync {
    // -- Carts --

    async fn cart_by_id(&self, id: CartId) -> Result<Option<Cart>>;

    async fn cart_by_session(&self, session_token: &str) -> Result<Option<Cart>>;

    async fn cart_by_customer(&self, customer_id: CustomerId) -> Result<Option<Cart>>;

    async fn insert_cart(&self, cart: &Cart) -> Result<()>;

    /// Rewrites the stored cart row for `cart.id` (owner/expiry changes).
    async fn update_cart(&self, cart: &Cart) -> Result<()>;

    /// Deletes the cart and all its lines.
    async fn delete_cart(&self, id: CartId) -> Result<()>;

    async fn cart_lines(&self, id: CartId) -> Result<Vec<LineItem>>;

    /// Sets the absolute quantity for one SKU in a cart, inserting the
    /// line if missing.
    async fn set_cart_line(&self, id: CartId, sku_id: &SkuId, quantity: u32) -> Result<()>;

    // -- Catalog (read model) --

    async fn catalog_entry(&self, sku_id: &SkuId) -> Result<Option<CatalogEntry>>;

    async fn upsert_catalog_entry(&self, entry: &CatalogEntry) -> Result<()>;

    // -- Coupons --

    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;

    async fn upsert_coupon(&self, coupon: &Coupon) -> Result<()>;

    /// Guarded redemption: increments `used_count` only while it is
    /// below `usage_limit`. Returns whether the increment was taken, so
    /// two concurrent checkouts cannot both take the last use.
    async fn try_redeem_coupon(&self, code: &str) -> Result<bool>;

    /// Compensation for `try_redeem_coupon`: decrements `used_count`,
    /// stopping at zero.
    async fn release_coupon(&self, code: &str) -> Result<()>;

    // -- Customers --

    async fn customer_by_id(&self, id: CustomerId) -> Result<Option<Customer>>;

    async fn customer_by_email(&self, email: &str) -> Result<Option<Customer>>;

    async fn insert_customer(&self, customer: &Customer) -> Result<()>;

    /// Guarded balance adjustment: applies `delta` only if the resulting
    /// balance stays non-negative. Returns whether it applied.
    async fn adjust_loyalty(&self, id: CustomerId, delta: i64) -> Result<bool>;

    async fn set_customer_active(&self, id: CustomerId, active: bool) -> Result<()>;

    /// Removes a provisional guest identity and its addresses.
    async fn purge_customer(&self, id: CustomerId) -> Result<()>;

    async fn default_address(&self, customer_id: CustomerId) -> Result<Option<Address>>;

    async fn upsert_default_address(&self, customer_id: CustomerId, address: &Address)
    -> Result<()>;

    // -- Orders --

    /// Persists an order with its line-item snapshots, optional
    /// shipment, and initial audit event as one atomic write.
    async fn persist_checkout(
        &self,
        order: &Order,
        lines: &[OrderLineItem],
        shipment: Option<&Shipment>,
        event: &OrderEvent,
    ) -> Result<()>;

    async fn order_by_code(&self, code: &str) -> Result<Option<Order>>;

    /// Rewrites the stored order row for `order.id`.
    async fn update_order(&self, order: &Order) -> Result<()>;

    async fn insert_shipment(&self, shipment: &Shipment) -> Result<()>;

    async fn append_order_event(&self, event: &OrderEvent) -> Result<()>;

    async fn order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>>;

    async fn order_events(&self, order_id: OrderId) -> Result<Vec<OrderEvent>>;

    async fn shipment_for_order(&self, order_id: OrderId) -> Result<Option<Shipment>>;

    /// Deletes the order and everything hanging off it: line items,
    /// shipments, audit events. Used by the payment-failure rollback,
    /// which leaves no trace of the provisional order.
    async fn delete_order(&self, order_id: OrderId) -> Result<()>;
}
