//! Domain model for the storefront checkout pipeline.
//!
//! This crate holds the persisted data model and its invariants:
//! - Value objects (`SkuId`, `Money`, `OrderCode`)
//! - The order record and its status machines
//! - Carts, customers, coupons, and the catalog read model
//! - Inventory records and reservations
//!
//! Behavior that spans records (reserving stock, running the checkout
//! saga) lives in the `store` and `checkout` crates; this crate only
//! enforces the invariants a single record can enforce about itself.

pub mod cart;
pub mod catalog;
pub mod coupon;
pub mod customer;
pub mod error;
pub mod inventory;
pub mod order;
pub mod value_objects;

pub use cart::{Cart, CartOwner, LineItem};
pub use catalog::CatalogEntry;
pub use coupon::Coupon;
pub use customer::{Address, Customer};
pub use error::DomainError;
pub use inventory::{InventoryRecord, Reservation};
pub use order::{
    Order, OrderEvent, OrderLineItem, OrderStatus, PaymentMethod, PaymentStatus, Shipment,
};
pub use value_objects::{Money, OrderCode, SkuId};
