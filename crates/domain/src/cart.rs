//! Shopping carts and their line items.

use chrono::{DateTime, Duration, Utc};
use common::{CartId, CustomerId};
use serde::{Deserialize, Serialize};

use crate::value_objects::SkuId;

/// Anonymous carts live this long before the expiry sweep may remove them.
pub const ANONYMOUS_CART_TTL_DAYS: i64 = 30;

/// Who a cart belongs to: an authenticated customer or an anonymous
/// browser session. Exactly one of the two, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CartOwner {
    Customer(CustomerId),
    Session(String),
}

impl CartOwner {
    /// Returns the customer id if this cart belongs to an authenticated customer.
    pub fn customer_id(&self) -> Option<CustomerId> {
        match self {
            CartOwner::Customer(id) => Some(*id),
            CartOwner::Session(_) => None,
        }
    }

    /// Returns the session token if this cart is anonymous.
    pub fn session_token(&self) -> Option<&str> {
        match self {
            CartOwner::Customer(_) => None,
            CartOwner::Session(token) => Some(token),
        }
    }
}

/// A shopping cart. Created lazily on first add-to-cart, destroyed on
/// successful checkout or expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub owner: CartOwner,
    /// Set for anonymous carts only; authenticated carts never expire.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Cart {
    /// Creates a cart for an authenticated customer (no expiry).
    pub fn for_customer(customer_id: CustomerId) -> Self {
        Self {
            id: CartId::new(),
            owner: CartOwner::Customer(customer_id),
            expires_at: None,
        }
    }

    /// Creates an anonymous cart with the standard TTL.
    pub fn for_session(session_token: impl Into<String>) -> Self {
        Self {
            id: CartId::new(),
            owner: CartOwner::Session(session_token.into()),
            expires_at: Some(Utc::now() + Duration::days(ANONYMOUS_CART_TTL_DAYS)),
        }
    }

    /// Returns true if this anonymous cart has outlived its TTL.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

/// One SKU in a cart. Carries no price copy: prices are read fresh from
/// the catalog at checkout, since they can change between add-to-cart
/// and checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku_id: SkuId,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(sku_id: impl Into<SkuId>, quantity: u32) -> Self {
        Self {
            sku_id: sku_id.into(),
            quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_cart_has_no_expiry() {
        let cart = Cart::for_customer(CustomerId::new());
        assert!(cart.expires_at.is_none());
        assert!(!cart.is_expired(Utc::now()));
    }

    #[test]
    fn anonymous_cart_expires_after_ttl() {
        let cart = Cart::for_session("session-abc");
        assert!(cart.expires_at.is_some());
        assert!(!cart.is_expired(Utc::now()));

        let after_ttl = Utc::now() + Duration::days(ANONYMOUS_CART_TTL_DAYS + 1);
        assert!(cart.is_expired(after_ttl));
    }

    #[test]
    fn owner_accessors() {
        let customer_id = CustomerId::new();
        let cart = Cart::for_customer(customer_id);
        assert_eq!(cart.owner.customer_id(), Some(customer_id));
        assert_eq!(cart.owner.session_token(), None);

        let anon = Cart::for_session("tok");
        assert_eq!(anon.owner.customer_id(), None);
        assert_eq!(anon.owner.session_token(), Some("tok"));
    }
}
