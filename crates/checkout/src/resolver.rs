//! Cart resolution: map an identity to its cart, merging an anonymous
//! cart into the customer's on login.

use chrono::Utc;
use common::CustomerId;
use domain::{Cart, CartOwner};
use store::Datastore;

use crate::error::Result;

/// Who is checking out.
#[derive(Debug, Clone)]
pub enum ShopperIdentity {
    /// Authenticated customer, optionally still holding the anonymous
    /// session their browser used before login.
    Customer {
        customer_id: CustomerId,
        session_token: Option<String>,
    },

    /// Anonymous browser session.
    Anonymous { session_token: String },
}

/// Resolves identities to carts.
pub struct CartResolver<D: Datastore> {
    store: D,
}

impl<D: Datastore> CartResolver<D> {
    /// Creates a resolver over the datastore.
    pub fn new(store: D) -> Self {
        Self { store }
    }

    /// Resolves the cart for an identity, creating an empty one when
    /// none exists.
    ///
    /// For an authenticated customer with a lingering anonymous session,
    /// the anonymous cart is merged into the customer's cart line by
    /// line (summing quantities for duplicate SKUs) and then deleted.
    /// Merging is idempotent: the second resolve with the same session
    /// token finds no anonymous cart and does nothing.
    pub async fn resolve(&self, identity: &ShopperIdentity) -> Result<Cart> {
        match identity {
            ShopperIdentity::Anonymous { session_token } => {
                self.resolve_anonymous(session_token).await
            }
            ShopperIdentity::Customer {
                customer_id,
                session_token,
            } => {
                self.resolve_customer(*customer_id, session_token.as_deref())
                    .await
            }
        }
    }

    async fn resolve_anonymous(&self, session_token: &str) -> Result<Cart> {
        if let Some(cart) = self.store.cart_by_session(session_token).await? {
            // Lazy expiry sweep for abandoned anonymous carts.
            if cart.is_expired(Utc::now()) {
                self.store.delete_cart(cart.id).await?;
            } else {
                return Ok(cart);
            }
        }

        let cart = Cart::for_session(session_token);
        self.store.insert_cart(&cart).await?;
        Ok(cart)
    }

    async fn resolve_customer(
        &self,
        customer_id: CustomerId,
        session_token: Option<&str>,
    ) -> Result<Cart> {
        let anonymous = match session_token {
            Some(token) => self
                .store
                .cart_by_session(token)
                .await?
                .filter(|c| c.owner.customer_id().is_none()),
            None => None,
        };
        let owned = self.store.cart_by_customer(customer_id).await?;

        match (owned, anonymous) {
            (Some(owned), Some(anonymous)) => {
                // Merge line by line, summing duplicate SKUs.
                let owned_lines = self.store.cart_lines(owned.id).await?;
                for line in self.store.cart_lines(anonymous.id).await? {
                    let existing = owned_lines
                        .iter()
                        .find(|l| l.sku_id == line.sku_id)
                        .map_or(0, |l| l.quantity);
                    self.store
                        .set_cart_line(owned.id, &line.sku_id, existing + line.quantity)
                        .await?;
                }
                self.store.delete_cart(anonymous.id).await?;
                tracing::debug!(%customer_id, "merged anonymous cart into customer cart");
                Ok(owned)
            }
            (None, Some(anonymous)) => {
                // Adopt the anonymous cart outright.
                let mut adopted = anonymous;
                adopted.owner = CartOwner::Customer(customer_id);
                adopted.expires_at = None;
                self.store.update_cart(&adopted).await?;
                Ok(adopted)
            }
            (Some(owned), None) => Ok(owned),
            (None, None) => {
                let cart = Cart::for_customer(customer_id);
                self.store.insert_cart(&cart).await?;
                Ok(cart)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::SkuId;
    use store::InMemoryStore;

    fn resolver() -> (CartResolver<InMemoryStore>, InMemoryStore) {
        let store = InMemoryStore::new();
        (CartResolver::new(store.clone()), store)
    }

    #[tokio::test]
    async fn anonymous_resolve_creates_cart_once() {
        let (resolver, _) = resolver();
        let identity = ShopperIdentity::Anonymous {
            session_token: "tok".into(),
        };

        let first = resolver.resolve(&identity).await.unwrap();
        let second = resolver.resolve(&identity).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.expires_at.is_some());
    }

    #[tokio::test]
    async fn customer_resolve_creates_non_expiring_cart() {
        let (resolver, _) = resolver();
        let identity = ShopperIdentity::Customer {
            customer_id: CustomerId::new(),
            session_token: None,
        };

        let cart = resolver.resolve(&identity).await.unwrap();
        assert!(cart.expires_at.is_none());
        assert!(cart.owner.customer_id().is_some());
    }

    #[tokio::test]
    async fn login_merges_anonymous_cart_summing_duplicates() {
        let (resolver, store) = resolver();
        let customer_id = CustomerId::new();
        let sku_shared = SkuId::new("SKU-SHARED");
        let sku_anon = SkuId::new("SKU-ANON");

        let owned = Cart::for_customer(customer_id);
        store.insert_cart(&owned).await.unwrap();
        store.set_cart_line(owned.id, &sku_shared, 1).await.unwrap();

        let anon = Cart::for_session("tok");
        store.insert_cart(&anon).await.unwrap();
        store.set_cart_line(anon.id, &sku_shared, 2).await.unwrap();
        store.set_cart_line(anon.id, &sku_anon, 3).await.unwrap();

        let identity = ShopperIdentity::Customer {
            customer_id,
            session_token: Some("tok".into()),
        };
        let resolved = resolver.resolve(&identity).await.unwrap();
        assert_eq!(resolved.id, owned.id);

        let lines = store.cart_lines(owned.id).await.unwrap();
        let qty = |sku: &SkuId| {
            lines
                .iter()
                .find(|l| &l.sku_id == sku)
                .map_or(0, |l| l.quantity)
        };
        assert_eq!(qty(&sku_shared), 3);
        assert_eq!(qty(&sku_anon), 3);

        // The anonymous cart is gone.
        assert!(store.cart_by_session("tok").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        let (resolver, store) = resolver();
        let customer_id = CustomerId::new();
        let sku = SkuId::new("SKU-1");

        let anon = Cart::for_session("tok");
        store.insert_cart(&anon).await.unwrap();
        store.set_cart_line(anon.id, &sku, 2).await.unwrap();

        let identity = ShopperIdentity::Customer {
            customer_id,
            session_token: Some("tok".into()),
        };

        let first = resolver.resolve(&identity).await.unwrap();
        let second = resolver.resolve(&identity).await.unwrap();
        assert_eq!(first.id, second.id);

        let lines = store.cart_lines(first.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 2);
    }

    #[tokio::test]
    async fn lone_anonymous_cart_is_adopted_on_login() {
        let (resolver, store) = resolver();
        let customer_id = CustomerId::new();

        let anon = Cart::for_session("tok");
        store.insert_cart(&anon).await.unwrap();

        let identity = ShopperIdentity::Customer {
            customer_id,
            session_token: Some("tok".into()),
        };
        let adopted = resolver.resolve(&identity).await.unwrap();

        assert_eq!(adopted.id, anon.id);
        assert_eq!(adopted.owner.customer_id(), Some(customer_id));
        assert!(adopted.expires_at.is_none());
    }

    #[tokio::test]
    async fn expired_anonymous_cart_is_swept() {
        let (resolver, store) = resolver();

        let mut stale = Cart::for_session("tok");
        stale.expires_at = Some(Utc::now() - chrono::Duration::days(1));
        store.insert_cart(&stale).await.unwrap();
        store
            .set_cart_line(stale.id, &SkuId::new("SKU-1"), 1)
            .await
            .unwrap();

        let identity = ShopperIdentity::Anonymous {
            session_token: "tok".into(),
        };
        let fresh = resolver.resolve(&identity).await.unwrap();

        assert_ne!(fresh.id, stale.id);
        assert!(store.cart_lines(fresh.id).await.unwrap().is_empty());
    }
}
