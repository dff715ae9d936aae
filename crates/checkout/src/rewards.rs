//! Coupon and loyalty ledger.
//!
//! Both redemptions happen inside the saga and are compensated
//! symmetrically on rollback: a coupon use is returned with
//! `release_coupon`, redeemed points with `restore_points`. Accrual
//! only runs once the final total (including shipping) is known.

use common::CustomerId;
use domain::Money;
use store::Datastore;

use crate::error::{CheckoutError, Result};

/// Currency value of one loyalty point.
pub const POINT_VALUE: i64 = 1_000;

/// One point accrues per this many currency units of final total,
/// rounded up.
pub const ACCRUAL_DIVISOR: i64 = 1_000;

/// Validates and applies coupon and loyalty redemptions.
pub struct RewardsLedger<D: Datastore> {
    store: D,
}

impl<D: Datastore> RewardsLedger<D> {
    /// Creates a ledger over the datastore.
    pub fn new(store: D) -> Self {
        Self { store }
    }

    /// Redeems a coupon code, returning the discount it grants.
    ///
    /// The use count moves through a guarded increment, so a coupon at
    /// `used_count == usage_limit` is always rejected, never silently
    /// allowed, even when two checkouts race for the last use.
    pub async fn redeem_coupon(&self, code: &str) -> Result<Money> {
        let coupon = self
            .store
            .coupon_by_code(code)
            .await?
            .ok_or_else(|| CheckoutError::CouponInvalid {
                code: code.to_string(),
            })?;

        if !self.store.try_redeem_coupon(code).await? {
            return Err(CheckoutError::CouponExhausted {
                code: code.to_string(),
            });
        }

        Ok(coupon.discount)
    }

    /// Returns one use to the coupon (rollback of
    /// [`RewardsLedger::redeem_coupon`]).
    pub async fn release_coupon(&self, code: &str) -> Result<()> {
        self.store.release_coupon(code).await?;
        Ok(())
    }

    /// Debits `points` from the customer and returns the currency value
    /// deducted from the payable total.
    pub async fn redeem_points(&self, customer_id: CustomerId, points: u32) -> Result<Money> {
        if points == 0 {
            return Ok(Money::zero());
        }

        let balance = self
            .store
            .customer_by_id(customer_id)
            .await?
            .map_or(0, |c| c.loyalty_points);

        if points > balance || !self.store.adjust_loyalty(customer_id, -i64::from(points)).await? {
            return Err(CheckoutError::InsufficientLoyaltyPoints {
                requested: points,
                balance,
            });
        }

        Ok(Money::new(i64::from(points) * POINT_VALUE))
    }

    /// Credits `points` back (rollback of [`RewardsLedger::redeem_points`]).
    pub async fn restore_points(&self, customer_id: CustomerId, points: u32) -> Result<()> {
        if points > 0 {
            self.store
                .adjust_loyalty(customer_id, i64::from(points))
                .await?;
        }
        Ok(())
    }

    /// Accrues points for a finalized order: `ceil(total / divisor)`.
    /// Returns the points credited.
    pub async fn accrue(&self, customer_id: CustomerId, final_total: Money) -> Result<u32> {
        let points = final_total.div_ceil(ACCRUAL_DIVISOR).max(0) as u32;
        if points > 0 {
            self.store
                .adjust_loyalty(customer_id, i64::from(points))
                .await?;
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Coupon, Customer};
    use store::InMemoryStore;

    async fn setup() -> (RewardsLedger<InMemoryStore>, InMemoryStore, Customer) {
        let store = InMemoryStore::new();
        let mut customer = Customer::guest("a@example.com", "An", "0935");
        customer.loyalty_points = 50;
        store.insert_customer(&customer).await.unwrap();
        (RewardsLedger::new(store.clone()), store, customer)
    }

    #[tokio::test]
    async fn redeem_coupon_returns_discount_and_counts_use() {
        let (ledger, store, _) = setup().await;
        store
            .upsert_coupon(&Coupon::new("SALE", Money::new(10_000), 5))
            .await
            .unwrap();

        let discount = ledger.redeem_coupon("SALE").await.unwrap();
        assert_eq!(discount, Money::new(10_000));
        assert_eq!(
            store.coupon_by_code("SALE").await.unwrap().unwrap().used_count,
            1
        );
    }

    #[tokio::test]
    async fn unknown_coupon_is_invalid() {
        let (ledger, _, _) = setup().await;
        let err = ledger.redeem_coupon("NOPE").await.unwrap_err();
        assert!(matches!(err, CheckoutError::CouponInvalid { .. }));
    }

    #[tokio::test]
    async fn exhausted_coupon_is_always_rejected() {
        let (ledger, store, _) = setup().await;
        let mut coupon = Coupon::new("SALE", Money::new(10_000), 2);
        coupon.used_count = 2;
        store.upsert_coupon(&coupon).await.unwrap();

        let err = ledger.redeem_coupon("SALE").await.unwrap_err();
        assert!(matches!(err, CheckoutError::CouponExhausted { .. }));
    }

    #[tokio::test]
    async fn release_returns_the_use() {
        let (ledger, store, _) = setup().await;
        store
            .upsert_coupon(&Coupon::new("SALE", Money::new(10_000), 1))
            .await
            .unwrap();

        ledger.redeem_coupon("SALE").await.unwrap();
        ledger.release_coupon("SALE").await.unwrap();
        assert_eq!(
            store.coupon_by_code("SALE").await.unwrap().unwrap().used_count,
            0
        );
    }

    #[tokio::test]
    async fn redeem_points_debits_balance() {
        let (ledger, store, customer) = setup().await;

        let value = ledger.redeem_points(customer.id, 20).await.unwrap();
        assert_eq!(value, Money::new(20 * POINT_VALUE));
        assert_eq!(
            store
                .customer_by_id(customer.id)
                .await
                .unwrap()
                .unwrap()
                .loyalty_points,
            30
        );
    }

    #[tokio::test]
    async fn redeeming_more_than_balance_is_rejected() {
        let (ledger, store, customer) = setup().await;

        let err = ledger.redeem_points(customer.id, 51).await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InsufficientLoyaltyPoints {
                requested: 51,
                balance: 50
            }
        ));
        assert_eq!(
            store
                .customer_by_id(customer.id)
                .await
                .unwrap()
                .unwrap()
                .loyalty_points,
            50
        );
    }

    #[tokio::test]
    async fn zero_points_is_a_no_op() {
        let (ledger, _, customer) = setup().await;
        assert_eq!(
            ledger.redeem_points(customer.id, 0).await.unwrap(),
            Money::zero()
        );
    }

    #[tokio::test]
    async fn restore_credits_back() {
        let (ledger, store, customer) = setup().await;
        ledger.redeem_points(customer.id, 20).await.unwrap();
        ledger.restore_points(customer.id, 20).await.unwrap();
        assert_eq!(
            store
                .customer_by_id(customer.id)
                .await
                .unwrap()
                .unwrap()
                .loyalty_points,
            50
        );
    }

    #[tokio::test]
    async fn accrual_rounds_up() {
        let (ledger, store, customer) = setup().await;

        let points = ledger
            .accrue(customer.id, Money::new(150_001))
            .await
            .unwrap();
        assert_eq!(points, 151);
        assert_eq!(
            store
                .customer_by_id(customer.id)
                .await
                .unwrap()
                .unwrap()
                .loyalty_points,
            50 + 151
        );
    }
}
