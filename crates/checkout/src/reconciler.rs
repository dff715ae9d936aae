//! Payment callback reconciler: the saga's second entry point.
//!
//! The gateway calls back with a signed query string after the buyer
//! finishes (or abandons) the off-site payment. A success code finalizes
//! the provisional order: shipment placed now, reservations committed,
//! cart deleted. A failure code unwinds it to nothing. A bad signature
//! mutates nothing.

use std::collections::BTreeMap;
use std::sync::Arc;

use domain::{
    CatalogEntry, Money, Order, OrderEvent, OrderStatus, PaymentStatus, Shipment, SkuId,
};
use store::{Datastore, InventoryLedger};

use crate::carrier::location::LocationDirectory;
use crate::carrier::{CarrierGateway, Destination, Parcel, ShipmentItem};
use crate::error::{CheckoutError, Result};
use crate::notify::{NotificationEvent, NotificationPort};
use crate::payment::{PARAM_RESPONSE_CODE, PARAM_TXN_REF, PaymentGateway, SUCCESS_RESPONSE_CODE};
use crate::rewards::RewardsLedger;

/// How a callback was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Payment confirmed; the order is now durable and in `Pending`.
    Confirmed { order_code: String },

    /// Payment failed or was abandoned; the provisional order and every
    /// side effect backing it are gone.
    RolledBack { order_code: String },
}

/// Finalizes or unwinds provisional orders on the gateway's signal.
pub struct PaymentReconciler<L, D, C, P, N>
where
    L: InventoryLedger,
    D: Datastore + Clone,
    C: CarrierGateway,
    P: PaymentGateway,
    N: NotificationPort,
{
    ledger: L,
    store: D,
    carrier: C,
    payment: P,
    notifier: N,
    locations: Arc<LocationDirectory>,
    rewards: RewardsLedger<D>,
}

impl<L, D, C, P, N> PaymentReconciler<L, D, C, P, N>
where
    L: InventoryLedger,
    D: Datastore + Clone,
    C: CarrierGateway,
    P: PaymentGateway,
    N: NotificationPort,
{
    /// Creates a reconciler over the injected collaborators.
    pub fn new(
        ledger: L,
        store: D,
        carrier: C,
        payment: P,
        notifier: N,
        locations: Arc<LocationDirectory>,
    ) -> Self {
        let rewards = RewardsLedger::new(store.clone());
        Self {
            ledger,
            store,
            carrier,
            payment,
            notifier,
            locations,
            rewards,
        }
    }

    /// Handles the gateway's return callback.
    #[tracing::instrument(skip(self, params))]
    pub async fn handle_return(&self, params: &BTreeMap<String, String>) -> Result<ReconcileOutcome> {
        metrics::counter!("payment_callback_total").increment(1);

        // 1. Recompute the signature over the canonicalized, sorted
        // parameter set. A mismatch is logged and rejected with no
        // state change.
        if !self.payment.verify_callback(params) {
            metrics::counter!("payment_callback_rejected").increment(1);
            tracing::warn!(?params, "payment callback signature mismatch");
            return Err(CheckoutError::SignatureMismatch);
        }

        let order_code = params
            .get(PARAM_TXN_REF)
            .ok_or_else(|| CheckoutError::Validation("callback missing txn_ref".to_string()))?
            .clone();
        let response_code = params
            .get(PARAM_RESPONSE_CODE)
            .ok_or_else(|| CheckoutError::Validation("callback missing response_code".to_string()))?;

        if response_code == SUCCESS_RESPONSE_CODE {
            self.confirm(&order_code).await
        } else {
            tracing::info!(%order_code, %response_code, "payment reported failed");
            self.roll_back(&order_code).await
        }
    }

    async fn confirm(&self, order_code: &str) -> Result<ReconcileOutcome> {
        let mut order = self
            .store
            .order_by_code(order_code)
            .await?
            .ok_or_else(|| CheckoutError::OrderNotFound {
                code: order_code.to_string(),
            })?;

        if !order.status.can_confirm_payment() {
            return Err(CheckoutError::ReconciliationDataMissing(format!(
                "order {order_code} is not awaiting payment confirmation"
            )));
        }

        // 2. Re-validate that the records the provisional order depends
        // on still exist; a hole means corrupted state and a full unwind.
        let cart = self.store.cart_by_id(order.cart_id).await?;
        let lines = self.store.order_lines(order.id).await?;
        let customer = self.store.customer_by_id(order.customer_id).await?;

        let (_cart, customer) = match (cart, customer) {
            (Some(cart), Some(customer)) if !lines.is_empty() => (cart, customer),
            (cart, customer) => {
                let missing = if cart.is_none() {
                    "cart"
                } else if customer.is_none() {
                    "customer"
                } else {
                    "order line items"
                };
                tracing::error!(%order_code, missing, "provisional order state corrupted");

                self.release_held(&order).await;
                self.unwind_rewards(&order).await;
                if order.is_provisional_guest_account {
                    if let Some(customer) = &customer {
                        // Leave the identity usable rather than half-created.
                        if let Err(err) =
                            self.store.set_customer_active(customer.id, true).await
                        {
                            tracing::warn!(error = %err, "guest reactivation failed");
                        }
                    }
                }
                if let Err(err) = self.store.delete_order(order.id).await {
                    tracing::error!(%order_code, error = %err, "corrupted order cleanup failed");
                }

                return Err(CheckoutError::ReconciliationDataMissing(format!(
                    "{missing} vanished before the payment callback"
                )));
            }
        };

        // 3. Place the shipment deferred at checkout time. Zero COD:
        // the gateway already collected payment.
        let priced = self.priced_from_lines(&lines).await?;
        let location = self.locations.resolve(&order.ship_to)?;
        let destination = Destination {
            location,
            contact_name: customer.full_name.clone(),
            contact_phone: customer.phone_number.clone(),
            address_line: order.ship_to.to_single_line(),
        };
        let parcel = Parcel::from_items(&priced);
        let items: Vec<ShipmentItem> = priced
            .iter()
            .map(|(entry, qty)| ShipmentItem {
                sku_id: entry.sku_id.to_string(),
                name: entry.name.clone(),
                quantity: *qty,
                unit_price: entry.unit_price,
            })
            .collect();

        // A carrier failure here leaves the provisional order and its
        // holds in place for a retry; payment is already captured, so
        // unwinding would forfeit it.
        let shipment_ref = self
            .carrier
            .place_shipment(&destination, &parcel, &items, Money::zero())
            .await?;

        for reservation in &order.held_reservations {
            if let Err(err) = self.ledger.commit(reservation).await {
                tracing::error!(
                    reservation = %reservation.id,
                    error = %err,
                    "reservation commit failed during reconciliation"
                );
            }
        }

        let guest_password = order.guest_password.take();
        order
            .transition(OrderStatus::Pending)
            .map_err(|err| CheckoutError::ReconciliationDataMissing(err.to_string()))?;
        order.payment_status = PaymentStatus::Paid;
        order.held_reservations.clear();
        self.store.update_order(&order).await?;

        let shipment = Shipment {
            order_id: order.id,
            carrier_reference: shipment_ref.reference,
            fee: shipment_ref.fee,
            carrier_status: "PENDING".to_string(),
            eta: shipment_ref.eta,
        };
        self.store.insert_shipment(&shipment).await?;
        self.store
            .append_order_event(&OrderEvent::now(order.id, OrderStatus::Pending))
            .await?;

        // 4. Post-confirmation bookkeeping mirrors the cash branch.
        if let Err(err) = self.rewards.accrue(order.customer_id, order.total_price).await {
            tracing::error!(%order_code, error = %err, "loyalty accrual failed");
        }
        if let Err(err) = self.store.delete_cart(order.cart_id).await {
            tracing::error!(%order_code, error = %err, "cart cleanup failed");
        }

        if order.is_provisional_guest_account {
            if let Err(err) = self.store.set_customer_active(customer.id, true).await {
                tracing::error!(error = %err, "guest activation failed");
            }
            if let Some(password) = guest_password {
                self.notifier.notify(NotificationEvent::GuestCredentials {
                    order_code: order.code.clone(),
                    email: customer.email.clone(),
                    full_name: customer.full_name.clone(),
                    one_time_password: password,
                });
            }
        }
        self.notifier.notify(NotificationEvent::OrderConfirmation {
            order_code: order.code.clone(),
            email: customer.email,
            full_name: customer.full_name,
            total: order.total_price,
        });

        metrics::counter!("payment_callback_confirmed").increment(1);
        tracing::info!(%order_code, "provisional order confirmed");
        Ok(ReconcileOutcome::Confirmed {
            order_code: order_code.to_string(),
        })
    }

    async fn roll_back(&self, order_code: &str) -> Result<ReconcileOutcome> {
        let Some(order) = self.store.order_by_code(order_code).await? else {
            // Nothing left to unwind; send the buyer to the failure page.
            return Ok(ReconcileOutcome::RolledBack {
                order_code: order_code.to_string(),
            });
        };

        self.release_held(&order).await;
        self.unwind_rewards(&order).await;

        if order.is_provisional_guest_account {
            if let Err(err) = self.store.purge_customer(order.customer_id).await {
                tracing::warn!(
                    customer_id = %order.customer_id,
                    error = %err,
                    "guest purge failed during rollback"
                );
            }
        }

        self.store.delete_order(order.id).await?;

        metrics::counter!("payment_callback_rolled_back").increment(1);
        tracing::info!(%order_code, "provisional order rolled back");
        Ok(ReconcileOutcome::RolledBack {
            order_code: order_code.to_string(),
        })
    }

    /// Rebuilds (catalog entry, quantity) pairs for parcel derivation.
    /// A SKU that left the catalog falls back to the order's own
    /// snapshot with default measurements.
    async fn priced_from_lines(
        &self,
        lines: &[domain::OrderLineItem],
    ) -> Result<Vec<(CatalogEntry, u32)>> {
        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            let entry = match self.store.catalog_entry(&line.sku_id).await? {
                Some(entry) => entry,
                None => CatalogEntry::priced(
                    SkuId::new(line.sku_id.as_str()),
                    line.name.clone(),
                    line.unit_price,
                ),
            };
            priced.push((entry, line.quantity));
        }
        Ok(priced)
    }

    async fn release_held(&self, order: &Order) {
        for reservation in &order.held_reservations {
            if let Err(err) = self.ledger.release(reservation).await {
                tracing::warn!(
                    reservation = %reservation.id,
                    error = %err,
                    "reservation release failed during rollback"
                );
            }
        }
    }

    async fn unwind_rewards(&self, order: &Order) {
        if let Some(code) = &order.coupon_code {
            if let Err(err) = self.rewards.release_coupon(code).await {
                tracing::warn!(coupon = %code, error = %err, "coupon release failed during rollback");
            }
        }
        if order.loyalty_redeemed > 0 {
            if let Err(err) = self
                .rewards
                .restore_points(order.customer_id, order.loyalty_redeemed)
                .await
            {
                tracing::warn!(error = %err, "loyalty restore failed during rollback");
            }
        }
    }
}
