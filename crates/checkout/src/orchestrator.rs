//! Checkout orchestrator: drives a cart through reservation, rewards,
//! the carrier, and the payment branch, compensating on every failure.

use std::sync::Arc;

use chrono::Utc;
use common::{CartId, CustomerId, OrderId};
use domain::{
    Address, CatalogEntry, Cart, Customer, Money, Order, OrderCode, OrderEvent, OrderLineItem,
    OrderStatus, PaymentMethod, PaymentStatus, Reservation, Shipment,
};
use rand::Rng;
use rand::distr::Alphanumeric;
use store::{Datastore, InventoryLedger};

use crate::carrier::location::LocationDirectory;
use crate::carrier::{CarrierGateway, Destination, Parcel, ShipmentItem};
use crate::error::{CheckoutError, Result};
use crate::notify::{NotificationEvent, NotificationPort};
use crate::payment::PaymentGateway;
use crate::resolver::{CartResolver, ShopperIdentity};
use crate::rewards::RewardsLedger;
use crate::state::CheckoutState;

/// Contact and delivery details for a guest checkout.
#[derive(Debug, Clone)]
pub struct GuestContact {
    pub email: String,
    pub full_name: String,
    pub phone_number: String,
    pub address: Address,
}

/// One checkout request as it arrives from the HTTP layer.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Authenticated customer, if any.
    pub customer_id: Option<CustomerId>,
    /// Anonymous session token, if any.
    pub session_token: Option<String>,
    /// Explicit cart reference, used when neither identity is supplied.
    pub cart_id: Option<CartId>,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
    /// Loyalty points to redeem against the subtotal.
    pub loyalty_points: u32,
    /// Required when no authenticated customer is supplied.
    pub guest_contact: Option<GuestContact>,
    /// Forwarded to the payment gateway.
    pub client_ip: String,
}

/// What the caller gets back from a successful checkout.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// Cash on delivery: the order is finalized.
    Placed { order_code: OrderCode },

    /// Redirect payment: a provisional order exists and the buyer must
    /// complete payment at the returned URL.
    RedirectToPayment {
        order_code: OrderCode,
        payment_url: String,
    },
}

/// The buyer resolved for this checkout.
struct Buyer {
    customer: Customer,
    address: Address,
    /// True when the customer record was created provisionally for this
    /// checkout and must be purged if it fails.
    created_guest: bool,
    /// One-time password for a freshly created guest account.
    one_time_password: Option<String>,
}

/// Coordinates one checkout attempt across the inventory ledger, the
/// local datastore, the carrier, and the payment gateway.
///
/// Each request runs independently; the only cross-request coordination
/// is inside the inventory ledger's reserve. Every failure branch
/// undoes exactly the side effects this attempt has caused so far.
pub struct CheckoutOrchestrator<L, D, C, P, N>
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
    resolver: CartResolver<D>,
    rewards: RewardsLedger<D>,
}

impl<L, D, C, P, N> CheckoutOrchestrator<L, D, C, P, N>
where
    L: InventoryLedger,
    D: Datastore + Clone,
    C: CarrierGateway,
    P: PaymentGateway,
    N: NotificationPort,
{
    /// Creates an orchestrator over the injected collaborators.
    pub fn new(
        ledger: L,
        store: D,
        carrier: C,
        payment: P,
        notifier: N,
        locations: Arc<LocationDirectory>,
    ) -> Self {
        let resolver = CartResolver::new(store.clone());
        let rewards = RewardsLedger::new(store.clone());
        Self {
            ledger,
            store,
            carrier,
            payment,
            notifier,
            locations,
            resolver,
            rewards,
        }
    }

    /// Places an order from a cart.
    #[tracing::instrument(skip(self, request), fields(payment_method = %request.payment_method))]
    pub async fn place_order(&self, request: CheckoutRequest) -> Result<CheckoutOutcome> {
        metrics::counter!("checkout_total").increment(1);
        let started = std::time::Instant::now();

        let result = self.run(request).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(CheckoutOutcome::Placed { order_code }) => {
                metrics::counter!("checkout_finalized").increment(1);
                tracing::info!(%order_code, "checkout finalized");
            }
            Ok(CheckoutOutcome::RedirectToPayment { order_code, .. }) => {
                metrics::counter!("checkout_provisional").increment(1);
                tracing::info!(%order_code, "checkout handed off to payment gateway");
            }
            Err(err) => {
                metrics::counter!("checkout_aborted").increment(1);
                tracing::warn!(error = %err, "checkout aborted");
            }
        }
        result
    }

    async fn run(&self, request: CheckoutRequest) -> Result<CheckoutOutcome> {
        validate(&request)?;
        let mut state = CheckoutState::Draft;

        // 1. Resolve the cart and price its lines from the live catalog.
        let cart = self.resolve_cart(&request).await?;
        let priced = self.price_lines(&cart).await?;
        let subtotal: Money = priced
            .iter()
            .map(|(entry, qty)| entry.unit_price.multiply(*qty))
            .sum();

        // 2. Resolve the buyer; may create a provisional guest identity.
        let buyer = self.resolve_buyer(&request).await?;

        // Line-item snapshots are built before any side effect so a bad
        // line aborts with nothing to undo.
        let order_id = OrderId::new();
        let order_code = OrderCode::generate();
        let lines = snapshot_lines(order_id, &priced)?;

        // 3. Reserve every line. A single failure releases what this
        // checkout already holds and aborts.
        debug_assert!(state.can_reserve());
        let mut reservations: Vec<Reservation> = Vec::with_capacity(priced.len());
        for (entry, qty) in &priced {
            match self.ledger.reserve(&entry.sku_id, *qty).await {
                Ok(reservation) => reservations.push(reservation),
                Err(err) => {
                    self.release_reservations(&reservations).await;
                    self.purge_guest(&buyer).await;
                    return Err(err.into());
                }
            }
        }
        state = CheckoutState::Reserved;

        // 4. Redeem coupon and loyalty points against the pre-shipping
        // subtotal.
        let mut redeemed_coupon: Option<&str> = None;
        let mut coupon_discount = Money::zero();
        if let Some(code) = request.coupon_code.as_deref() {
            match self.rewards.redeem_coupon(code).await {
                Ok(discount) => {
                    coupon_discount = discount;
                    redeemed_coupon = Some(code);
                }
                Err(err) => {
                    self.release_reservations(&reservations).await;
                    self.purge_guest(&buyer).await;
                    return Err(err);
                }
            }
        }

        let loyalty_value = match self
            .rewards
            .redeem_points(buyer.customer.id, request.loyalty_points)
            .await
        {
            Ok(value) => value,
            Err(err) => {
                self.unwind_rewards(redeemed_coupon, buyer.customer.id, 0).await;
                self.release_reservations(&reservations).await;
                self.purge_guest(&buyer).await;
                return Err(err);
            }
        };

        let payable = subtotal
            .saturating_sub(coupon_discount)
            .saturating_sub(loyalty_value);

        // 5. Resolve the destination against the carrier taxonomy.
        let location = match self.locations.resolve(&buyer.address) {
            Ok(location) => location,
            Err(err) => {
                self.unwind_rewards(redeemed_coupon, buyer.customer.id, request.loyalty_points)
                    .await;
                self.release_reservations(&reservations).await;
                self.purge_guest(&buyer).await;
                return Err(err.into());
            }
        };
        let destination = Destination {
            location,
            contact_name: buyer.customer.full_name.clone(),
            contact_phone: buyer.customer.phone_number.clone(),
            address_line: buyer.address.to_single_line(),
        };
        let parcel = Parcel::from_items(&priced);

        // 6. Branch on payment method.
        debug_assert!(state.can_finalize() && state.can_go_provisional());
        match request.payment_method {
            PaymentMethod::CashOnDelivery => {
                self.finalize_cash(
                    &request,
                    state,
                    cart,
                    buyer,
                    order_id,
                    order_code,
                    lines,
                    reservations,
                    redeemed_coupon,
                    coupon_discount,
                    payable,
                    destination,
                    parcel,
                    &priced,
                )
                .await
            }
            PaymentMethod::Redirect => {
                self.hand_off_to_gateway(
                    &request,
                    state,
                    cart,
                    buyer,
                    order_id,
                    order_code,
                    lines,
                    reservations,
                    redeemed_coupon,
                    coupon_discount,
                    payable,
                    destination,
                    parcel,
                )
                .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize_cash(
        &self,
        request: &CheckoutRequest,
        mut state: CheckoutState,
        cart: Cart,
        buyer: Buyer,
        order_id: OrderId,
        order_code: OrderCode,
        lines: Vec<OrderLineItem>,
        reservations: Vec<Reservation>,
        redeemed_coupon: Option<&str>,
        coupon_discount: Money,
        payable: Money,
        destination: Destination,
        parcel: Parcel,
        priced: &[(CatalogEntry, u32)],
    ) -> Result<CheckoutOutcome> {
        let items: Vec<ShipmentItem> = priced
            .iter()
            .map(|(entry, qty)| ShipmentItem {
                sku_id: entry.sku_id.to_string(),
                name: entry.name.clone(),
                quantity: *qty,
                unit_price: entry.unit_price,
            })
            .collect();

        // The carrier collects the full payable amount on delivery.
        let shipment_ref = match self
            .carrier
            .place_shipment(&destination, &parcel, &items, payable)
            .await
        {
            Ok(shipment_ref) => shipment_ref,
            Err(err) => {
                self.unwind_rewards(redeemed_coupon, buyer.customer.id, request.loyalty_points)
                    .await;
                self.release_reservations(&reservations).await;
                self.purge_guest(&buyer).await;
                state = CheckoutState::Aborted;
                debug_assert!(state.is_terminal());
                return Err(err.into());
            }
        };

        // The shipment is placed; from here the checkout only moves
        // forward. Commit every hold into a permanent decrement.
        for reservation in &reservations {
            if let Err(err) = self.ledger.commit(reservation).await {
                tracing::error!(
                    reservation = %reservation.id,
                    error = %err,
                    "reservation commit failed after shipment placement"
                );
            }
        }

        let total_price = payable + shipment_ref.fee;
        let order = Order {
            id: order_id,
            code: order_code.clone(),
            customer_id: buyer.customer.id,
            cart_id: cart.id,
            status: OrderStatus::Pending,
            payment_method: PaymentMethod::CashOnDelivery,
            payment_status: PaymentStatus::Unpaid,
            total_price,
            shipping_fee: shipment_ref.fee,
            discount_applied: coupon_discount,
            loyalty_redeemed: request.loyalty_points,
            coupon_code: redeemed_coupon.map(str::to_string),
            ship_to: buyer.address.clone(),
            is_provisional_guest_account: false,
            guest_password: None,
            held_reservations: Vec::new(),
            created_at: Utc::now(),
        };
        let shipment = Shipment {
            order_id,
            carrier_reference: shipment_ref.reference,
            fee: shipment_ref.fee,
            carrier_status: "PENDING".to_string(),
            eta: shipment_ref.eta,
        };
        let event = OrderEvent::now(order_id, OrderStatus::Pending);

        self.store
            .persist_checkout(&order, &lines, Some(&shipment), &event)
            .await?;
        state = CheckoutState::Finalized;
        debug_assert!(state.is_terminal());

        self.settle_after_finalize(&order, &buyer, total_price).await;

        Ok(CheckoutOutcome::Placed { order_code })
    }

    #[allow(clippy::too_many_arguments)]
    async fn hand_off_to_gateway(
        &self,
        request: &CheckoutRequest,
        mut state: CheckoutState,
        cart: Cart,
        buyer: Buyer,
        order_id: OrderId,
        order_code: OrderCode,
        lines: Vec<OrderLineItem>,
        reservations: Vec<Reservation>,
        redeemed_coupon: Option<&str>,
        coupon_discount: Money,
        payable: Money,
        destination: Destination,
        parcel: Parcel,
    ) -> Result<CheckoutOutcome> {
        // No shipment yet: only a fee quote. The shipment is placed by
        // the reconciler once the gateway confirms payment.
        let fee = match self.carrier.quote_fee(&destination, &parcel, payable).await {
            Ok(fee) => fee,
            Err(err) => {
                self.unwind_rewards(redeemed_coupon, buyer.customer.id, request.loyalty_points)
                    .await;
                self.release_reservations(&reservations).await;
                self.purge_guest(&buyer).await;
                return Err(err.into());
            }
        };

        let total_price = payable + fee;
        let order = Order {
            id: order_id,
            code: order_code.clone(),
            customer_id: buyer.customer.id,
            cart_id: cart.id,
            status: OrderStatus::PendingPayment,
            payment_method: PaymentMethod::Redirect,
            payment_status: PaymentStatus::Unpaid,
            total_price,
            shipping_fee: fee,
            discount_applied: coupon_discount,
            loyalty_redeemed: request.loyalty_points,
            coupon_code: redeemed_coupon.map(str::to_string),
            ship_to: buyer.address.clone(),
            is_provisional_guest_account: buyer.created_guest,
            guest_password: buyer.one_time_password.clone(),
            held_reservations: reservations.clone(),
            created_at: Utc::now(),
        };
        let event = OrderEvent::now(order_id, OrderStatus::PendingPayment);

        if let Err(err) = self
            .store
            .persist_checkout(&order, &lines, None, &event)
            .await
        {
            self.unwind_rewards(redeemed_coupon, buyer.customer.id, request.loyalty_points)
                .await;
            self.release_reservations(&reservations).await;
            self.purge_guest(&buyer).await;
            return Err(err.into());
        }
        state = CheckoutState::Provisional;

        // Inventory stays reserved but uncommitted; the cart survives
        // until the callback settles. If the redirect URL itself cannot
        // be built, the whole step is rolled back to nothing.
        match self
            .payment
            .build_redirect_url(&order_code, total_price, &request.client_ip)
        {
            Ok(payment_url) => {
                debug_assert!(state.can_confirm());
                Ok(CheckoutOutcome::RedirectToPayment {
                    order_code,
                    payment_url,
                })
            }
            Err(err) => {
                if let Err(delete_err) = self.store.delete_order(order_id).await {
                    tracing::error!(%order_id, error = %delete_err, "provisional order cleanup failed");
                }
                self.unwind_rewards(redeemed_coupon, buyer.customer.id, request.loyalty_points)
                    .await;
                self.release_reservations(&reservations).await;
                self.purge_guest(&buyer).await;
                state = CheckoutState::Aborted;
                debug_assert!(state.is_terminal());
                Err(err.into())
            }
        }
    }

    /// Post-finalization bookkeeping. The order is durable; failures
    /// here are logged, not surfaced, so the buyer still gets their
    /// order code.
    async fn settle_after_finalize(&self, order: &Order, buyer: &Buyer, total: Money) {
        if let Err(err) = self.rewards.accrue(order.customer_id, total).await {
            tracing::error!(order_code = %order.code, error = %err, "loyalty accrual failed");
        }
        if let Err(err) = self.store.delete_cart(order.cart_id).await {
            tracing::error!(order_code = %order.code, error = %err, "cart cleanup failed");
        }

        if buyer.created_guest {
            if let Err(err) = self.store.set_customer_active(buyer.customer.id, true).await {
                tracing::error!(error = %err, "guest activation failed");
            }
            if let Some(password) = &buyer.one_time_password {
                self.notifier.notify(NotificationEvent::GuestCredentials {
                    order_code: order.code.clone(),
                    email: buyer.customer.email.clone(),
                    full_name: buyer.customer.full_name.clone(),
                    one_time_password: password.clone(),
                });
            }
        }

        self.notifier.notify(NotificationEvent::OrderConfirmation {
            order_code: order.code.clone(),
            email: buyer.customer.email.clone(),
            full_name: buyer.customer.full_name.clone(),
            total,
        });
    }

    async fn resolve_cart(&self, request: &CheckoutRequest) -> Result<Cart> {
        if let Some(customer_id) = request.customer_id {
            let identity = ShopperIdentity::Customer {
                customer_id,
                session_token: request.session_token.clone(),
            };
            return self.resolver.resolve(&identity).await;
        }
        if let Some(token) = &request.session_token {
            let identity = ShopperIdentity::Anonymous {
                session_token: token.clone(),
            };
            return self.resolver.resolve(&identity).await;
        }
        let cart_id = request
            .cart_id
            .ok_or_else(|| CheckoutError::Validation("no cart reference supplied".to_string()))?;
        self.store
            .cart_by_id(cart_id)
            .await?
            .ok_or(CheckoutError::CartNotFound)
    }

    async fn price_lines(&self, cart: &Cart) -> Result<Vec<(CatalogEntry, u32)>> {
        let lines = self.store.cart_lines(cart.id).await?;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            let entry = self
                .store
                .catalog_entry(&line.sku_id)
                .await?
                .filter(|e| e.active)
                .ok_or_else(|| {
                    CheckoutError::Validation(format!(
                        "{} is no longer available for sale",
                        line.sku_id
                    ))
                })?;
            if line.quantity == 0 {
                return Err(CheckoutError::Validation(format!(
                    "zero quantity for {}",
                    line.sku_id
                )));
            }
            priced.push((entry, line.quantity));
        }
        Ok(priced)
    }

    async fn resolve_buyer(&self, request: &CheckoutRequest) -> Result<Buyer> {
        if let Some(customer_id) = request.customer_id {
            let customer = self
                .store
                .customer_by_id(customer_id)
                .await?
                .ok_or_else(|| CheckoutError::Validation("unknown customer".to_string()))?;
            let address = self
                .store
                .default_address(customer_id)
                .await?
                .ok_or_else(|| {
                    CheckoutError::Validation("customer has no default address".to_string())
                })?;
            return Ok(Buyer {
                customer,
                address,
                created_guest: false,
                one_time_password: None,
            });
        }

        // Guest checkout. validate() has already ensured the contact
        // block is present and complete.
        let contact = request
            .guest_contact
            .as_ref()
            .ok_or_else(|| CheckoutError::Validation("guest contact details required".to_string()))?;

        if let Some(existing) = self.store.customer_by_email(&contact.email).await? {
            let address = self
                .store
                .default_address(existing.id)
                .await?
                .unwrap_or_else(|| contact.address.clone());
            return Ok(Buyer {
                customer: existing,
                address,
                created_guest: false,
                one_time_password: None,
            });
        }

        let customer = Customer::guest(
            contact.email.clone(),
            contact.full_name.clone(),
            contact.phone_number.clone(),
        );
        self.store.insert_customer(&customer).await?;
        self.store
            .upsert_default_address(customer.id, &contact.address)
            .await?;
        let password = one_time_password();
        tracing::debug!(customer_id = %customer.id, "created provisional guest account");

        Ok(Buyer {
            customer,
            address: contact.address.clone(),
            created_guest: true,
            one_time_password: Some(password),
        })
    }

    async fn release_reservations(&self, reservations: &[Reservation]) {
        for reservation in reservations {
            if let Err(err) = self.ledger.release(reservation).await {
                tracing::warn!(
                    reservation = %reservation.id,
                    error = %err,
                    "reservation release failed during compensation"
                );
            }
        }
    }

    async fn unwind_rewards(
        &self,
        redeemed_coupon: Option<&str>,
        customer_id: CustomerId,
        points: u32,
    ) {
        if let Some(code) = redeemed_coupon {
            if let Err(err) = self.rewards.release_coupon(code).await {
                tracing::warn!(coupon = code, error = %err, "coupon release failed during compensation");
            }
        }
        if points > 0 {
            if let Err(err) = self.rewards.restore_points(customer_id, points).await {
                tracing::warn!(%customer_id, error = %err, "loyalty restore failed during compensation");
            }
        }
    }

    async fn purge_guest(&self, buyer: &Buyer) {
        if buyer.created_guest {
            if let Err(err) = self.store.purge_customer(buyer.customer.id).await {
                tracing::warn!(
                    customer_id = %buyer.customer.id,
                    error = %err,
                    "guest purge failed during compensation"
                );
            }
        }
    }
}

fn validate(request: &CheckoutRequest) -> Result<()> {
    if request.customer_id.is_none()
        && request.session_token.is_none()
        && request.cart_id.is_none()
    {
        return Err(CheckoutError::Validation(
            "a customer id, session token, or cart id is required".to_string(),
        ));
    }

    if request.customer_id.is_none() {
        if request.loyalty_points > 0 {
            return Err(CheckoutError::Validation(
                "loyalty redemption requires an account".to_string(),
            ));
        }

        let contact = request.guest_contact.as_ref().ok_or_else(|| {
            CheckoutError::Validation("guest checkout requires contact and delivery details".to_string())
        })?;
        let complete = !contact.email.is_empty()
            && !contact.full_name.is_empty()
            && !contact.phone_number.is_empty()
            && !contact.address.province.is_empty()
            && !contact.address.district.is_empty()
            && !contact.address.ward.is_empty()
            && !contact.address.detail.is_empty();
        if !complete {
            return Err(CheckoutError::Validation(
                "guest contact and delivery details are incomplete".to_string(),
            ));
        }
    }

    Ok(())
}

fn snapshot_lines(
    order_id: OrderId,
    priced: &[(CatalogEntry, u32)],
) -> Result<Vec<OrderLineItem>> {
    priced
        .iter()
        .map(|(entry, qty)| {
            OrderLineItem::new(
                order_id,
                entry.sku_id.clone(),
                entry.name.clone(),
                entry.unit_price,
                *qty,
            )
            .map_err(|err| CheckoutError::Validation(err.to_string()))
        })
        .collect()
}

fn one_time_password() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_requests_with_no_cart_reference() {
        let request = CheckoutRequest {
            customer_id: None,
            session_token: None,
            cart_id: None,
            payment_method: PaymentMethod::CashOnDelivery,
            coupon_code: None,
            loyalty_points: 0,
            guest_contact: None,
            client_ip: "127.0.0.1".to_string(),
        };
        assert!(matches!(
            validate(&request),
            Err(CheckoutError::Validation(_))
        ));
    }

    #[test]
    fn validate_rejects_guest_loyalty_redemption() {
        let request = CheckoutRequest {
            customer_id: None,
            session_token: Some("tok".to_string()),
            cart_id: None,
            payment_method: PaymentMethod::CashOnDelivery,
            coupon_code: None,
            loyalty_points: 5,
            guest_contact: None,
            client_ip: "127.0.0.1".to_string(),
        };
        assert!(matches!(
            validate(&request),
            Err(CheckoutError::Validation(_))
        ));
    }

    #[test]
    fn validate_rejects_incomplete_guest_contact() {
        let request = CheckoutRequest {
            customer_id: None,
            session_token: Some("tok".to_string()),
            cart_id: None,
            payment_method: PaymentMethod::CashOnDelivery,
            coupon_code: None,
            loyalty_points: 0,
            guest_contact: Some(GuestContact {
                email: "a@example.com".to_string(),
                full_name: String::new(),
                phone_number: "0935".to_string(),
                address: Address {
                    province: "P".to_string(),
                    district: "D".to_string(),
                    ward: "W".to_string(),
                    detail: "detail".to_string(),
                },
            }),
            client_ip: "127.0.0.1".to_string(),
        };
        assert!(matches!(
            validate(&request),
            Err(CheckoutError::Validation(_))
        ));
    }

    #[test]
    fn one_time_passwords_are_random_and_sized() {
        let a = one_time_password();
        let b = one_time_password();
        assert_eq!(a.len(), 12);
        assert_ne!(a, b);
    }
}
