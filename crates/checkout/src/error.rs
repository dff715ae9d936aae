//! The unified checkout error taxonomy.
//!
//! One discriminated kind per failure class, propagated as values
//! through the orchestrator so every compensation branch is statically
//! reachable. Each variant documents which side effects have already
//! been undone by the time a caller sees it.

use common::ReservationId;
use thiserror::Error;

use crate::carrier::CarrierError;
use crate::carrier::location::LocationError;
use crate::payment::PaymentError;
use store::StoreError;

/// Errors surfaced by the checkout orchestrator and payment reconciler.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Missing or malformed request fields. Rejected before any
    /// reservation; no side effects.
    #[error("invalid checkout request: {0}")]
    Validation(String),

    /// The resolved cart has no line items. No side effects.
    #[error("cart has no items")]
    EmptyCart,

    /// The referenced cart does not exist. No side effects.
    #[error("cart not found")]
    CartNotFound,

    /// Stock ran out mid-checkout. All partial reservations from this
    /// checkout have been released.
    #[error("insufficient stock for {sku_id}: requested {requested}, available {available}")]
    InsufficientStock {
        sku_id: String,
        requested: u32,
        available: u32,
    },

    /// The coupon code does not exist. Inventory reservations released.
    #[error("coupon {code} does not exist")]
    CouponInvalid { code: String },

    /// The coupon has no redemptions left. Inventory reservations released.
    #[error("coupon {code} is exhausted")]
    CouponExhausted { code: String },

    /// The customer asked to redeem more points than they hold.
    /// Inventory reservations released.
    #[error("insufficient loyalty points: requested {requested}, balance {balance}")]
    InsufficientLoyaltyPoints { requested: u32, balance: u32 },

    /// The destination could not be matched against the carrier's
    /// location taxonomy. Reservations and coupon/loyalty redemptions
    /// released.
    #[error("address could not be resolved: {0}")]
    AddressUnresolved(#[from] LocationError),

    /// The carrier rejected the quote or shipment. Reservations and
    /// coupon/loyalty redemptions released.
    #[error("carrier error: {0}")]
    Carrier(#[from] CarrierError),

    /// Building the payment redirect URL failed. The provisional order,
    /// its line items, and any provisional guest identity have been
    /// deleted; reservations released.
    #[error("payment redirect could not be built: {0}")]
    PaymentUrlBuild(#[from] PaymentError),

    /// The callback signature did not match. Nothing was mutated.
    #[error("payment callback signature mismatch")]
    SignatureMismatch,

    /// The provisional order's supporting records vanished before the
    /// callback arrived. Full compensation has run, including the purge
    /// of any placeholder guest identity.
    #[error("reconciliation data missing: {0}")]
    ReconciliationDataMissing(String),

    /// No order exists for the code echoed by the gateway.
    #[error("order {code} not found")]
    OrderNotFound { code: String },

    /// A reservation was already settled when the saga tried to commit it.
    #[error("reservation {0} already settled")]
    ReservationSettled(ReservationId),

    /// Persistence failure outside the typed cases above.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientStock {
                sku_id,
                requested,
                available,
            } => CheckoutError::InsufficientStock {
                sku_id,
                requested,
                available,
            },
            StoreError::UnknownReservation(id) => CheckoutError::ReservationSettled(id),
            other => CheckoutError::Store(other),
        }
    }
}

/// Result type for checkout operations.
pub type Result<T> = std::result::Result<T, CheckoutError>;
