//! The checkout saga.
//!
//! Turning a cart into a confirmed order coordinates three resources
//! that cannot be committed atomically together: the inventory ledger,
//! the shipping carrier, and (for non-cash payments) a redirect payment
//! gateway. This crate drives that coordination:
//!
//! 1. Resolve the cart and price its lines from the live catalog
//! 2. Reserve inventory per line (compare-and-set, never oversell)
//! 3. Redeem coupon and loyalty points
//! 4. Branch on payment method: place the carrier shipment and finalize
//!    immediately (cash on delivery), or quote the fee, persist a
//!    provisional order, and hand the buyer to the payment gateway
//! 5. Reconcile the gateway's signed return callback: finalize or fully
//!    unwind the provisional order
//!
//! Every step that fails undoes every side effect it personally caused
//! before returning; there is no catch-all rollback because the external
//! calls are not part of the local transaction.

pub mod carrier;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod payment;
pub mod reconciler;
pub mod resolver;
pub mod rewards;
pub mod state;

pub use carrier::location::{
    District, LocationDirectory, LocationError, Province, ResolvedLocation, Ward,
};
pub use carrier::{
    CarrierError, CarrierGateway, Destination, InMemoryCarrierGateway, Parcel, ShipmentItem,
    ShipmentRef,
};
pub use error::CheckoutError;
pub use notify::{ChannelNotifier, NotificationEvent, NotificationPort, RecordingNotifier};
pub use orchestrator::{
    CheckoutOrchestrator, CheckoutOutcome, CheckoutRequest, GuestContact,
};
pub use payment::{PaymentError, PaymentGateway, PaymentGatewayConfig, RedirectGateway};
pub use reconciler::{PaymentReconciler, ReconcileOutcome};
pub use resolver::{CartResolver, ShopperIdentity};
pub use rewards::{ACCRUAL_DIVISOR, POINT_VALUE, RewardsLedger};
pub use state::CheckoutState;
