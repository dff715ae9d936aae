//! Checkout saga state machine.

use serde::{Deserialize, Serialize};

/// The state of one checkout attempt as the saga drives it.
///
/// State transitions:
/// ```text
/// Draft ──► Reserved ──┬──► Finalized
///    │         │       ├──► Provisional ──┬──► Confirmed
///    │         │       │                  └──► Aborted (order deleted)
///    └─────────┴───────┴──► Aborted
/// ```
///
/// `Finalized` and `Confirmed` both mean "stock committed, order
/// durable"; they differ only in whether a payment gateway round-trip
/// happened in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckoutState {
    /// Cart resolved, nothing reserved yet.
    #[default]
    Draft,

    /// Every line item holds an inventory reservation.
    Reserved,

    /// Cash-on-delivery order persisted and stock committed (terminal).
    Finalized,

    /// Provisional order persisted, buyer redirected to the payment
    /// gateway. Reservations held but not committed.
    Provisional,

    /// Gateway confirmed payment; the provisional order became durable
    /// (terminal).
    Confirmed,

    /// Checkout failed and every side effect was compensated (terminal).
    Aborted,
}

impl CheckoutState {
    /// Returns true if reservations can be taken in this state.
    pub fn can_reserve(&self) -> bool {
        matches!(self, CheckoutState::Draft)
    }

    /// Returns true if the saga can finalize immediately (cash branch).
    pub fn can_finalize(&self) -> bool {
        matches!(self, CheckoutState::Reserved)
    }

    /// Returns true if the saga can persist a provisional order and
    /// redirect to the gateway.
    pub fn can_go_provisional(&self) -> bool {
        matches!(self, CheckoutState::Reserved)
    }

    /// Returns true if the payment callback can confirm this checkout.
    pub fn can_confirm(&self) -> bool {
        matches!(self, CheckoutState::Provisional)
    }

    /// Returns true if compensation can still run from this state.
    pub fn can_abort(&self) -> bool {
        matches!(
            self,
            CheckoutState::Draft | CheckoutState::Reserved | CheckoutState::Provisional
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckoutState::Finalized | CheckoutState::Confirmed | CheckoutState::Aborted
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutState::Draft => "Draft",
            CheckoutState::Reserved => "Reserved",
            CheckoutState::Finalized => "Finalized",
            CheckoutState::Provisional => "Provisional",
            CheckoutState::Confirmed => "Confirmed",
            CheckoutState::Aborted => "Aborted",
        }
    }
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
