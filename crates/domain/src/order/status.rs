//! Order status machine.

use serde::{Deserialize, Serialize};

/// Persisted status of an order.
///
/// Status transitions:
/// ```text
/// PendingPayment ──► Pending ──► Confirmed ──► Shipping ──► Delivered
/// ```
///
/// Cash-on-delivery orders are created directly in `Pending`;
/// redirect-payment orders start at `PendingPayment` and move to
/// `Pending` once the gateway confirms. A provisional order whose
/// payment fails is deleted outright, so no cancelled status exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Provisional order awaiting the payment gateway callback.
    PendingPayment,

    /// Paid (or payable on delivery) and waiting for operator confirmation.
    Pending,

    /// Confirmed by an operator, being prepared.
    Confirmed,

    /// Handed to the carrier.
    Shipping,

    /// Received by the customer (terminal state).
    Delivered,
}

impl OrderStatus {
    /// Returns true if the payment gateway callback may finalize this order.
    pub fn can_confirm_payment(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment)
    }

    /// Returns true if an operator can move the order one step forward.
    pub fn can_advance(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Shipping
        )
    }

    /// Returns the next status on the fulfillment ladder, if any.
    ///
    /// `PendingPayment` is excluded: only the payment callback moves an
    /// order out of that status.
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Confirmed),
            OrderStatus::Confirmed => Some(OrderStatus::Shipping),
            OrderStatus::Shipping => Some(OrderStatus::Delivered),
            OrderStatus::PendingPayment | OrderStatus::Delivered => None,
        }
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Shipping => "SHIPPING",
            OrderStatus::Delivered => "DELIVERED",
        }
    }

    /// Parses the string produced by [`OrderStatus::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING_PAYMENT" => Some(OrderStatus::PendingPayment),
            "PENDING" => Some(OrderStatus::Pending),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "SHIPPING" => Some(OrderStatus::Shipping),
            "DELIVERED" => Some(OrderStatus::Delivered),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_payment_can_confirm_payment() {
        assert!(OrderStatus::PendingPayment.can_confirm_payment());
        assert!(!OrderStatus::Pending.can_confirm_payment());
        assert!(!OrderStatus::Confirmed.can_confirm_payment());
        assert!(!OrderStatus::Shipping.can_confirm_payment());
        assert!(!OrderStatus::Delivered.can_confirm_payment());
    }

    #[test]
    fn fulfillment_ladder() {
        assert_eq!(OrderStatus::Pending.next(), Some(OrderStatus::Confirmed));
        assert_eq!(OrderStatus::Confirmed.next(), Some(OrderStatus::Shipping));
        assert_eq!(OrderStatus::Shipping.next(), Some(OrderStatus::Delivered));
        assert_eq!(OrderStatus::Delivered.next(), None);
        assert_eq!(OrderStatus::PendingPayment.next(), None);
    }

    #[test]
    fn can_advance_matches_ladder() {
        for status in [
            OrderStatus::PendingPayment,
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Shipping,
            OrderStatus::Delivered,
        ] {
            assert_eq!(status.can_advance(), status.next().is_some());
        }
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(!OrderStatus::PendingPayment.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
    }

    #[test]
    fn serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&OrderStatus::PendingPayment).unwrap();
        assert_eq!(json, "\"PENDING_PAYMENT\"");
        let back: OrderStatus = serde_json::from_str("\"SHIPPING\"").unwrap();
        assert_eq!(back, OrderStatus::Shipping);
    }
}
