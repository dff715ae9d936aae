//! Order records: the order itself, its immutable line-item snapshots,
//! the carrier shipment, and the append-only status audit trail.

mod status;

pub use status::OrderStatus;

use chrono::{DateTime, Utc};
use common::{CartId, CustomerId, OrderId};
use serde::{Deserialize, Serialize};

use crate::customer::Address;
use crate::error::DomainError;
use crate::inventory::Reservation;
use crate::value_objects::{Money, OrderCode, SkuId};

/// How the customer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Payment collected by the carrier on delivery.
    CashOnDelivery,

    /// Off-site payment through the redirect gateway.
    Redirect,
}

impl PaymentMethod {
    /// Returns the method name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CashOnDelivery => "CASH_ON_DELIVERY",
            PaymentMethod::Redirect => "REDIRECT",
        }
    }

    /// Parses the string produced by [`PaymentMethod::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CASH_ON_DELIVERY" => Some(PaymentMethod::CashOnDelivery),
            "REDIRECT" => Some(PaymentMethod::Redirect),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether payment for an order has been collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Paid => "PAID",
        }
    }

    /// Parses the string produced by [`PaymentStatus::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNPAID" => Some(PaymentStatus::Unpaid),
            "PAID" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A confirmed or provisional order.
///
/// Created only by the checkout orchestrator; mutated only by the
/// orchestrator, the payment reconciler, and the operator status
/// advance. `total_price` is the full payable amount including the
/// shipping fee and net of discounts and redeemed loyalty points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub code: OrderCode,
    pub customer_id: CustomerId,
    /// Cart the order was placed from. Provisional orders keep the cart
    /// alive until the payment callback settles; the reconciler uses
    /// this reference to find it again.
    pub cart_id: CartId,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub total_price: Money,
    pub shipping_fee: Money,
    pub discount_applied: Money,
    /// Loyalty points the customer chose to redeem on this order.
    pub loyalty_redeemed: u32,
    /// Coupon redeemed on this order, kept so a rollback can return the
    /// use to the coupon's budget.
    pub coupon_code: Option<String>,
    /// Destination, snapshotted at checkout time.
    pub ship_to: Address,
    /// Set when the buyer was a first-time guest and the customer record
    /// was created provisionally for this order; a failed payment purges
    /// that record again.
    pub is_provisional_guest_account: bool,
    /// One-time password for a provisional guest account, sent with the
    /// credentials notification after confirmation and cleared afterwards.
    pub guest_password: Option<String>,
    /// Inventory holds backing a provisional order. Empty once the order
    /// is finalized (the holds are committed) or rolled back (released).
    pub held_reservations: Vec<Reservation>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Moves the order to `to`, enforcing the status machine.
    pub fn transition(&mut self, to: OrderStatus) -> Result<(), DomainError> {
        let allowed = match to {
            OrderStatus::Pending => self.status.can_confirm_payment(),
            _ => self.status.next() == Some(to),
        };

        if !allowed {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status,
                to,
            });
        }

        self.status = to;
        Ok(())
    }

    /// Moves the order one step along the fulfillment ladder (operator
    /// action). Delivery settles a cash-on-delivery payment: the
    /// carrier handed over the parcel and collected the money.
    pub fn advance(&mut self) -> Result<OrderStatus, DomainError> {
        let next = self
            .status
            .next()
            .ok_or(DomainError::InvalidStatusTransition {
                from: self.status,
                to: self.status,
            })?;
        self.transition(next)?;

        if self.status == OrderStatus::Delivered
            && self.payment_method == PaymentMethod::CashOnDelivery
        {
            self.payment_status = PaymentStatus::Paid;
        }

        Ok(self.status)
    }
}

/// Immutable snapshot of one ordered SKU, taken at order-creation time
/// so later catalog edits cannot rewrite order history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub order_id: OrderId,
    pub sku_id: SkuId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl OrderLineItem {
    /// Validates and creates a snapshot line.
    pub fn new(
        order_id: OrderId,
        sku_id: SkuId,
        name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Result<Self, DomainError> {
        if quantity == 0 {
            return Err(DomainError::ZeroQuantity {
                sku_id: sku_id.to_string(),
            });
        }
        if !unit_price.is_positive() {
            return Err(DomainError::InvalidPrice {
                sku_id: sku_id.to_string(),
                price: unit_price.amount(),
            });
        }

        Ok(Self {
            order_id,
            sku_id,
            name: name.into(),
            unit_price,
            quantity,
        })
    }

    /// Returns `unit_price * quantity`.
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// A shipment placed with the carrier for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub order_id: OrderId,
    /// The carrier's own reference for the shipment.
    pub carrier_reference: String,
    pub fee: Money,
    pub carrier_status: String,
    pub eta: Option<DateTime<Utc>>,
}

/// Append-only audit record: one entry per order status transition.
/// Never edited or deleted while the order exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}

impl OrderEvent {
    /// Records a transition happening now.
    pub fn now(order_id: OrderId, status: OrderStatus) -> Self {
        Self {
            order_id,
            status,
            timestamp: Utc::now(),
        }
    }
}
