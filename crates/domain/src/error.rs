//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;

/// Errors that can occur when mutating domain records.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The order is not in a status that allows the requested transition.
    #[error("invalid order status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// A line item carried a zero quantity.
    #[error("line item for {sku_id} has zero quantity")]
    ZeroQuantity { sku_id: String },

    /// A line item carried a non-positive unit price.
    #[error("line item for {sku_id} has non-positive unit price {price}")]
    InvalidPrice { sku_id: String, price: i64 },
}
