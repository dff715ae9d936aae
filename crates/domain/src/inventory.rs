//! Inventory records and reservations.

use common::ReservationId;
use serde::{Deserialize, Serialize};

use crate::value_objects::SkuId;

/// Stock bookkeeping for one SKU.
///
/// Invariant: `0 <= quantity_reserved <= quantity_owned`. The record is
/// only ever mutated through the ledger's reserve/release/commit
/// operations; order code never assigns the quantities directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub sku_id: SkuId,
    pub quantity_owned: u32,
    pub quantity_reserved: u32,
    /// Bumped on every mutation; the compare half of compare-and-set.
    pub version: u64,
}

impl InventoryRecord {
    /// Creates a record with the given owned stock and nothing reserved.
    pub fn new(sku_id: SkuId, quantity_owned: u32) -> Self {
        Self {
            sku_id,
            quantity_owned,
            quantity_reserved: 0,
            version: 0,
        }
    }

    /// Stock that can still be promised to a new checkout.
    pub fn available(&self) -> u32 {
        self.quantity_owned - self.quantity_reserved
    }
}

/// A temporary hold on inventory that has not yet permanently removed
/// stock. Held by an in-flight checkout, and either committed (stock
/// decremented) or released (hold dropped) exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub sku_id: SkuId,
    pub quantity: u32,
}

impl Reservation {
    /// Creates a reservation with a fresh id.
    pub fn new(sku_id: SkuId, quantity: u32) -> Self {
        Self {
            id: ReservationId::new(),
            sku_id,
            quantity,
        }
    }
}
