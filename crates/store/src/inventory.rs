//! Inventory ledger: atomic reserve/release/commit over shared stock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{InventoryRecord, Reservation, SkuId};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};

/// The stock ledger shared by every concurrent checkout.
///
/// `reserve` is the only operation in the pipeline that needs
/// cross-request coordination: it must verify `available >= qty` and
/// take the hold as one atomic step, keyed on the record's current
/// state, so two checkouts racing for the last unit cannot both win.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Atomically verifies availability and places a hold on `quantity`
    /// units of `sku_id`. Fails with [`StoreError::InsufficientStock`]
    /// once unreserved stock is truly exhausted; it never oversells.
    async fn reserve(&self, sku_id: &SkuId, quantity: u32) -> Result<Reservation>;

    /// Drops a hold, returning the units to the available pool.
    ///
    /// Idempotent per reservation id: releasing a reservation that is no
    /// longer active is a no-op, so compensation paths may call it
    /// without tracking whether it already ran.
    async fn release(&self, reservation: &Reservation) -> Result<()>;

    /// Converts a hold into a permanent stock decrement. Called only
    /// once the owning order is durably finalized. Fails with
    /// [`StoreError::UnknownReservation`] if the hold is not active.
    async fn commit(&self, reservation: &Reservation) -> Result<()>;

    /// Reads the current record for a SKU.
    async fn record(&self, sku_id: &SkuId) -> Result<Option<InventoryRecord>>;
}

#[derive(Debug, Default)]
struct LedgerState {
    records: HashMap<SkuId, InventoryRecord>,
    active: HashMap<common::ReservationId, Reservation>,
}

/// In-memory inventory ledger.
///
/// Reservation runs an optimistic read-check-write cycle against the
/// record's version counter: the availability check is computed from a
/// snapshot, and the write only applies if no other reservation touched
/// the record in between; otherwise the cycle retries. This mirrors the
/// compare-and-set the PostgreSQL implementation gets from its
/// conditional UPDATE.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryInventoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the owned stock for a SKU, creating the record if needed.
    pub async fn set_stock(&self, sku_id: impl Into<SkuId>, quantity_owned: u32) {
        let sku_id = sku_id.into();
        let mut state = self.state.write().await;
        state
            .records
            .entry(sku_id.clone())
            .and_modify(|r| {
                r.quantity_owned = quantity_owned;
                r.version += 1;
            })
            .or_insert_with(|| InventoryRecord::new(sku_id, quantity_owned));
    }

    /// Returns the number of holds that are neither committed nor released.
    pub async fn active_reservation_count(&self) -> usize {
        self.state.read().await.active.len()
    }
}

#[async_trait]
impl InventoryLedger for InMemoryInventoryLedger {
    async fn reserve(&self, sku_id: &SkuId, quantity: u32) -> Result<Reservation> {
        loop {
            // Snapshot without holding the write lock.
            let seen = {
                let state = self.state.read().await;
                state
                    .records
                    .get(sku_id)
                    .map(|r| (r.available(), r.version))
            };

            let (available, seen_version) = match seen {
                Some(snapshot) => snapshot,
                None => return Err(StoreError::SkuNotFound(sku_id.to_string())),
            };

            if available < quantity {
                metrics::counter!("inventory_reserve_rejected").increment(1);
                return Err(StoreError::InsufficientStock {
                    sku_id: sku_id.to_string(),
                    requested: quantity,
                    available,
                });
            }

            let mut state = self.state.write().await;
            let record = state
                .records
                .get_mut(sku_id)
                .ok_or_else(|| StoreError::SkuNotFound(sku_id.to_string()))?;

            if record.version != seen_version {
                // Lost the race; re-run the read-check-write cycle.
                continue;
            }

            record.quantity_reserved += quantity;
            record.version += 1;

            let reservation = Reservation::new(sku_id.clone(), quantity);
            state.active.insert(reservation.id, reservation.clone());
            metrics::counter!("inventory_reserved").increment(1);
            return Ok(reservation);
        }
    }

    async fn release(&self, reservation: &Reservation) -> Result<()> {
        let mut state = self.state.write().await;
        if state.active.remove(&reservation.id).is_none() {
            // Already released or committed.
            return Ok(());
        }

        let record = state
            .records
            .get_mut(&reservation.sku_id)
            .ok_or_else(|| StoreError::SkuNotFound(reservation.sku_id.to_string()))?;
        record.quantity_reserved -= reservation.quantity;
        record.version += 1;
        metrics::counter!("inventory_released").increment(1);
        Ok(())
    }

    async fn commit(&self, reservation: &Reservation) -> Result<()> {
        let mut state = self.state.write().await;
        if state.active.remove(&reservation.id).is_none() {
            return Err(StoreError::UnknownReservation(reservation.id));
        }

        let record = state
            .records
            .get_mut(&reservation.sku_id)
            .ok_or_else(|| StoreError::SkuNotFound(reservation.sku_id.to_string()))?;
        record.quantity_owned -= reservation.quantity;
        record.quantity_reserved -= reservation.quantity;
        record.version += 1;
        metrics::counter!("inventory_committed").increment(1);
        Ok(())
    }

    async fn record(&self, sku_id: &SkuId) -> Result<Option<InventoryRecord>> {
        Ok(self.state.read().await.records.get(sku_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ledger_with(sku: &str, owned: u32) -> InMemoryInventoryLedger {
        let ledger = InMemoryInventoryLedger::new();
        ledger.set_stock(sku, owned).await;
        ledger
    }

    #[tokio::test]
    async fn reserve_holds_stock_without_decrementing_owned() {
        let ledger = ledger_with("SKU-001", 10).await;
        let sku = SkuId::new("SKU-001");

        let reservation = ledger.reserve(&sku, 3).await.unwrap();
        assert_eq!(reservation.quantity, 3);

        let record = ledger.record(&sku).await.unwrap().unwrap();
        assert_eq!(record.quantity_owned, 10);
        assert_eq!(record.quantity_reserved, 3);
        assert_eq!(record.available(), 7);
    }

    #[tokio::test]
    async fn release_restores_reserved_exactly() {
        let ledger = ledger_with("SKU-001", 10).await;
        let sku = SkuId::new("SKU-001");

        let before = ledger.record(&sku).await.unwrap().unwrap();
        let reservation = ledger.reserve(&sku, 4).await.unwrap();
        ledger.release(&reservation).await.unwrap();

        let after = ledger.record(&sku).await.unwrap().unwrap();
        assert_eq!(after.quantity_reserved, before.quantity_reserved);
        assert_eq!(after.quantity_owned, before.quantity_owned);
    }

    #[tokio::test]
    async fn release_is_idempotent_per_reservation() {
        let ledger = ledger_with("SKU-001", 10).await;
        let sku = SkuId::new("SKU-001");

        let reservation = ledger.reserve(&sku, 4).await.unwrap();
        ledger.release(&reservation).await.unwrap();
        ledger.release(&reservation).await.unwrap();

        let record = ledger.record(&sku).await.unwrap().unwrap();
        assert_eq!(record.quantity_reserved, 0);
    }

    #[tokio::test]
    async fn commit_decrements_owned_and_reserved() {
        let ledger = ledger_with("SKU-001", 10).await;
        let sku = SkuId::new("SKU-001");

        let reservation = ledger.reserve(&sku, 4).await.unwrap();
        ledger.commit(&reservation).await.unwrap();

        let record = ledger.record(&sku).await.unwrap().unwrap();
        assert_eq!(record.quantity_owned, 6);
        assert_eq!(record.quantity_reserved, 0);
    }

    #[tokio::test]
    async fn commit_twice_fails() {
        let ledger = ledger_with("SKU-001", 10).await;
        let sku = SkuId::new("SKU-001");

        let reservation = ledger.reserve(&sku, 2).await.unwrap();
        ledger.commit(&reservation).await.unwrap();

        let err = ledger.commit(&reservation).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownReservation(_)));

        let record = ledger.record(&sku).await.unwrap().unwrap();
        assert_eq!(record.quantity_owned, 8);
    }

    #[tokio::test]
    async fn release_after_commit_does_not_restore_stock() {
        let ledger = ledger_with("SKU-001", 10).await;
        let sku = SkuId::new("SKU-001");

        let reservation = ledger.reserve(&sku, 2).await.unwrap();
        ledger.commit(&reservation).await.unwrap();
        ledger.release(&reservation).await.unwrap();

        let record = ledger.record(&sku).await.unwrap().unwrap();
        assert_eq!(record.quantity_owned, 8);
        assert_eq!(record.quantity_reserved, 0);
    }

    #[tokio::test]
    async fn reserve_fails_once_stock_is_exhausted() {
        let ledger = ledger_with("SKU-001", 2).await;
        let sku = SkuId::new("SKU-001");

        ledger.reserve(&sku, 2).await.unwrap();
        let err = ledger.reserve(&sku, 1).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock {
                requested: 1,
                available: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn reserve_unknown_sku_fails() {
        let ledger = InMemoryInventoryLedger::new();
        let err = ledger.reserve(&SkuId::new("NOPE"), 1).await.unwrap_err();
        assert!(matches!(err, StoreError::SkuNotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_reservations_never_oversell() {
        const STOCK: u32 = 5;
        const CONTENDERS: usize = 40;

        let ledger = ledger_with("SKU-HOT", STOCK).await;
        let sku = SkuId::new("SKU-HOT");

        let mut handles = Vec::with_capacity(CONTENDERS);
        for _ in 0..CONTENDERS {
            let ledger = ledger.clone();
            let sku = sku.clone();
            handles.push(tokio::spawn(
                async move { ledger.reserve(&sku, 1).await },
            ));
        }

        let mut won = 0;
        let mut lost = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(StoreError::InsufficientStock { .. }) => lost += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(won, STOCK as usize);
        assert_eq!(lost, CONTENDERS - STOCK as usize);

        let record = ledger.record(&sku).await.unwrap().unwrap();
        assert_eq!(record.quantity_reserved, STOCK);
        assert_eq!(record.available(), 0);
        assert_eq!(ledger.active_reservation_count().await, STOCK as usize);
    }
}
