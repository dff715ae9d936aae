//! Carrier gateway: fee quoting and shipment placement.
//!
//! An external capability consumed, not owned, by the saga. Responses
//! are validated into typed results at this boundary; nothing deeper in
//! the saga ever sees a free-form payload.

pub mod location;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use domain::{CatalogEntry, Money};
use thiserror::Error;
use tokio::sync::RwLock;

use location::ResolvedLocation;

/// Fallback measurements when the catalog has none for an item.
const DEFAULT_ITEM_WEIGHT_GRAMS: u32 = 200;
const DEFAULT_ITEM_DIMENSION_CM: u32 = 10;

/// Errors from the carrier boundary.
#[derive(Debug, Error)]
pub enum CarrierError {
    /// The carrier answered and said no.
    #[error("carrier rejected the request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// The carrier could not be reached or answered garbage.
    #[error("carrier transport failure: {0}")]
    Transport(String),
}

/// Where a shipment goes, in carrier identifiers plus contact details.
#[derive(Debug, Clone)]
pub struct Destination {
    pub location: ResolvedLocation,
    pub contact_name: String,
    pub contact_phone: String,
    /// Full street address on one line.
    pub address_line: String,
}

/// Physical parcel derived from the order's items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parcel {
    pub weight_grams: u32,
    pub length_cm: u32,
    pub width_cm: u32,
    pub height_cm: u32,
}

impl Parcel {
    /// Derives a parcel from catalog entries and quantities: weight is
    /// the quantity-weighted sum, dimensions the quantity-weighted mean
    /// rounded up, with per-item defaults where the catalog has no
    /// measurements.
    pub fn from_items(items: &[(CatalogEntry, u32)]) -> Self {
        let total_quantity: u32 = items.iter().map(|(_, qty)| *qty).sum();
        if total_quantity == 0 {
            return Self {
                weight_grams: DEFAULT_ITEM_WEIGHT_GRAMS,
                length_cm: DEFAULT_ITEM_DIMENSION_CM,
                width_cm: DEFAULT_ITEM_DIMENSION_CM,
                height_cm: DEFAULT_ITEM_DIMENSION_CM,
            };
        }

        let or_default = |value: u32, default: u32| if value == 0 { default } else { value };

        let mut weight: u64 = 0;
        let mut length: u64 = 0;
        let mut width: u64 = 0;
        let mut height: u64 = 0;
        for (entry, qty) in items {
            let qty = u64::from(*qty);
            weight += u64::from(or_default(entry.weight_grams, DEFAULT_ITEM_WEIGHT_GRAMS)) * qty;
            length += u64::from(or_default(entry.length_cm, DEFAULT_ITEM_DIMENSION_CM)) * qty;
            width += u64::from(or_default(entry.width_cm, DEFAULT_ITEM_DIMENSION_CM)) * qty;
            height += u64::from(or_default(entry.height_cm, DEFAULT_ITEM_DIMENSION_CM)) * qty;
        }

        let mean_ceil = |sum: u64| sum.div_ceil(u64::from(total_quantity)) as u32;
        Self {
            weight_grams: weight as u32,
            length_cm: mean_ceil(length),
            width_cm: mean_ceil(width),
            height_cm: mean_ceil(height),
        }
    }
}

/// One manifest line sent with a shipment.
#[derive(Debug, Clone)]
pub struct ShipmentItem {
    pub sku_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// A successfully placed shipment.
#[derive(Debug, Clone)]
pub struct ShipmentRef {
    /// The carrier's reference for the shipment.
    pub reference: String,
    pub fee: Money,
    pub eta: Option<DateTime<Utc>>,
}

/// The carrier's two operations, both external-network and
/// non-transactional.
#[async_trait]
pub trait CarrierGateway: Send + Sync {
    /// Quotes the delivery fee without placing anything. Used by
    /// redirect-payment flows, where the shipment waits for payment
    /// confirmation.
    async fn quote_fee(
        &self,
        destination: &Destination,
        parcel: &Parcel,
        insurance_value: Money,
    ) -> Result<Money, CarrierError>;

    /// Places a shipment. `cod_amount` is what the carrier collects on
    /// delivery; zero for prepaid orders.
    async fn place_shipment(
        &self,
        destination: &Destination,
        parcel: &Parcel,
        items: &[ShipmentItem],
        cod_amount: Money,
    ) -> Result<ShipmentRef, CarrierError>;
}

/// A shipment recorded by the in-memory gateway.
#[derive(Debug, Clone)]
pub struct PlacedShipment {
    pub reference: String,
    pub cod_amount: Money,
    pub ward_code: String,
}

#[derive(Debug)]
struct InMemoryCarrierState {
    shipments: Vec<PlacedShipment>,
    next_id: u32,
    base_fee: Money,
    fail_on_quote: bool,
    fail_on_place: bool,
}

impl Default for InMemoryCarrierState {
    fn default() -> Self {
        Self {
            shipments: Vec::new(),
            next_id: 0,
            base_fee: Money::new(30_000),
            fail_on_quote: false,
            fail_on_place: false,
        }
    }
}

/// In-memory carrier gateway for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCarrierGateway {
    state: Arc<RwLock<InMemoryCarrierState>>,
}

impl InMemoryCarrierGateway {
    /// Creates a gateway with the default flat fee.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the flat fee returned by quotes and shipments.
    pub async fn set_base_fee(&self, fee: Money) {
        self.state.write().await.base_fee = fee;
    }

    /// Configures the gateway to reject the next quote calls.
    pub async fn set_fail_on_quote(&self, fail: bool) {
        self.state.write().await.fail_on_quote = fail;
    }

    /// Configures the gateway to reject the next place calls.
    pub async fn set_fail_on_place(&self, fail: bool) {
        self.state.write().await.fail_on_place = fail;
    }

    /// Returns the number of shipments placed.
    pub async fn shipment_count(&self) -> usize {
        self.state.read().await.shipments.len()
    }

    /// Returns the recorded shipments.
    pub async fn shipments(&self) -> Vec<PlacedShipment> {
        self.state.read().await.shipments.clone()
    }
}

#[async_trait]
impl CarrierGateway for InMemoryCarrierGateway {
    async fn quote_fee(
        &self,
        _destination: &Destination,
        _parcel: &Parcel,
        _insurance_value: Money,
    ) -> Result<Money, CarrierError> {
        let state = self.state.read().await;
        if state.fail_on_quote {
            return Err(CarrierError::Rejected {
                code: 400,
                message: "route not serviceable".to_string(),
            });
        }
        Ok(state.base_fee)
    }

    async fn place_shipment(
        &self,
        destination: &Destination,
        _parcel: &Parcel,
        _items: &[ShipmentItem],
        cod_amount: Money,
    ) -> Result<ShipmentRef, CarrierError> {
        let mut state = self.state.write().await;
        if state.fail_on_place {
            return Err(CarrierError::Rejected {
                code: 400,
                message: "pickup window unavailable".to_string(),
            });
        }

        state.next_id += 1;
        let reference = format!("SHIP-{:04}", state.next_id);
        state.shipments.push(PlacedShipment {
            reference: reference.clone(),
            cod_amount,
            ward_code: destination.location.ward_code.clone(),
        });

        Ok(ShipmentRef {
            reference,
            fee: state.base_fee,
            eta: Some(Utc::now() + Duration::days(3)),
        })
    }
}
