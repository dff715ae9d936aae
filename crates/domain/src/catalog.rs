//! Catalog read model.
//!
//! Catalog CRUD belongs to the catalog collaborator; checkout only reads
//! the live price and the physical measurements needed to build a parcel.

use serde::{Deserialize, Serialize};

use crate::value_objects::{Money, SkuId};

/// The slice of a sellable variant that checkout needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub sku_id: SkuId,
    pub name: String,
    pub unit_price: Money,
    /// Physical measurements for carrier parcel derivation. Zero means
    /// "not measured"; the carrier gateway substitutes its defaults.
    pub weight_grams: u32,
    pub length_cm: u32,
    pub width_cm: u32,
    pub height_cm: u32,
    /// Inactive variants cannot be checked out.
    pub active: bool,
}

impl CatalogEntry {
    /// Creates an active entry with price only; measurements default to
    /// zero and fall back to carrier defaults.
    pub fn priced(sku_id: impl Into<SkuId>, name: impl Into<String>, unit_price: Money) -> Self {
        Self {
            sku_id: sku_id.into(),
            name: name.into(),
            unit_price,
            weight_grams: 0,
            length_cm: 0,
            width_cm: 0,
            height_cm: 0,
            active: true,
        }
    }

    /// Sets the physical measurements.
    pub fn with_measurements(mut self, weight_grams: u32, length: u32, width: u32, height: u32) -> Self {
        self.weight_grams = weight_grams;
        self.length_cm = length;
        self.width_cm = width;
        self.height_cm = height;
        self
    }
}
