//! Carrier location taxonomy and fuzzy address matching.
//!
//! Customer-entered province/district/ward names rarely match the
//! carrier's canonical names exactly: they differ in diacritics
//! ("Quận 7" vs "Quan 7"), administrative prefixes ("Thành phố Hồ Chí
//! Minh" vs "Hồ Chí Minh"), and abbreviations ("TP. HCM"). Every name
//! is folded to a bare comparable form before matching, and a match on
//! the folded form, a containment either way, or a raw case-insensitive
//! containment counts as a hit.

use domain::Address;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// A province in the carrier's taxonomy.
#[derive(Debug, Clone)]
pub struct Province {
    pub id: i64,
    pub name: String,
    pub districts: Vec<District>,
}

/// A district in the carrier's taxonomy.
#[derive(Debug, Clone)]
pub struct District {
    pub id: i64,
    pub name: String,
    pub wards: Vec<Ward>,
}

/// A ward in the carrier's taxonomy.
#[derive(Debug, Clone)]
pub struct Ward {
    pub code: String,
    pub name: String,
}

/// Failure to place a customer address inside the carrier taxonomy.
/// Terminal for the checkout that hit it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("deliveries to province '{0}' are not supported")]
    ProvinceNotSupported(String),

    #[error("district '{0}' not found in the carrier's taxonomy")]
    DistrictNotFound(String),

    #[error("ward '{0}' not found in the carrier's taxonomy")]
    WardNotFound(String),
}

/// A destination expressed in the carrier's own identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub province_id: i64,
    pub district_id: i64,
    pub ward_code: String,
}

/// Administrative-unit words stripped before comparison, longest first
/// so "thi xa" goes before "xa".
const UNIT_WORDS: [&str; 12] = [
    "thanh pho", "thi tran", "thi xa", "tinh", "quan", "huyen", "phuong", "xa", "tp", "tx", "tt",
    "q",
];

/// Folds a location name to its comparable form: NFD-decomposed with
/// combining marks dropped, lowercased, administrative-unit words and
/// punctuation removed, whitespace collapsed.
pub fn fold_name(name: &str) -> String {
    let stripped: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'đ' => 'd',
            'Đ' => 'D',
            _ => c,
        })
        .collect::<String>()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    let tokens: Vec<&str> = stripped.split_whitespace().collect();
    let mut kept: Vec<&str> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let mut skipped = false;
        for unit in UNIT_WORDS {
            let unit_tokens: Vec<&str> = unit.split(' ').collect();
            if tokens[i..].starts_with(&unit_tokens[..]) {
                i += unit_tokens.len();
                skipped = true;
                break;
            }
        }
        if !skipped {
            kept.push(tokens[i]);
            i += 1;
        }
    }

    kept.join(" ")
}

fn names_match(customer: &str, canonical: &str) -> bool {
    let folded_customer = fold_name(customer);
    let folded_canonical = fold_name(canonical);

    if !folded_customer.is_empty()
        && (folded_customer == folded_canonical
            || folded_canonical.contains(&folded_customer)
            || folded_customer.contains(&folded_canonical))
    {
        return true;
    }

    // Fall back to raw case-insensitive containment either way.
    let raw_customer = customer.to_lowercase();
    let raw_canonical = canonical.to_lowercase();
    raw_canonical.contains(&raw_customer) || raw_customer.contains(&raw_canonical)
}

/// The carrier's location taxonomy, synced from the carrier and held in
/// memory for the matching pass that precedes every quote or shipment.
#[derive(Debug, Clone, Default)]
pub struct LocationDirectory {
    provinces: Vec<Province>,
}

impl LocationDirectory {
    /// Creates a directory over a synced province list.
    pub fn new(provinces: Vec<Province>) -> Self {
        Self { provinces }
    }

    /// Resolves a customer-entered address to carrier identifiers.
    /// Failure on any of the three levels is terminal for the checkout.
    pub fn resolve(&self, address: &Address) -> Result<ResolvedLocation, LocationError> {
        let province = self
            .provinces
            .iter()
            .find(|p| names_match(&address.province, &p.name))
            .ok_or_else(|| LocationError::ProvinceNotSupported(address.province.clone()))?;

        let district = province
            .districts
            .iter()
            .find(|d| names_match(&address.district, &d.name))
            .ok_or_else(|| LocationError::DistrictNotFound(address.district.clone()))?;

        let ward = district
            .wards
            .iter()
            .find(|w| names_match(&address.ward, &w.name))
            .ok_or_else(|| LocationError::WardNotFound(address.ward.clone()))?;

        Ok(ResolvedLocation {
            province_id: province.id,
            district_id: district.id,
            ward_code: ward.code.clone(),
        })
    }
}
