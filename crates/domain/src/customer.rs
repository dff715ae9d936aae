//! Customers, including provisional guest accounts, and their addresses.

use common::CustomerId;
use serde::{Deserialize, Serialize};

/// A customer identity. `is_active` is false for a provisional guest
/// account created mid-checkout; it flips to true once the guest's
/// first order is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub email: String,
    pub full_name: String,
    pub phone_number: String,
    pub loyalty_points: u32,
    pub is_active: bool,
}

impl Customer {
    /// Creates an inactive guest customer for a first-time checkout.
    pub fn guest(
        email: impl Into<String>,
        full_name: impl Into<String>,
        phone_number: impl Into<String>,
    ) -> Self {
        Self {
            id: CustomerId::new(),
            email: email.into(),
            full_name: full_name.into(),
            phone_number: phone_number.into(),
            loyalty_points: 0,
            is_active: false,
        }
    }
}

/// A delivery destination as the customer typed it. The names rarely
/// match the carrier's canonical location taxonomy exactly; the carrier
/// gateway fuzzy-matches them before any carrier call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub province: String,
    pub district: String,
    pub ward: String,
    /// Street-level detail (house number, street).
    pub detail: String,
}

impl Address {
    /// Returns the full address on one line, most specific part first.
    pub fn to_single_line(&self) -> String {
        format!(
            "{}, {}, {}, {}",
            self.detail, self.ward, self.district, self.province
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_customers_start_inactive_with_no_points() {
        let guest = Customer::guest("a@example.com", "An Nguyen", "0935000111");
        assert!(!guest.is_active);
        assert_eq!(guest.loyalty_points, 0);
    }

    #[test]
    fn single_line_address_is_detail_first() {
        let addr = Address {
            province: "Thanh pho Ho Chi Minh".into(),
            district: "Quan 7".into(),
            ward: "Phuong Tan Phong".into(),
            detail: "19 Nguyen Huu Tho".into(),
        };
        assert_eq!(
            addr.to_single_line(),
            "19 Nguyen Huu Tho, Phuong Tan Phong, Quan 7, Thanh pho Ho Chi Minh"
        );
    }
}
