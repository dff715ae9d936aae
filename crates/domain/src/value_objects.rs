//! Value objects shared across the storefront domain.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Stock-keeping unit identifier for a sellable variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkuId(String);

impl SkuId {
    /// Creates a new SKU identifier from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the SKU as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SkuId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SkuId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SkuId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for SkuId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Money amount in whole currency units.
///
/// The storefront prices everything in a zero-decimal currency, so the
/// amount is an integer and no fractional arithmetic ever occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: i64,
}

impl Money {
    /// Creates a new amount.
    pub fn new(amount: i64) -> Self {
        Self { amount }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { amount: 0 }
    }

    /// Returns the raw amount.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Returns true if the amount is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.amount > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.amount < 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            amount: self.amount * i64::from(quantity),
        }
    }

    /// Subtracts, clamping at zero.
    ///
    /// Discounts never drive a payable total below zero.
    pub fn saturating_sub(&self, other: Money) -> Money {
        Money {
            amount: (self.amount - other.amount).max(0),
        }
    }

    /// Divides by `divisor`, rounding up.
    pub fn div_ceil(&self, divisor: i64) -> i64 {
        debug_assert!(divisor > 0);
        // Equivalent to the (still-unstable for signed ints) `i64::div_ceil`.
        let q = self.amount / divisor;
        let r = self.amount % divisor;
        if r != 0 && ((r > 0) == (divisor > 0)) {
            q + 1
        } else {
            q
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.amount)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            amount: self.amount + rhs.amount,
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            amount: self.amount - rhs.amount,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.amount += rhs.amount;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.amount -= rhs.amount;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Human-facing order code, e.g. `ORD1716899000123`.
///
/// This is the reference customers see and the one echoed back by the
/// payment gateway in its return callback, distinct from the internal
/// order UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderCode(String);

impl OrderCode {
    /// Generates a fresh order code from the current timestamp.
    pub fn generate() -> Self {
        Self(format!("ORD{}", Utc::now().timestamp_millis()))
    }

    /// Wraps an existing code, e.g. one echoed back by the payment gateway.
    pub fn from_string(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for OrderCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
