//! Value objects shared by the storefront aggregates.

use serde::{Deserialize, Serialize};

/// Identifier of a storefront user, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Product identifier (SKU).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Money amount in minor currency units (paise) to avoid floating point issues.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new amount from minor units.
    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Creates a new amount from whole rupees.
    pub fn from_major(major: i64) -> Self {
        Self(major.saturating_mul(100))
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub fn minor(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Multiplies by a quantity. None on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    /// Adds two amounts. None on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}₹{}.{:02}", abs / 100, abs % 100)
    }
}

/// Delivery address captured on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub phone: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postcode: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "India".to_string()
}

impl ShippingAddress {
    /// Checks the fields a carrier needs to deliver.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("name", &self.name),
            ("phone", &self.phone),
            ("line1", &self.line1),
            ("city", &self.city),
            ("state", &self.state),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(format!("{field} must not be empty"));
            }
        }
        if self.postcode.len() != 6 || !self.postcode.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("postcode {:?} must be six digits", self.postcode));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_address() -> ShippingAddress {
    ShippingAddress {
        name: "Asha Verma".to_string(),
        phone: "9876543210".to_string(),
        line1: "12 MG Road".to_string(),
        line2: None,
        city: "Bengaluru".to_string(),
        state: "Karnataka".to_string(),
        postcode: "560001".to_string(),
        country: "India".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_id_string_conversion() {
        let id = ProductId::new("ASHWA-100");
        assert_eq!(id.as_str(), "ASHWA-100");

        let id2: ProductId = "TULSI-50".into();
        assert_eq!(id2.as_str(), "TULSI-50");
    }

    #[test]
    fn money_display() {
        assert_eq!(Money::from_minor(1234).to_string(), "₹12.34");
        assert_eq!(Money::from_major(1).to_string(), "₹1.00");
        assert_eq!(Money::from_minor(5).to_string(), "₹0.05");
        assert_eq!(Money::from_minor(-1234).to_string(), "-₹12.34");
    }

    #[test]
    fn money_arithmetic() {
        let a = Money::from_minor(1000);
        let b = Money::from_minor(500);

        assert_eq!(a.checked_add(b), Some(Money::from_minor(1500)));
        assert_eq!(a.checked_multiply(3), Some(Money::from_minor(3000)));
        assert_eq!(Money::from_minor(i64::MAX).checked_add(b), None);
        assert_eq!(Money::from_minor(i64::MAX / 2).checked_multiply(3), None);
    }

    #[test]
    fn money_serializes_as_plain_integer() {
        assert_eq!(serde_json::to_string(&Money::from_minor(250)).unwrap(), "250");
    }

    #[test]
    fn address_validation() {
        assert!(test_address().validate().is_ok());

        let mut bad = test_address();
        bad.postcode = "5600".to_string();
        assert!(bad.validate().unwrap_err().contains("postcode"));

        let mut blank = test_address();
        blank.city = "  ".to_string();
        assert!(blank.validate().unwrap_err().contains("city"));
    }
}
