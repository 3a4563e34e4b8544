//! Shipping addresses.

use serde::{Deserialize, Serialize};

/// Errors raised while validating a [`ShippingAddress`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Please provide {0}")]
    MissingField(&'static str),
    #[error("Pincode must be 6 digits")]
    InvalidPincode,
}

/// A six digit postal code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pincode(String);

impl Pincode {
    /// # Errors
    ///
    /// Returns [`AddressError::InvalidPincode`] unless `s` (trimmed) is exactly
    /// six ASCII digits.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        if s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_owned()))
        } else {
            Err(AddressError::InvalidPincode)
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Pincode {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Pincode> for String {
    fn from(pincode: Pincode) -> Self {
        pincode.0
    }
}

impl std::fmt::Display for Pincode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an order ships to. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub pincode: Pincode,
}

impl ShippingAddress {
    /// Build an address from loosely-typed input, trimming each field.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::MissingField`] for the first blank field, or
    /// [`AddressError::InvalidPincode`].
    pub fn new(street: &str, city: &str, state: &str, pincode: &str) -> Result<Self, AddressError> {
        let required = |value: &str, name: &'static str| {
            let value = value.trim();
            if value.is_empty() {
                Err(AddressError::MissingField(name))
            } else {
                Ok(value.to_owned())
            }
        };

        Ok(Self {
            street: required(street, "street")?,
            city: required(city, "city")?,
            state: required(state, "state")?,
            pincode: Pincode::parse(&required(pincode, "pincode")?)?,
        })
    }
}
