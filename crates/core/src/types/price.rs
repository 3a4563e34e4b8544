//! Non-negative monetary amounts.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Price`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price cannot be negative")]
    Negative,
}

/// A price in the store currency, always non-negative and rounded to cents.
///
/// ```
/// use booknest_core::Price;
/// use rust_decimal::Decimal;
///
/// let price = Price::new(Decimal::new(19_995, 3)).unwrap();
/// assert_eq!(price.to_string(), "$20.00");
/// assert!(Price::new(Decimal::NEGATIVE_ONE).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// A zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price, rounding half away from zero to two decimal places.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] if `amount` is below zero.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        Ok(Self(
            amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        ))
    }

    /// The underlying amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// `self * quantity`, used for order line totals.
    #[must_use]
    pub fn times(&self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl std::iter::Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|p| p.0).sum())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_price_rounds_to_cents() {
        let price = Price::new(Decimal::new(12_345, 3)).unwrap();
        assert_eq!(price.amount(), Decimal::new(1235, 2));
    }

    #[test]
    fn test_price_rejects_negative() {
        assert_eq!(Price::new(Decimal::new(-1, 2)), Err(PriceError::Negative));
        assert!(Price::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_price_display() {
        assert_eq!(Price::new(Decimal::new(5, 0)).unwrap().to_string(), "$5.00");
        assert_eq!(Price::ZERO.to_string(), "$0.00");
    }

    #[test]
    fn test_price_times_and_sum() {
        let a = Price::new(Decimal::new(1250, 2)).unwrap();
        let b = Price::new(Decimal::new(399, 2)).unwrap();
        let total: Price = [a.times(2), b.times(3)].into_iter().sum();
        assert_eq!(total.amount(), Decimal::new(3697, 2));
    }

    #[test]
    fn test_price_deserialize_validates() {
        let price: Price = serde_json::from_str("\"9.99\"").unwrap();
        assert_eq!(price.to_string(), "$9.99");
        assert!(serde_json::from_str::<Price>("\"-3\"").is_err());
    }
}
