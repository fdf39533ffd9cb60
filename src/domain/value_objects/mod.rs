//! Value Objects for E-commerce

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::{EcommerceError, Result};

/// Partial-update field: either untouched or replaced with a value.
///
/// Nullable columns use `Patch<Option<T>>`, so `Present(None)` clears them.
/// With `#[serde(default)]` a missing JSON key stays `Absent` while an
/// explicit `null` becomes `Present(None)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Absent,
    Present(T),
}

impl<T> Patch<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }

    pub fn as_ref(&self) -> Patch<&T> {
        match self {
            Patch::Absent => Patch::Absent,
            Patch::Present(v) => Patch::Present(v),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Patch::Absent => None,
            Patch::Present(v) => Some(v),
        }
    }

    /// Writes the value into `target` when present.
    pub fn apply_to(self, target: &mut T) {
        if let Patch::Present(v) = self {
            *target = v;
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        T::deserialize(deserializer).map(Patch::Present)
    }
}

/// Requested unit count, always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Result<Self> {
        if value == 0 {
            return Err(EcommerceError::validation("Quantity must be at least 1"));
        }
        if i32::try_from(value).is_err() {
            return Err(EcommerceError::validation("Quantity is too large"));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Column representation; construction guarantees it fits.
    pub fn as_i32(&self) -> i32 {
        self.0 as i32
    }

    pub fn checked_add(&self, other: Quantity) -> Result<Quantity> {
        self.0
            .checked_add(other.0)
            .ok_or_else(|| EcommerceError::validation("Quantity is too large"))
            .and_then(Quantity::new)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lower-case ISO 4217 code as the payment provider expects it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim().to_lowercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(EcommerceError::validation(format!("Invalid currency code: {code}")));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Currencies the provider charges in whole units.
const ZERO_DECIMAL: &[&str] = &[
    "bif", "clp", "djf", "gnf", "jpy", "kmf", "krw", "mga", "pyg", "rwf", "ugx", "vnd", "vuv",
    "xaf", "xof", "xpf",
];
const THREE_DECIMAL: &[&str] = &["bhd", "jod", "kwd", "omr", "tnd"];

impl Currency {
    /// Decimal places of the currency's minor unit.
    pub fn exponent(&self) -> u32 {
        if ZERO_DECIMAL.contains(&self.as_str()) {
            0
        } else if THREE_DECIMAL.contains(&self.as_str()) {
            3
        } else {
            2
        }
    }

    /// Amount in the currency's minor unit. Amounts finer than the minor
    /// unit cannot be charged and are rejected.
    pub fn to_minor_units(&self, amount: Decimal) -> Result<i64> {
        let exponent = self.exponent();
        if amount.round_dp_with_strategy(exponent, RoundingStrategy::MidpointAwayFromZero) != amount {
            return Err(EcommerceError::validation(format!(
                "Amount {amount} is finer than the minor unit of {self}"
            )));
        }
        amount
            .checked_mul(Decimal::from(10_i64.pow(exponent)))
            .and_then(|minor| minor.to_i64())
            .ok_or_else(|| EcommerceError::validation("Amount out of range"))
    }

    pub fn from_minor_units(&self, minor: i64) -> Decimal {
        Decimal::new(minor, self.exponent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Form {
        #[serde(default)]
        name: Patch<String>,
        #[serde(default)]
        category_id: Patch<Option<u32>>,
    }

    #[test]
    fn test_patch_distinguishes_null_from_missing() {
        let f: Form = serde_json::from_str(r#"{"category_id": null}"#).unwrap();
        assert_eq!(f.name, Patch::Absent);
        assert_eq!(f.category_id, Patch::Present(None));
        let f: Form = serde_json::from_str(r#"{"name": "Ramen", "category_id": 4}"#).unwrap();
        assert_eq!(f.name, Patch::Present("Ramen".to_string()));
        assert_eq!(f.category_id, Patch::Present(Some(4)));
    }

    #[test]
    fn test_quantity_bounds() {
        assert!(Quantity::new(0).is_err());
        assert!(Quantity::new(u32::MAX).is_err());
        let q = Quantity::new(2).unwrap().checked_add(Quantity::new(3).unwrap()).unwrap();
        assert_eq!(q.value(), 5);
    }

    #[test]
    fn test_currency() {
        assert_eq!(Currency::new(" USD ").unwrap().as_str(), "usd");
        assert!(Currency::new("us").is_err());
    }

    #[test]
    fn test_minor_units_follow_currency_exponent() {
        let usd = Currency::new("usd").unwrap();
        assert_eq!(usd.exponent(), 2);
        assert_eq!(usd.to_minor_units(Decimal::new(3200, 2)).unwrap(), 3200);
        assert_eq!(usd.to_minor_units(Decimal::new(32, 0)).unwrap(), 3200);
        assert_eq!(usd.from_minor_units(3200), Decimal::new(32, 0));

        let jpy = Currency::new("JPY").unwrap();
        assert_eq!(jpy.exponent(), 0);
        assert_eq!(jpy.to_minor_units(Decimal::new(1000, 0)).unwrap(), 1000);
        assert_eq!(jpy.to_minor_units(Decimal::new(100000, 2)).unwrap(), 1000);
        assert_eq!(jpy.from_minor_units(1000), Decimal::new(1000, 0));

        let kwd = Currency::new("kwd").unwrap();
        assert_eq!(kwd.to_minor_units(Decimal::new(1250, 3)).unwrap(), 1250);
        assert_eq!(kwd.from_minor_units(1250), Decimal::new(1250, 3));
    }

    #[test]
    fn test_minor_units_reject_sub_unit_amounts() {
        let jpy = Currency::new("jpy").unwrap();
        assert!(jpy.to_minor_units(Decimal::new(1050, 2)).is_err());
        let usd = Currency::new("usd").unwrap();
        assert!(usd.to_minor_units(Decimal::new(10005, 3)).is_err());
    }

    #[test]
    fn test_minor_units_round_trip() {
        for code in ["usd", "jpy", "krw", "bhd", "eur"] {
            let currency = Currency::new(code).unwrap();
            let amount = currency.from_minor_units(123_456);
            assert_eq!(currency.to_minor_units(amount).unwrap(), 123_456, "{code}");
        }
    }
}
