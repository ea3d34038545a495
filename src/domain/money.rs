use crate::error::{PaymentError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currencies the gateway bills in whole units (no fractional subunit).
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

/// An ISO 4217 currency code, always stored upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim().to_ascii_uppercase();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code))
        } else {
            Err(PaymentError::ValidationError(format!(
                "invalid currency code '{code}'"
            )))
        }
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    pub fn is_zero_decimal(&self) -> bool {
        ZERO_DECIMAL_CURRENCIES.contains(&self.0.as_str())
    }

    /// Number of decimal places in the major unit.
    pub fn exponent(&self) -> u32 {
        if self.is_zero_decimal() { 0 } else { 2 }
    }
}

impl TryFrom<String> for Currency {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Converts a major-unit amount into the gateway's smallest unit.
///
/// Zero-decimal currencies are passed through unscaled; every other currency
/// is multiplied by 100. Rounds to nearest, midpoint away from zero.
pub fn to_minor_units(amount: Decimal, currency: &Currency) -> Result<i64> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(PaymentError::ValidationError(
            "amount must not be negative".to_string(),
        ));
    }
    let factor = Decimal::from(10_i64.pow(currency.exponent()));
    let out_of_range =
        || PaymentError::ValidationError(format!("amount {amount} {currency} is out of range"));
    let scaled = amount
        .checked_mul(factor)
        .ok_or_else(out_of_range)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    scaled.to_i64().ok_or_else(out_of_range)
}

/// Inverse of [`to_minor_units`].
pub fn from_minor_units(minor: i64, currency: &Currency) -> Decimal {
    Decimal::new(minor, currency.exponent())
}
