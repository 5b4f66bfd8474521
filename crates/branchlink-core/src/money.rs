//! # Money Module
//!
//! Provides the `Money` type used for per-piece prices in sync-status
//! records.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE DRIFT-DETECTION PROBLEM                                            │
//! │                                                                         │
//! │  Head office says:   price_per_piece = "12.50"                          │
//! │  Branch says:        price_per_piece = 12.5                             │
//! │                                                                         │
//! │  Compared as floats or raw strings these can disagree even though      │
//! │  they are the same price. Parsed into integer millionths both are      │
//! │  12_500_000, so equality is exact and drift is never a rounding        │
//! │  artefact. Sub-cent prices ("12.345") keep their full precision.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! The APIs send decimal amounts either as JSON strings (`"12.50"`) or JSON
//! numbers (`12.5`). Both deserialize to the same `Money`. Serialization
//! produces a decimal string with at least two fractional digits.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use crate::error::ValidationError;

/// Fractional digits held exactly.
pub const MONEY_SCALE: usize = 6;

const UNITS_PER_WHOLE: i64 = 1_000_000;
const UNITS_PER_CENT: i64 = 10_000;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in millionths of the currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: price corrections can be negative deltas
/// - **Six fractional digits**: per-piece prices of bulk goods carry
///   sub-cent precision; anything finer is rounded half away from zero
/// - **Custom serde**: accepts the decimal strings the REST APIs emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from whole cents.
    ///
    /// ## Example
    /// ```rust
    /// use branchlink_core::money::Money;
    ///
    /// let price = Money::from_cents(1250);
    /// assert_eq!(price.cents(), 1250);
    /// assert_eq!(price.to_string(), "12.50");
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents.saturating_mul(UNITS_PER_CENT))
    }

    /// Creates a Money value from millionths.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Money(units)
    }

    /// Whole cents, truncated toward zero.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0 / UNITS_PER_CENT
    }

    /// Exact value in millionths.
    #[inline]
    pub const fn units(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.saturating_abs())
    }

    /// `self - other`, or `None` on overflow.
    #[inline]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// `self + other`, or `None` on overflow.
    #[inline]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Parses a decimal amount such as `"12.50"`, `"-3"`, `"0.5"` or
    /// `"12.345"`.
    ///
    /// Up to six fractional digits are kept exactly; further digits are
    /// rounded half away from zero.
    ///
    /// ## Example
    /// ```rust
    /// use branchlink_core::money::Money;
    ///
    /// assert_eq!(Money::parse_decimal("12.5").unwrap().cents(), 1250);
    /// assert_eq!(Money::parse_decimal("-0.05").unwrap().cents(), -5);
    /// assert_eq!(Money::parse_decimal("12.345").unwrap().units(), 12_345_000);
    /// ```
    pub fn parse_decimal(input: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: format!("'{}': {}", input, reason),
        };

        let trimmed = input.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (whole, frac) = match body.split_once('.') {
            Some((w, f)) => (w, f),
            None => (body, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("empty amount"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid("not a decimal number"));
        }

        let whole_value: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("amount too large"))?
        };

        let digits = frac.as_bytes();
        let mut frac_value: i64 = 0;
        for i in 0..MONEY_SCALE {
            let d = digits.get(i).map_or(0, |b| i64::from(b - b'0'));
            frac_value = frac_value * 10 + d;
        }
        if digits.get(MONEY_SCALE).is_some_and(|b| *b >= b'5') {
            frac_value += 1;
        }

        let units = whole_value
            .checked_mul(UNITS_PER_WHOLE)
            .and_then(|u| u.checked_add(frac_value))
            .ok_or_else(|| invalid("amount too large"))?;

        Ok(Money(if negative { -units } else { units }))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Displays as a plain decimal amount with at least two fractional digits
/// ("12.50", "-0.05", "12.345").
///
/// No currency symbol: the currency is a site setting the core never reads.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per_whole = UNITS_PER_WHOLE as u64;

        let frac = format!("{:06}", abs % per_whole);
        let frac = frac.trim_end_matches('0');
        write!(f, "{}{}.{:0<2}", sign, abs / per_whole, frac)
    }
}

impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse_decimal(s)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MoneyVisitor;

        impl<'de> Visitor<'de> for MoneyVisitor {
            type Value = Money;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal amount as a string or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
                Money::parse_decimal(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
                v.checked_mul(UNITS_PER_WHOLE)
                    .map(Money)
                    .ok_or_else(|| E::custom("amount too large"))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
                i64::try_from(v)
                    .ok()
                    .and_then(|v| v.checked_mul(UNITS_PER_WHOLE))
                    .map(Money)
                    .ok_or_else(|| E::custom("amount too large"))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
                // Route through the shortest round-trip representation so
                // 12.5 is read as "12.5", not as 12.4999...
                Money::parse_decimal(&v.to_string()).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(MoneyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(Money::parse_decimal("12.50").unwrap().cents(), 1250);
        assert_eq!(Money::parse_decimal("12.5").unwrap().cents(), 1250);
        assert_eq!(Money::parse_decimal("12").unwrap().cents(), 1200);
        assert_eq!(Money::parse_decimal(".75").unwrap().cents(), 75);
        assert_eq!(Money::parse_decimal("-0.05").unwrap().cents(), -5);
        assert_eq!(Money::parse_decimal("12.500").unwrap().cents(), 1250);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Money::parse_decimal("").is_err());
        assert!(Money::parse_decimal("abc").is_err());
        assert!(Money::parse_decimal("1.2.3").is_err());
        assert!(Money::parse_decimal("1e3").is_err());
    }

    #[test]
    fn test_sub_cent_precision_is_kept() {
        let price = Money::parse_decimal("12.345").unwrap();
        assert_eq!(price.units(), 12_345_000);
        assert_eq!(price.cents(), 1234);
        assert_ne!(price, Money::parse_decimal("12.34").unwrap());
        assert_eq!(price, Money::parse_decimal("12.3450").unwrap());
        assert_eq!(price.to_string(), "12.345");

        let from_float: Money = serde_json::from_str("12.345").unwrap();
        assert_eq!(from_float, price);
    }

    #[test]
    fn test_digits_beyond_scale_round() {
        assert_eq!(Money::parse_decimal("0.0000004").unwrap().units(), 0);
        assert_eq!(Money::parse_decimal("0.0000005").unwrap().units(), 1);
        assert_eq!(Money::parse_decimal("-1.0000015").unwrap().units(), -1_000_002);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1250).to_string(), "12.50");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Money::zero().to_string(), "0.00");
        assert_eq!(Money::from_units(12_345_600).to_string(), "12.3456");
    }

    #[test]
    fn test_string_and_number_deserialize_equal() {
        let from_str: Money = serde_json::from_str("\"12.50\"").unwrap();
        let from_float: Money = serde_json::from_str("12.5").unwrap();
        let from_int: Money = serde_json::from_str("12").unwrap();
        assert_eq!(from_str, from_float);
        assert_eq!(from_int.cents(), 1200);
    }

    #[test]
    fn test_serializes_as_decimal_string() {
        let json = serde_json::to_string(&Money::from_cents(1999)).unwrap();
        assert_eq!(json, "\"19.99\"");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1250);
        let b = Money::from_cents(1100);
        assert_eq!((a - b).cents(), 150);
        assert_eq!((b - a).abs().cents(), 150);
        assert_eq!((a + b).cents(), 2350);

        assert_eq!(a.checked_sub(b), Some(Money::from_cents(150)));
        assert_eq!(Money::from_units(i64::MIN).checked_sub(a), None);
        assert_eq!(Money::from_units(i64::MAX).checked_add(a), None);
    }
}
