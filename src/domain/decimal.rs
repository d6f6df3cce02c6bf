//! Lossless decimal numeric type backed by rust_decimal.
//!
//! Provides canonical parsing from strings, formatting without exponent notation
//! and the half-up rounding used for realized profit rates.

use rust_decimal::{Decimal as RustDecimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lossless decimal numeric type for financial calculations.
///
/// Backed by rust_decimal to avoid floating-point drift.
/// Serializes to a JSON string so no precision is lost on the wire.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::str")] RustDecimal);

impl Decimal {
    /// Create a Decimal from a RustDecimal.
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse a Decimal from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s.trim()).map(Decimal)
    }

    /// Format the Decimal as a canonical string (no exponent notation, no trailing zeros).
    pub fn to_canonical_string(&self) -> String {
        let normalized = self.0.normalize();
        format!("{}", normalized)
    }

    /// Format with exactly `dp` fractional digits, e.g. `87.50`.
    pub fn to_fixed_string(&self, dp: u32) -> String {
        let mut value = self.round_half_up(dp).0;
        value.rescale(dp);
        format!("{}", value)
    }

    /// Round to `dp` decimal places, ties away from zero.
    ///
    /// `2.345 -> 2.35`, `-2.345 -> -2.35`.
    pub fn round_half_up(&self, dp: u32) -> Self {
        Decimal(
            self.0
                .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// `None` when the sum does not fit.
    pub fn checked_add(self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_add(rhs.0).map(Decimal)
    }

    pub fn checked_sub(self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_sub(rhs.0).map(Decimal)
    }

    pub fn checked_mul(self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_mul(rhs.0).map(Decimal)
    }

    /// `None` on overflow or a zero divisor.
    pub fn checked_div(self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_div(rhs.0).map(Decimal)
    }

    /// Get the underlying RustDecimal.
    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    /// The additive identity (0).
    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    /// Returns true if the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the value is > 0.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// Returns true if the value is < 0.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Returns the value 100.
    pub fn hundred() -> Self {
        Decimal(RustDecimal::ONE_HUNDRED)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_decimal_canonical_strips_trailing_zeros() {
        assert_eq!(d("16.000").to_canonical_string(), "16");
        assert_eq!(d("0.10").to_canonical_string(), "0.1");
        assert!(!d("123").to_canonical_string().contains('e'));
    }

    #[test]
    fn test_round_half_up_ties_go_away_from_zero() {
        assert_eq!(d("2.345").round_half_up(2), d("2.35"));
        assert_eq!(d("2.344").round_half_up(2), d("2.34"));
        assert_eq!(d("-2.345").round_half_up(2), d("-2.35"));
        assert_eq!(d("0.005").round_half_up(2), d("0.01"));
    }

    #[test]
    fn test_round_half_up_differs_from_bankers() {
        // Banker's rounding would give 0.12 here.
        assert_eq!(d("0.125").round_half_up(2), d("0.13"));
    }

    #[test]
    fn test_fixed_string_pads_to_scale() {
        assert_eq!(d("87.5").to_fixed_string(2), "87.50");
        assert_eq!(d("50").to_fixed_string(2), "50.00");
        assert_eq!(d("-33.3333").to_fixed_string(2), "-33.33");
    }

    #[test]
    fn test_decimal_arithmetic_is_exact() {
        let third = d("1") / d("3");
        let weighted = (d("10") * d("2") + d("20") * d("3")) / d("5");
        assert_eq!(weighted, d("16"));
        assert_eq!(d("0.1") + d("0.2"), d("0.3"));
        assert!(third * d("3") <= d("1"));
    }

    #[test]
    fn test_decimal_json_is_string() {
        let json = serde_json::to_value(d("123.456")).unwrap();
        assert_eq!(json, serde_json::json!("123.456"));
        let back: Decimal = serde_json::from_value(json).unwrap();
        assert_eq!(back, d("123.456"));
    }

    #[test]
    fn test_sign_predicates() {
        assert!(d("0.00000001").is_positive());
        assert!(!Decimal::zero().is_positive());
        assert!(!Decimal::zero().is_negative());
        assert!(d("-1").is_negative());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Decimal::from_str_canonical("abc").is_err());
        assert!(Decimal::from_str_canonical("").is_err());
    }

    #[test]
    fn test_checked_ops_report_overflow() {
        let big = d("100000000000000000000");
        assert_eq!(big.checked_mul(d("10000000000")), None);
        assert_eq!(d("1").checked_div(Decimal::zero()), None);
        assert_eq!(d("2").checked_mul(d("3")), Some(d("6")));
        assert_eq!(d("7").checked_sub(d("2")), Some(d("5")));
        assert_eq!(
            d("79228162514264337593543950335").checked_add(d("1")),
            None
        );
    }
}
