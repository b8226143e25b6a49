//! Numeric coercion, ordering and decimal rounding shared by the operators

use crate::config::NumericMode;
use crate::error::{FelError, FelResult};
use bigdecimal::{BigDecimal, RoundingMode};
use fel_types::Value;
use num_bigint::BigInt;
use num_traits::Zero;
use std::cmp::Ordering;

/// Operands promoted to one arbitrary precision representation
pub(crate) enum BigPair {
    Integers(BigInt, BigInt),
    Decimals(BigDecimal, BigDecimal),
}

/// Promote two numbers: decimals if either is floating, integers if both are
/// integral. `None` for non-numbers and non-finite doubles.
pub(crate) fn big_pair(left: &Value, right: &Value) -> Option<BigPair> {
    if !(left.is_number() && right.is_number()) {
        return None;
    }
    if left.is_float() || right.is_float() {
        Some(BigPair::Decimals(left.to_big_decimal()?, right.to_big_decimal()?))
    } else {
        Some(BigPair::Integers(left.to_big_int()?, right.to_big_int()?))
    }
}

/// Order two operands under `mode`.
///
/// Numbers compare as doubles in [`NumericMode::Double`] and exactly in
/// [`NumericMode::Big`]. Strings and booleans use their natural order. Any other
/// pairing, and unordered numbers such as NaN, is a type error naming `operator`.
pub fn compare(mode: NumericMode, operator: &str, left: &Value, right: &Value) -> FelResult<Ordering> {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ if left.is_number() && right.is_number() => match mode {
            NumericMode::Double => match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
            NumericMode::Big => match big_pair(left, right) {
                Some(BigPair::Integers(a, b)) => Some(a.cmp(&b)),
                Some(BigPair::Decimals(a, b)) => Some(a.cmp(&b)),
                None => None,
            },
        },
        _ => None,
    };
    ordering.ok_or_else(|| FelError::type_mismatch(operator, left, right))
}

/// Equality: identity first, then null against non-null, then numeric
/// comparison, then structural equality
pub fn equals(mode: NumericMode, left: &Value, right: &Value) -> bool {
    if left.is_identical(right) {
        return true;
    }
    if left.is_null() || right.is_null() {
        return false;
    }
    if left.is_number() && right.is_number() {
        return matches!(compare(mode, "==", left, right), Ok(Ordering::Equal));
    }
    left == right
}

pub(crate) fn pow10(exponent: u32) -> BigInt {
    BigInt::from(10u8).pow(exponent)
}

/// Round to `scale` fractional digits, halves away from zero
pub fn round_half_up(value: &BigDecimal, scale: i64) -> BigDecimal {
    if value.as_bigint_and_exponent().1 <= scale {
        return value.clone();
    }
    value.with_scale_round(scale, RoundingMode::HalfUp)
}

/// Divide keeping `precision` fractional digits, rounding half up.
/// `None` when `right` is zero.
pub fn divide_decimal(left: &BigDecimal, right: &BigDecimal, precision: u32) -> Option<BigDecimal> {
    if right.is_zero() {
        return None;
    }
    let (ln, ls) = left.as_bigint_and_exponent();
    let (rn, rs) = right.as_bigint_and_exponent();

    // One guard digit past `precision` decides the rounding
    let target = i64::from(precision) + 1;
    let shift = rs - ls + target;
    let truncated = if shift >= 0 {
        (ln * pow10(u32::try_from(shift).ok()?)) / rn
    } else {
        ln / (rn * pow10(u32::try_from(-shift).ok()?))
    };
    Some(round_half_up(&BigDecimal::new(truncated, target), i64::from(precision)))
}

/// Round a decimal to an integral value toward negative (`floor`) or positive
/// (`ceil`) infinity
pub(crate) fn decimal_to_integral(value: &BigDecimal, ceil: bool) -> BigDecimal {
    if value.as_bigint_and_exponent().1 <= 0 {
        return value.clone();
    }
    let mode = if ceil { RoundingMode::Ceiling } else { RoundingMode::Floor };
    value.with_scale_round(0, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_double_comparison() {
        let ord = compare(NumericMode::Double, "<", &Value::Int(1), &Value::Float(1.5)).unwrap();
        assert_eq!(ord, Ordering::Less);
    }

    #[test]
    fn test_unordered_numbers_fail() {
        let nan = Value::Float(f64::NAN);
        for mode in [NumericMode::Double, NumericMode::Big] {
            let err = compare(mode, "<", &nan, &Value::Int(1)).unwrap_err();
            assert_eq!(err.category(), "type");
            assert!(err.to_string().contains("NaN"));
        }
    }

    #[test]
    fn test_big_comparison_is_exact() {
        let big = Value::BigInt(BigInt::from_str("100000000000000000001").unwrap());
        let near = Value::BigInt(BigInt::from_str("100000000000000000000").unwrap());
        assert_eq!(compare(NumericMode::Big, ">", &big, &near).unwrap(), Ordering::Greater);
        // Doubles cannot tell them apart
        assert_eq!(compare(NumericMode::Double, ">", &big, &near).unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_incomparable_types_fail() {
        let err = compare(NumericMode::Double, "<=", &Value::str("a"), &Value::Int(1)).unwrap_err();
        assert_eq!(err.category(), "type");
    }

    #[test]
    fn test_equals_rules() {
        assert!(equals(NumericMode::Double, &Value::Null, &Value::Null));
        assert!(!equals(NumericMode::Double, &Value::Null, &Value::Int(0)));
        assert!(equals(NumericMode::Double, &Value::Int(1), &Value::Float(1.0)));
        assert!(equals(NumericMode::Big, &Value::Decimal(dec("1.50")), &Value::Float(1.5)));
        assert!(equals(NumericMode::Double, &Value::str("x"), &Value::str("x")));
        assert!(!equals(NumericMode::Double, &Value::str("1"), &Value::Int(1)));
    }

    #[test]
    fn test_divide_decimal_precision() {
        assert_eq!(divide_decimal(&dec("1"), &dec("3"), 5), Some(dec("0.33333")));
        assert_eq!(divide_decimal(&dec("2"), &dec("3"), 5), Some(dec("0.66667")));
        assert_eq!(divide_decimal(&dec("-2"), &dec("3"), 2), Some(dec("-0.67")));
        assert_eq!(divide_decimal(&dec("1.5"), &dec("0.05"), 0), Some(dec("30")));
        assert_eq!(divide_decimal(&dec("1"), &dec("0"), 5), None);
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(&dec("2.345"), 2), dec("2.35"));
        assert_eq!(round_half_up(&dec("-2.345"), 2), dec("-2.35"));
        assert_eq!(round_half_up(&dec("2.344"), 2), dec("2.34"));
        assert_eq!(round_half_up(&dec("2.3"), 2), dec("2.3"));
        assert_eq!(round_half_up(&dec("2.5"), 0), dec("3"));
    }

    #[test]
    fn test_decimal_floor_and_ceil() {
        assert_eq!(decimal_to_integral(&dec("2.5"), false), dec("2"));
        assert_eq!(decimal_to_integral(&dec("-2.5"), false), dec("-3"));
        assert_eq!(decimal_to_integral(&dec("2.5"), true), dec("3"));
        assert_eq!(decimal_to_integral(&dec("-2.5"), true), dec("-2"));
        assert_eq!(decimal_to_integral(&dec("7"), true), dec("7"));
    }
}
