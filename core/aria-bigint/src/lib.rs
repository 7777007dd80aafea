//! Arbitrary-precision signed integers.
//!
//! Every integer literal in Aria source is lexed directly into a [`BigInt`]
//! rather than a fixed-width machine integer, so that `9999999999999999999`
//! is a perfectly valid token — whether it *fits* in the type it ends up
//! with is a question the type checker answers later with [`BigInt::fits`].
//!
//! Backed by [`num_bigint::BigInt`] rather than a hand-rolled limb vector;
//! the arithmetic this compiler needs (add/sub/neg/mul/div/rem, comparison,
//! decimal parsing and range checks) is exactly what that crate already
//! provides well-tested.

use std::fmt;
use std::str::FromStr;

use num_bigint::{BigInt as Inner, Sign};
use num_traits::{Signed, ToPrimitive, Zero};

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct BigInt(Inner);

/// Error returned by division/remainder when the divisor is zero.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DivisionByZero;

impl BigInt {
    #[must_use]
    pub fn zero() -> Self {
        Self(Inner::zero())
    }

    #[must_use]
    pub fn from_i64(v: i64) -> Self {
        Self(Inner::from(v))
    }

    #[must_use]
    pub fn from_u64(v: u64) -> Self {
        Self(Inner::from(v))
    }

    /// Accumulates a single decimal digit (`0..=9`) into the value,
    /// equivalent to `self = self * 10 + digit`. This is how the lexer
    /// builds up a literal's value one byte at a time without ever
    /// allocating an intermediate string.
    pub fn push_decimal_digit(&mut self, digit: u8) {
        debug_assert!(digit <= 9);
        self.0 *= 10;
        self.0 += digit;
    }

    /// Parses a decimal string with no separators (the lexer strips `_`
    /// before calling this). Returns `None` if `s` is empty or contains a
    /// non-digit byte.
    #[must_use]
    pub fn parse_decimal(s: &str) -> Option<Self> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Inner::from_str(s).ok().map(Self)
    }

    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.sign() == Sign::Minus
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[must_use]
    pub fn neg(&self) -> Self {
        Self(-&self.0)
    }

    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        Self(&self.0 + &other.0)
    }

    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        Self(&self.0 - &other.0)
    }

    #[must_use]
    pub fn mul(&self, other: &Self) -> Self {
        Self(&self.0 * &other.0)
    }

    /// Truncating division, matching machine-integer division semantics.
    ///
    /// # Errors
    /// Returns [`DivisionByZero`] if `other` is zero; the caller (the type
    /// checker, for `comptime`/`comptime` division) is responsible for
    /// turning this into a diagnostic at the dividing expression's span.
    pub fn div(&self, other: &Self) -> Result<Self, DivisionByZero> {
        if other.is_zero() {
            return Err(DivisionByZero);
        }
        Ok(Self(&self.0 / &other.0))
    }

    /// # Errors
    /// Returns [`DivisionByZero`] if `other` is zero.
    pub fn rem(&self, other: &Self) -> Result<Self, DivisionByZero> {
        if other.is_zero() {
            return Err(DivisionByZero);
        }
        Ok(Self(&self.0 % &other.0))
    }

    /// Whether this value fits in a `bytes`-wide integer of the given
    /// signedness, e.g. `fits(4, true)` for `i32`, `fits(4, false)` for
    /// `u32`. `bytes` must be 1, 2, 4 or 8.
    #[must_use]
    pub fn fits(&self, bytes: u32, signed: bool) -> bool {
        let bits = bytes * 8;
        if signed {
            let max: i128 = (1i128 << (bits - 1)) - 1;
            let min: i128 = -(1i128 << (bits - 1));
            self.0
                .to_i128()
                .is_some_and(|v| v >= min && v <= max)
        } else {
            if self.is_negative() {
                return false;
            }
            let max: u128 = if bits == 128 { u128::MAX } else { (1u128 << bits) - 1 };
            self.0.to_u128().is_some_and(|v| v <= max)
        }
    }

    /// Range-checks a raw (unsuffixed) literal against the 64-bit bound the
    /// lexer/checker uses to reject absurdly large literals up front,
    /// independent of the type they eventually coerce to. Unsigned 64-bit
    /// is the widest comptime literal domain the language supports.
    #[must_use]
    pub fn fits_in_register(&self) -> bool {
        !self.is_negative() && self.fits(8, false)
    }

    #[must_use]
    pub fn to_i64(&self) -> Option<i64> {
        self.0.to_i64()
    }

    #[must_use]
    pub fn to_u64(&self) -> Option<u64> {
        self.0.to_u64()
    }

    #[must_use]
    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i32_boundary() {
        let max = BigInt::parse_decimal("2147483647").unwrap();
        let over = BigInt::parse_decimal("2147483648").unwrap();
        assert!(max.fits(4, true));
        assert!(!over.fits(4, true));
    }

    #[test]
    fn u32_rejects_negative() {
        let neg_one = BigInt::from_i64(-1);
        assert!(!neg_one.fits(4, false));
        let max = BigInt::parse_decimal("4294967295").unwrap();
        assert!(max.fits(4, false));
    }

    #[test]
    fn push_decimal_digit_matches_parse() {
        let mut built = BigInt::zero();
        for d in [1, 2, 3] {
            built.push_decimal_digit(d);
        }
        assert_eq!(built, BigInt::parse_decimal("123").unwrap());
    }

    #[test]
    fn division_by_zero_is_reported() {
        let one = BigInt::from_i64(1);
        let zero = BigInt::zero();
        assert_eq!(one.div(&zero), Err(DivisionByZero));
    }

    #[test]
    fn division_by_nonzero_succeeds() {
        let ten = BigInt::from_i64(10);
        let three = BigInt::from_i64(3);
        assert_eq!(ten.div(&three).unwrap(), BigInt::from_i64(3));
        assert_eq!(ten.rem(&three).unwrap(), BigInt::from_i64(1));
    }
}
