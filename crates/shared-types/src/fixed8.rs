//! # Fixed8
//!
//! Signed 64-bit fixed-point amount with eight decimal places. The raw value
//! is always `real_value * 10^8`. Every operation is checked and reports
//! [`ArithmeticError::Overflow`] instead of wrapping.

use crate::errors::{ArithmeticError, FormatError};
use crate::io::{BinaryReader, BinaryWriter, Serializable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const D: i64 = 100_000_000;

/// Fixed-point amount, 1 unit = 10^-8.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Fixed8(i64);

impl Fixed8 {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(D);
    /// Smallest positive amount.
    pub const SATOSHI: Self = Self(1);
    pub const MAX: Self = Self(i64::MAX);
    pub const MIN: Self = Self(i64::MIN);
    /// Number of fractional digits.
    pub const DECIMALS: u8 = 8;

    /// Wrap a raw value already scaled by 10^8.
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Whole units, e.g. `from_units(15)` is 15.00000000.
    pub fn from_units(units: i64) -> Result<Self, ArithmeticError> {
        units.checked_mul(D).map(Self).ok_or(ArithmeticError::Overflow)
    }

    pub fn checked_add(self, other: Self) -> Result<Self, ArithmeticError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(ArithmeticError::Overflow)
    }

    pub fn checked_sub(self, other: Self) -> Result<Self, ArithmeticError> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(ArithmeticError::Overflow)
    }

    pub fn checked_neg(self) -> Result<Self, ArithmeticError> {
        self.0.checked_neg().map(Self).ok_or(ArithmeticError::Overflow)
    }

    /// Fixed-point product, truncated toward zero.
    ///
    /// The magnitudes are multiplied as a 128-bit value; if the high 64-bit
    /// word reaches the scale the quotient cannot fit and the product fails.
    pub fn checked_mul(self, other: Self) -> Result<Self, ArithmeticError> {
        let negative = (self.0 < 0) != (other.0 < 0);
        let product = u128::from(self.0.unsigned_abs()) * u128::from(other.0.unsigned_abs());
        if (product >> 64) >= D as u128 {
            return Err(ArithmeticError::Overflow);
        }
        let magnitude = product / D as u128;
        Self::from_magnitude(magnitude, negative)
    }

    /// Fixed-point quotient, truncated toward zero.
    pub fn checked_div(self, other: Self) -> Result<Self, ArithmeticError> {
        if other.0 == 0 {
            return Err(ArithmeticError::DivideByZero);
        }
        let quotient = i128::from(self.0) * i128::from(D) / i128::from(other.0);
        i64::try_from(quotient)
            .map(Self)
            .map_err(|_| ArithmeticError::Overflow)
    }

    /// Multiply by a plain integer.
    pub fn checked_mul_int(self, factor: i64) -> Result<Self, ArithmeticError> {
        self.0
            .checked_mul(factor)
            .map(Self)
            .ok_or(ArithmeticError::Overflow)
    }

    /// Sum of an iterator of amounts, failing on the first overflow.
    pub fn checked_sum<I: IntoIterator<Item = Self>>(items: I) -> Result<Self, ArithmeticError> {
        items
            .into_iter()
            .try_fold(Self::ZERO, |acc, item| acc.checked_add(item))
    }

    pub fn abs(self) -> Result<Self, ArithmeticError> {
        if self.0 < 0 {
            self.checked_neg()
        } else {
            Ok(self)
        }
    }

    /// Round up to a whole unit.
    pub fn ceiling(self) -> Result<Self, ArithmeticError> {
        let remainder = self.0 % D;
        if remainder > 0 {
            (self.0 - remainder)
                .checked_add(D)
                .map(Self)
                .ok_or(ArithmeticError::Overflow)
        } else {
            Ok(Self(self.0 - remainder))
        }
    }

    /// True when the value has no fractional part finer than `10^-decimals`.
    pub fn fits_precision(self, decimals: u8) -> bool {
        if decimals >= Self::DECIMALS {
            return true;
        }
        let step = 10i64.pow(u32::from(Self::DECIMALS - decimals));
        self.0 % step == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    fn from_magnitude(magnitude: u128, negative: bool) -> Result<Self, ArithmeticError> {
        if negative {
            if magnitude > i64::MAX as u128 + 1 {
                return Err(ArithmeticError::Overflow);
            }
            Ok(Self((magnitude as i128).wrapping_neg() as i64))
        } else {
            i64::try_from(magnitude)
                .map(Self)
                .map_err(|_| ArithmeticError::Overflow)
        }
    }
}

impl FromStr for Fixed8 {
    type Err = ArithmeticError;

    /// Strict decimal parse: optional `-`, digits, optional `.` and fraction.
    /// Trailing fractional zeros are ignored; any remaining digit past the
    /// eighth place is a format error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, fraction) = match body.split_once('.') {
            Some((w, f)) => (w, f),
            None => (body, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(ArithmeticError::Format);
        }
        if !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ArithmeticError::Format);
        }
        let fraction = fraction.trim_end_matches('0');
        if fraction.len() > usize::from(Self::DECIMALS) {
            return Err(ArithmeticError::Format);
        }

        let mut magnitude: u128 = 0;
        for b in whole.bytes() {
            magnitude = magnitude * 10 + u128::from(b - b'0');
            if magnitude > i64::MAX as u128 {
                return Err(ArithmeticError::Overflow);
            }
        }
        let mut frac_raw: u128 = 0;
        for b in fraction.bytes() {
            frac_raw = frac_raw * 10 + u128::from(b - b'0');
        }
        frac_raw *= 10u128.pow(u32::from(Self::DECIMALS) - fraction.len() as u32);

        Self::from_magnitude(magnitude * D as u128 + frac_raw, negative)
    }
}

impl fmt::Display for Fixed8 {
    /// Canonical form: no trailing fractional zeros, no trailing dot.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.0.unsigned_abs();
        let whole = magnitude / D as u64;
        let fraction = magnitude % D as u64;
        if self.0 < 0 {
            f.write_str("-")?;
        }
        if fraction == 0 {
            write!(f, "{whole}")
        } else {
            let digits = format!("{fraction:08}");
            write!(f, "{whole}.{}", digits.trim_end_matches('0'))
        }
    }
}

impl fmt::Debug for Fixed8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serializable for Fixed8 {
    fn size(&self) -> usize {
        8
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_i64(self.0);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        Ok(Self(reader.read_i64()?))
    }
}
