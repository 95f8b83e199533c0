//! Arbitrary-precision decimal: an integer value plus a decimal count.

use crate::errors::ArithmeticError;
use crate::fixed8::Fixed8;
use num_bigint::{BigInt, Sign};
use std::fmt;

/// `value * 10^-decimals`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BigDecimal {
    value: BigInt,
    decimals: u8,
}

impl BigDecimal {
    pub fn new(value: BigInt, decimals: u8) -> Self {
        Self { value, decimals }
    }

    pub fn value(&self) -> &BigInt {
        &self.value
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn sign(&self) -> Sign {
        self.value.sign()
    }

    /// Rescale to `decimals`. Reducing precision fails with
    /// [`ArithmeticError::Overflow`] when non-zero digits would be dropped.
    pub fn change_decimals(&self, decimals: u8) -> Result<Self, ArithmeticError> {
        if decimals == self.decimals {
            return Ok(self.clone());
        }
        let value = if decimals > self.decimals {
            &self.value * BigInt::from(10u8).pow(u32::from(decimals - self.decimals))
        } else {
            let divisor = BigInt::from(10u8).pow(u32::from(self.decimals - decimals));
            if &self.value % &divisor != BigInt::from(0u8) {
                return Err(ArithmeticError::Overflow);
            }
            &self.value / divisor
        };
        Ok(Self { value, decimals })
    }

    /// Parse a decimal string at the given precision.
    pub fn parse(s: &str, decimals: u8) -> Result<Self, ArithmeticError> {
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, fraction) = body.split_once('.').unwrap_or((body, ""));
        if (whole.is_empty() && fraction.is_empty())
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ArithmeticError::Format);
        }
        let fraction = fraction.trim_end_matches('0');
        if fraction.len() > usize::from(decimals) {
            return Err(ArithmeticError::Overflow);
        }
        let mut digits = String::with_capacity(whole.len() + usize::from(decimals));
        digits.push_str(whole);
        digits.push_str(fraction);
        for _ in fraction.len()..usize::from(decimals) {
            digits.push('0');
        }
        let mut value = BigInt::parse_bytes(digits.as_bytes(), 10).unwrap_or_default();
        if negative {
            value = -value;
        }
        Ok(Self { value, decimals })
    }

    /// Convert to a [`Fixed8`], failing if precision would be lost or the
    /// value does not fit 64 bits.
    pub fn to_fixed8(&self) -> Result<Fixed8, ArithmeticError> {
        let scaled = self.change_decimals(Fixed8::DECIMALS)?;
        i64::try_from(scaled.value)
            .map(Fixed8::from_raw)
            .map_err(|_| ArithmeticError::Overflow)
    }
}

impl From<Fixed8> for BigDecimal {
    fn from(value: Fixed8) -> Self {
        Self::new(BigInt::from(value.raw()), Fixed8::DECIMALS)
    }
}

impl fmt::Display for BigDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.value.magnitude().to_string();
        let decimals = usize::from(self.decimals);
        if self.value.sign() == Sign::Minus {
            f.write_str("-")?;
        }
        if decimals == 0 {
            return f.write_str(&magnitude);
        }
        let padded = format!("{magnitude:0>width$}", width = decimals + 1);
        let (whole, fraction) = padded.split_at(padded.len() - decimals);
        let fraction = fraction.trim_end_matches('0');
        if fraction.is_empty() {
            f.write_str(whole)
        } else {
            write!(f, "{whole}.{fraction}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display() {
        let amount = BigDecimal::parse("12.345", 8).unwrap();
        assert_eq!(amount.value(), &BigInt::from(1_234_500_000i64));
        assert_eq!(amount.to_string(), "12.345");
        assert_eq!(BigDecimal::parse("-0.5", 2).unwrap().to_string(), "-0.5");
        assert_eq!(BigDecimal::parse("7", 0).unwrap().to_string(), "7");
        assert_eq!(BigDecimal::parse("1.23", 1), Err(ArithmeticError::Overflow));
        assert_eq!(BigDecimal::parse("1,2", 2), Err(ArithmeticError::Format));
    }

    #[test]
    fn test_change_decimals() {
        let amount = BigDecimal::new(BigInt::from(1500), 3);
        assert_eq!(amount.change_decimals(1).unwrap().value(), &BigInt::from(15));
        assert_eq!(amount.change_decimals(5).unwrap().value(), &BigInt::from(150_000));
        let fine = BigDecimal::new(BigInt::from(1501), 3);
        assert_eq!(fine.change_decimals(1), Err(ArithmeticError::Overflow));
    }

    #[test]
    fn test_fixed8_conversion() {
        let amount = Fixed8::from_raw(123_456_789);
        let big = BigDecimal::from(amount);
        assert_eq!(big.to_string(), "1.23456789");
        assert_eq!(big.to_fixed8().unwrap(), amount);
        let too_big = BigDecimal::new(BigInt::from(i64::MAX) * BigInt::from(10), 8);
        assert_eq!(too_big.to_fixed8(), Err(ArithmeticError::Overflow));
    }
}
