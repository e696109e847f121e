//! Fixed-point decimals quoted by the storage chain.
//!
//! Prices and rates arrive as strings with eighteen fractional digits
//! (`"0.073279625095000000"`). [`Dec`] keeps them exact as a scaled
//! [`U256`] so that fee formulas can multiply several of them together and
//! round once at the very end.

use crate::error::{FeeError, Result};
use alloy_primitives::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits carried by [`Dec`].
pub const DEC_PRECISION: usize = 18;

const SCALE_U128: u128 = 1_000_000_000_000_000_000;

/// Returns `10^18` as a [`U256`].
pub fn scale() -> U256 {
    U256::from(SCALE_U128)
}

/// Non-negative decimal with eighteen fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Dec(U256);

impl Dec {
    /// Builds a decimal equal to the integer `value`.
    pub fn from_int(value: u128) -> Self {
        Self(U256::from(value) * scale())
    }

    /// Scaled representation (`value * 10^18`).
    pub fn raw(&self) -> U256 {
        self.0
    }
}

impl FromStr for Dec {
    type Err = FeeError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(FeeError::Parse("empty decimal".into()));
        }
        let (int_part, frac_part) = match trimmed.split_once('.') {
            Some((i, f)) => (i, f),
            None => (trimmed, ""),
        };
        if frac_part.len() > DEC_PRECISION {
            return Err(FeeError::Parse(format!(
                "decimal {trimmed} exceeds {DEC_PRECISION} fractional digits"
            )));
        }
        let digits_only = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !digits_only(int_part)
            || !digits_only(frac_part)
            || (int_part.is_empty() && frac_part.is_empty())
        {
            return Err(FeeError::Parse(format!("invalid decimal {trimmed}")));
        }
        let int_value = if int_part.is_empty() {
            0u128
        } else {
            int_part
                .parse::<u128>()
                .map_err(|err| FeeError::Parse(format!("invalid decimal {trimmed}: {err}")))?
        };
        let mut frac_value = 0u128;
        for b in frac_part.bytes() {
            frac_value = frac_value * 10 + u128::from(b - b'0');
        }
        for _ in frac_part.len()..DEC_PRECISION {
            frac_value *= 10;
        }
        let raw = U256::from(int_value)
            .checked_mul(scale())
            .and_then(|v| v.checked_add(U256::from(frac_value)))
            .ok_or(FeeError::Overflow("decimal parse"))?;
        Ok(Self(raw))
    }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int_part = self.0 / scale();
        let frac_part = self.0 % scale();
        if frac_part.is_zero() {
            return write!(f, "{int_part}");
        }
        let frac = format!("{:0>width$}", frac_part.to_string(), width = DEC_PRECISION);
        write!(f, "{int_part}.{}", frac.trim_end_matches('0'))
    }
}

impl Serialize for Dec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Dec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

/// Integer division rounding towards positive infinity.
pub fn ceil_div(num: U256, den: U256) -> Result<U256> {
    if den.is_zero() {
        return Err(FeeError::InvalidInput("division by zero".into()));
    }
    let quotient = num / den;
    if (num % den).is_zero() {
        Ok(quotient)
    } else {
        Ok(quotient + U256::from(1u8))
    }
}

/// Narrows a [`U256`] amount to wei.
pub fn to_wei(value: U256, context: &'static str) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return Err(FeeError::Overflow(context));
    }
    Ok(value.to::<u128>())
}
