//! Exact conversion between human decimal amounts and raw integer ledger units.
//!
//! Everything here is integer/string arithmetic on [`BigUint`]. Binary floating point is only
//! accepted at the input boundary (`TryFrom<f64>`), where the value is rendered to its shortest
//! decimal representation before parsing.
use std::{cmp::Ordering, fmt, str::FromStr};

use num_bigint::BigUint;
use num_traits::{One as _, Zero as _};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Visitor},
};

use crate::error::AmountError;

/// A non-negative decimal number held as `mantissa / 10^scale`.
///
/// Values are normalized on construction (no trailing fractional zeros, zero has scale 0), so
/// derived equality and hashing compare numeric values: `"1.50" == "1.5"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DecimalAmount {
    mantissa: BigUint,
    scale: u32,
}

impl DecimalAmount {
    pub fn new(mantissa: BigUint, scale: u32) -> Self {
        let (mantissa, scale) = normalize(mantissa, scale);
        Self { mantissa, scale }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa.is_zero()
    }

    pub fn mantissa(&self) -> &BigUint {
        &self.mantissa
    }

    /// Number of significant fractional digits.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Drops fractional digits beyond `max_fraction_digits`. Never rounds up.
    pub fn truncate(&self, max_fraction_digits: u32) -> Self {
        if self.scale <= max_fraction_digits {
            return self.clone();
        }
        let dropped = self.scale - max_fraction_digits;
        Self::new(&self.mantissa / ten_pow(dropped), max_fraction_digits)
    }
}

fn normalize(mut mantissa: BigUint, mut scale: u32) -> (BigUint, u32) {
    if mantissa.is_zero() {
        return (mantissa, 0);
    }
    let ten = BigUint::from(10u8);
    while scale > 0 && (&mantissa % &ten).is_zero() {
        mantissa /= &ten;
        scale -= 1;
    }
    (mantissa, scale)
}

fn ten_pow(exp: u32) -> BigUint {
    if exp == 0 {
        return BigUint::one();
    }
    BigUint::from(10u8).pow(exp)
}

impl PartialOrd for DecimalAmount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DecimalAmount {
    fn cmp(&self, other: &Self) -> Ordering {
        let scale = self.scale.max(other.scale);
        let lhs = &self.mantissa * ten_pow(scale - self.scale);
        let rhs = &other.mantissa * ten_pow(scale - other.scale);
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for DecimalAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.to_str_radix(10);
        let scale = self.scale as usize;
        if scale == 0 {
            return f.write_str(&digits);
        }
        let digits = if digits.len() <= scale {
            format!("{}{digits}", "0".repeat(scale - digits.len() + 1))
        } else {
            digits
        };
        let (int_part, frac_part) = digits.split_at(digits.len() - scale);
        write!(f, "{int_part}.{frac_part}")
    }
}

impl FromStr for DecimalAmount {
    type Err = AmountError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let (negative, unsigned) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let lowered = unsigned.to_ascii_lowercase();
        if matches!(lowered.as_str(), "inf" | "infinity" | "nan") {
            return Err(AmountError::NotFinite);
        }

        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (unsigned, ""),
        };
        let well_formed = !(int_part.is_empty() && frac_part.is_empty())
            && int_part.bytes().all(|b| b.is_ascii_digit())
            && frac_part.bytes().all(|b| b.is_ascii_digit());
        if !well_formed {
            return Err(AmountError::Malformed(input.to_string()));
        }
        if negative {
            return Err(AmountError::Negative);
        }

        let digits = format!("{int_part}{frac_part}");
        let mantissa = BigUint::parse_bytes(digits.as_bytes(), 10)
            .ok_or_else(|| AmountError::Malformed(input.to_string()))?;
        let scale = u32::try_from(frac_part.len())
            .map_err(|_| AmountError::Malformed(input.to_string()))?;

        Ok(Self::new(mantissa, scale))
    }
}

impl TryFrom<f64> for DecimalAmount {
    type Error = AmountError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(AmountError::NotFinite);
        }
        if value == 0.0 {
            return Ok(Self::zero());
        }
        if value.is_sign_negative() {
            return Err(AmountError::Negative);
        }
        // `Display` for f64 yields the shortest round-tripping digits without exponent notation.
        value.to_string().parse()
    }
}

impl From<u64> for DecimalAmount {
    fn from(value: u64) -> Self {
        Self::new(BigUint::from(value), 0)
    }
}

impl Serialize for DecimalAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Accepts decimal strings and plain numbers, so config layers that type `5000` as an integer
/// still deserialize. Floats go through [`TryFrom<f64>`].
impl<'de> Deserialize<'de> for DecimalAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DecimalAmountVisitor)
    }
}

struct DecimalAmountVisitor;

impl Visitor<'_> for DecimalAmountVisitor {
    type Value = DecimalAmount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative decimal amount")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        value.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(DecimalAmount::from(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        u64::try_from(value)
            .map(DecimalAmount::from)
            .map_err(|_| E::custom(AmountError::Negative))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        DecimalAmount::try_from(value).map_err(E::custom)
    }
}

/// Anything the converter accepts as a human decimal amount.
pub trait IntoAmount {
    fn into_amount(self) -> Result<DecimalAmount, AmountError>;
}

impl IntoAmount for DecimalAmount {
    fn into_amount(self) -> Result<DecimalAmount, AmountError> {
        Ok(self)
    }
}

impl IntoAmount for &DecimalAmount {
    fn into_amount(self) -> Result<DecimalAmount, AmountError> {
        Ok(self.clone())
    }
}

impl IntoAmount for &str {
    fn into_amount(self) -> Result<DecimalAmount, AmountError> {
        self.parse()
    }
}

impl IntoAmount for String {
    fn into_amount(self) -> Result<DecimalAmount, AmountError> {
        self.parse()
    }
}

impl IntoAmount for f64 {
    fn into_amount(self) -> Result<DecimalAmount, AmountError> {
        DecimalAmount::try_from(self)
    }
}

impl IntoAmount for i64 {
    fn into_amount(self) -> Result<DecimalAmount, AmountError> {
        u64::try_from(self)
            .map(DecimalAmount::from)
            .map_err(|_| AmountError::Negative)
    }
}

impl IntoAmount for u64 {
    fn into_amount(self) -> Result<DecimalAmount, AmountError> {
        Ok(DecimalAmount::from(self))
    }
}

/// Converts a decimal amount into raw ledger units for an asset with `decimals` places.
///
/// # Errors
/// Fails when the amount is negative, not finite, malformed, or carries more fractional digits
/// than `decimals` allows.
pub fn to_raw(amount: impl IntoAmount, decimals: u8) -> Result<BigUint, AmountError> {
    let amount = amount.into_amount()?;
    let allowed = u32::from(decimals);
    if amount.scale > allowed {
        return Err(AmountError::TooPrecise {
            found: amount.scale,
            allowed: decimals,
        });
    }
    Ok(amount.mantissa * ten_pow(allowed - amount.scale))
}

pub fn to_decimal(raw_amount: &BigUint, decimals: u8) -> DecimalAmount {
    DecimalAmount::new(raw_amount.clone(), u32::from(decimals))
}

/// Renders a raw amount for display, keeping at most `max_fraction_digits` fractional digits.
pub fn format_display(raw_amount: &BigUint, decimals: u8, max_fraction_digits: u32) -> String {
    to_decimal(raw_amount, decimals)
        .truncate(max_fraction_digits)
        .to_string()
}
