// Fixed-point rescaling between integer base units and display decimals

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use std::str::FromStr;

use crate::error::DecimalError;

/// uint256 holds at most 78 decimal digits; no token exponent can exceed it.
pub const MAX_EXPONENT: u32 = 77;

/// Base-unit integer divided by `10^exponent`. Exact: only the scale changes.
pub fn rescale(base_units: &BigDecimal, exponent: u32) -> Result<BigDecimal, DecimalError> {
    check_exponent(exponent)?;
    let (digits, scale) = base_units.as_bigint_and_exponent();
    if scale > 0 {
        // base units carry no fractional part
        let normalized = base_units.normalized();
        if normalized.as_bigint_and_exponent().1 > 0 {
            return Err(DecimalError::InvalidBaseUnits(base_units.to_string()));
        }
        return rescale(&normalized, exponent);
    }
    Ok(BigDecimal::new(digits, scale + i64::from(exponent)))
}

/// Parses an integer string (as returned by the indexer) and rescales it.
pub fn rescale_str(base_units: &str, exponent: u32) -> Result<BigDecimal, DecimalError> {
    rescale(&parse_base_units(base_units)?, exponent)
}

pub fn parse_base_units(base_units: &str) -> Result<BigDecimal, DecimalError> {
    let trimmed = base_units.trim();
    let unsigned = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecimalError::InvalidBaseUnits(base_units.to_string()));
    }
    let digits = BigInt::from_str(trimmed)
        .map_err(|_| DecimalError::InvalidBaseUnits(base_units.to_string()))?;
    Ok(BigDecimal::new(digits, 0))
}

/// Inverse of [`rescale`]. Fails instead of rounding when the value has more
/// fractional digits than the exponent can absorb.
pub fn to_base_units(value: &BigDecimal, exponent: u32) -> Result<BigInt, DecimalError> {
    check_exponent(exponent)?;
    let normalized = value.normalized();
    let (digits, scale) = normalized.as_bigint_and_exponent();
    let shift = i64::from(exponent) - scale;
    if shift < 0 {
        return Err(DecimalError::PrecisionLoss {
            value: to_plain_string(value),
            exponent,
        });
    }
    Ok(digits * BigInt::from(10u8).pow(shift as u32))
}

/// Positional notation without exponent and without trailing zeros.
pub fn to_plain_string(value: &BigDecimal) -> String {
    value.normalized().to_plain_string()
}

fn check_exponent(exponent: u32) -> Result<(), DecimalError> {
    if exponent > MAX_EXPONENT {
        return Err(DecimalError::ExponentOutOfRange(exponent));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescales_base_units_to_display() {
        let display = rescale_str("450000000000000000000", 18).unwrap();
        assert_eq!(to_plain_string(&display), "450");

        let display = rescale_str("1500000000000000000", 18).unwrap();
        assert_eq!(to_plain_string(&display), "1.5");

        let display = rescale_str("7", 18).unwrap();
        assert_eq!(to_plain_string(&display), "0.000000000000000007");

        assert_eq!(to_plain_string(&rescale_str("0", 18).unwrap()), "0");
    }

    #[test]
    fn keeps_thirty_plus_significant_digits() {
        let base = "123456789012345678901234567890123456789";
        let display = rescale_str(base, 18).unwrap();
        assert_eq!(
            to_plain_string(&display),
            "123456789012345678901.234567890123456789"
        );
        let back = to_base_units(&display, 18).unwrap();
        assert_eq!(back.to_string(), base);
    }

    #[test]
    fn round_trips_back_to_base_units() {
        let display = rescale_str("450000000000000000000", 18).unwrap();
        let back = to_base_units(&display, 18).unwrap();
        assert_eq!(back.to_string(), "450000000000000000000");
    }

    #[test]
    fn fails_loudly_instead_of_rounding() {
        let value = BigDecimal::from_str("1.0000000000000000001").unwrap();
        assert!(matches!(
            to_base_units(&value, 18),
            Err(DecimalError::PrecisionLoss { .. })
        ));
        assert_eq!(
            rescale_str("1", 78),
            Err(DecimalError::ExponentOutOfRange(78))
        );
        assert!(matches!(
            rescale_str("12.5", 18),
            Err(DecimalError::InvalidBaseUnits(_))
        ));
        assert!(rescale_str("", 18).is_err());
    }
}
