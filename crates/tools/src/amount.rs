//! Human-readable amount → on-chain base units.
//!
//! `"1.5"` with 8 decimals is `150000000`. Works on the decimal digits
//! directly so no precision is lost to floating point.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Invalid amount: {0}")]
    Invalid(String),

    #[error("Amount must be positive")]
    NotPositive,

    #[error("Amount has more than {decimals} fractional digits")]
    TooPrecise { decimals: u8 },

    #[error("Amount is too large")]
    Overflow,
}

/// Convert a decimal string (`"0.01"`, `"2"`, `"1e-3"`) into base units for
/// an asset with `decimals` fractional digits.
pub fn to_base_units(amount: &str, decimals: u8) -> Result<u64, AmountError> {
    let parsed = parse_decimal(amount.trim())?;
    if parsed.negative {
        return Err(AmountError::NotPositive);
    }

    // value = digits × 10^(-scale); base units = digits × 10^(decimals - scale)
    let shift = i64::from(decimals).saturating_sub(parsed.scale);
    let units = if shift >= 0 {
        let factor = pow10(shift).ok_or(AmountError::Overflow)?;
        parsed
            .digits
            .checked_mul(factor)
            .ok_or(AmountError::Overflow)?
    } else {
        let divisor = pow10(-shift);
        match divisor {
            Some(d) if parsed.digits % d == 0 => parsed.digits / d,
            // A divisor beyond u128 only divides zero.
            None if parsed.digits == 0 => 0,
            _ => return Err(AmountError::TooPrecise { decimals }),
        }
    };

    if units == 0 {
        return Err(AmountError::NotPositive);
    }
    u64::try_from(units).map_err(|_| AmountError::Overflow)
}

struct Decimal {
    negative: bool,
    digits: u128,
    /// Power of ten the digits are divided by (may be negative).
    scale: i64,
}

fn parse_decimal(input: &str) -> Result<Decimal, AmountError> {
    let invalid = || AmountError::Invalid(input.to_string());
    if input.is_empty() {
        return Err(invalid());
    }

    let (negative, rest) = match input.as_bytes()[0] {
        b'-' => (true, &input[1..]),
        b'+' => (false, &input[1..]),
        _ => (false, input),
    };

    let (mantissa, exponent) = match rest.find(['e', 'E']) {
        Some(pos) => {
            let exp: i64 = rest[pos + 1..].parse().map_err(|_| invalid())?;
            (&rest[..pos], exp)
        }
        None => (rest, 0),
    };

    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, f),
        None => (mantissa, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    // Trailing fractional zeros carry no value and would only inflate scale.
    let frac_part = frac_part.trim_end_matches('0');

    let mut digits: u128 = 0;
    for b in int_part.bytes().chain(frac_part.bytes()) {
        digits = digits
            .checked_mul(10)
            .and_then(|d| d.checked_add(u128::from(b - b'0')))
            .ok_or(AmountError::Overflow)?;
    }

    Ok(Decimal {
        negative,
        digits,
        scale: (frac_part.len() as i64).saturating_sub(exponent),
    })
}

fn pow10(exp: i64) -> Option<u128> {
    let exp = u32::try_from(exp).ok()?;
    10u128.checked_pow(exp)
}
