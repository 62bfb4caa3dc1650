//! Fixed-point arithmetic and mathematical utilities.
//!
//! Amounts are raw `u128` values with 18 decimals. Products that may exceed
//! 128 bits go through a 256-bit intermediate. Every division truncates
//! toward zero unless the function name says otherwise.

use primitive_types::U256;

use crate::error::{Error, Result};
use crate::utils::constants::{ONE, PPM_DIVISOR};

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: u128, b: u128) -> Result<u128> {
    a.checked_mul(b).ok_or(Error::Overflow {
        operation: format!("{} * {}", a, b),
    })
}

fn narrow(value: U256, operation: impl FnOnce() -> String) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return Err(Error::Overflow {
            operation: operation(),
        });
    }
    Ok(value.low_u128())
}

fn ensure_divisor(c: u128) -> Result<()> {
    if c == 0 {
        return Err(Error::InvalidParameter {
            name: "divisor".into(),
            reason: "division by zero".into(),
        });
    }
    Ok(())
}

/// Computes `(a * b) / c` with a 256-bit intermediate, rounding down
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128> {
    ensure_divisor(c)?;
    let result = U256::from(a) * U256::from(b) / U256::from(c);
    narrow(result, || format!("({} * {}) / {}", a, b, c))
}

/// Computes `(a * b) / c` with a 256-bit intermediate, rounding up
pub fn mul_div_up(a: u128, b: u128, c: u128) -> Result<u128> {
    ensure_divisor(c)?;
    let numerator = U256::from(a) * U256::from(b);
    let divisor = U256::from(c);
    let mut result = numerator / divisor;
    if !(numerator % divisor).is_zero() {
        result += U256::one();
    }
    narrow(result, || format!("ceil(({} * {}) / {})", a, b, c))
}

/// Computes `(a * b * c) / d` with a 256-bit intermediate, rounding down
pub fn mul_mul_div(a: u128, b: u128, c: u128, d: u128) -> Result<u128> {
    ensure_divisor(d)?;
    let product = U256::from(a)
        .checked_mul(U256::from(b))
        .and_then(|p| p.checked_mul(U256::from(c)))
        .ok_or_else(|| Error::Overflow {
            operation: format!("{} * {} * {}", a, b, c),
        })?;
    narrow(product / U256::from(d), || {
        format!("({} * {} * {}) / {}", a, b, c, d)
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// PPM HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Portion of `amount` given in parts per million, rounded down
pub fn ppm_of(amount: u128, ppm: u32) -> Result<u128> {
    mul_div(amount, ppm as u128, PPM_DIVISOR)
}

/// `amount` minus its ppm portion (the usable part of a mint)
pub fn amount_less_ppm(amount: u128, ppm: u32) -> Result<u128> {
    validate_ppm("ppm", ppm)?;
    mul_div(amount, PPM_DIVISOR - ppm as u128, PPM_DIVISOR)
}

/// Scales `amount` up by `(1 + ppm)`, rounding up
pub fn amount_plus_ppm_up(amount: u128, ppm: u32) -> Result<u128> {
    mul_div_up(amount, PPM_DIVISOR + ppm as u128, PPM_DIVISOR)
}

/// Validate a ppm ratio does not exceed 100%
pub fn validate_ppm(name: &str, ppm: u32) -> Result<()> {
    if ppm as u128 > PPM_DIVISOR {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("{} ppm exceeds 100%", ppm),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL VALUATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Value of a collateral amount at a price with 18 decimals, rounded down
///
/// # Arguments
/// * `collateral` - Collateral amount in raw units
/// * `price` - Stablecoin units per whole collateral unit, scaled by 10^18
pub fn collateral_value(collateral: u128, price: u128) -> Result<u128> {
    mul_div(collateral, price, ONE)
}

/// Pro-rata part of `total` attributable to `part` out of `whole`
///
/// Returns all of `total` when `part >= whole` so full sales settle the
/// complete amount without rounding residue.
pub fn pro_rata(total: u128, part: u128, whole: u128) -> Result<u128> {
    if whole == 0 || part >= whole {
        return Ok(total);
    }
    mul_div(total, part, whole)
}

/// Linear decay of `start_value` to zero over `duration`, evaluated `elapsed`
/// seconds in
pub fn linear_decay(start_value: u128, elapsed: u64, duration: u64) -> Result<u128> {
    if duration == 0 || elapsed >= duration {
        return Ok(0);
    }
    mul_div(start_value, (duration - elapsed) as u128, duration as u128)
}
