//! Lazy interest accrual.

use crate::error::Result;
use crate::utils::constants::{PPM_DIVISOR, SECONDS_PER_YEAR};
use crate::utils::math::mul_mul_div;

/// Interest on `principal` at `rate_ppm` per year over `elapsed` seconds, truncated
pub fn accrued_interest(principal: u128, rate_ppm: u32, elapsed: u64) -> Result<u128> {
    if principal == 0 || rate_ppm == 0 || elapsed == 0 {
        return Ok(0);
    }
    mul_mul_div(
        principal,
        rate_ppm as u128,
        elapsed as u128,
        PPM_DIVISOR * SECONDS_PER_YEAR as u128,
    )
}
