//! Human-readable rendering of raw amounts, ratios and timestamps.

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

use crate::utils::constants::{ONE, PPM_DIVISOR, TOKEN_DECIMALS};

/// Render a raw 18-decimal amount as a decimal string with trailing zeros removed
pub fn format_amount(raw: u128) -> String {
    match i128::try_from(raw)
        .ok()
        .and_then(|v| Decimal::try_from_i128_with_scale(v, TOKEN_DECIMALS as u32).ok())
    {
        Some(d) => d.normalize().to_string(),
        // Beyond 96 bits of mantissa: whole units only
        None => format!("{}", raw / ONE),
    }
}

/// Render a ppm ratio as a percentage
pub fn format_ppm(ppm: u32) -> String {
    let pct = Decimal::from(ppm) * Decimal::from(100) / Decimal::from(PPM_DIVISOR as u64);
    format!("{}%", pct.normalize())
}

/// Render a unix timestamp in RFC 3339
pub fn format_timestamp(ts: u64) -> String {
    match i64::try_from(ts).ok().and_then(|t| Utc.timestamp_opt(t, 0).single()) {
        Some(dt) => dt.to_rfc3339(),
        None => ts.to_string(),
    }
}

/// Render a duration in seconds as days/hours
pub fn format_duration(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    match (days, hours) {
        (0, 0) => format!("{}s", seconds),
        (0, h) => format!("{}h", h),
        (d, 0) => format!("{}d", d),
        (d, h) => format!("{}d {}h", d, h),
    }
}
