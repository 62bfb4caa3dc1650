//! Protocol parameters.
//!
//! Every tunable number of the engine lives in [`ProtocolParams`]. The
//! defaults mirror [`crate::utils::constants`]; tests and the simulator
//! override individual values with the `with_*` builders or a JSON file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::utils::constants::*;

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Tunable protocol parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    /// Protocol version
    pub version: String,

    /// Fee for opening a position, paid into the reserve as profit
    pub opening_fee: u128,

    /// Minimum initialization period of a new position in seconds
    pub min_init_period: u64,

    /// Minimum value of the minimum collateral at the liquidation price
    pub min_position_value: u128,

    /// Challenger reward in ppm of the challenged volume
    pub challenger_reward_ppm: u32,

    /// Cooldown for a price increase that doubles the price
    pub price_increase_cooldown: u64,

    /// Shortest cooldown after any price increase
    pub min_price_cooldown: u64,

    /// Minting restriction after an averted challenge
    pub averted_challenge_cooldown: u64,

    /// Minting restriction after a successful challenge
    pub liquidation_cooldown: u64,

    /// Multiple of the liquidation price at which expired collateral starts selling
    pub expired_price_factor: u128,

    /// Collateral buffer above the debt in ppm
    pub collateral_buffer_ppm: u32,

    /// Fee retained by the reserve on investments in ppm
    pub invest_fee_ppm: u32,

    /// Fee retained by the reserve on redemptions in ppm
    pub redeem_fee_ppm: u32,

    /// Minimum share holding period before redemption in seconds
    pub min_holding_period: u64,

    /// Delay before a proposed leading rate can be applied
    pub rate_change_delay: u64,

    /// Share of total votes needed to be qualified, in basis points
    pub quorum_bps: u32,

    /// Minimum minter application period
    pub min_application_period: u64,

    /// Minimum minter application fee
    pub min_application_fee: u128,

    /// Maximum number of events kept in the log
    pub max_events: usize,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            opening_fee: OPENING_FEE,
            min_init_period: MIN_INIT_PERIOD,
            min_position_value: MIN_POSITION_VALUE,
            challenger_reward_ppm: CHALLENGER_REWARD_PPM,
            price_increase_cooldown: PRICE_INCREASE_COOLDOWN,
            min_price_cooldown: MIN_PRICE_COOLDOWN,
            averted_challenge_cooldown: AVERTED_CHALLENGE_COOLDOWN,
            liquidation_cooldown: PRICE_INCREASE_COOLDOWN,
            expired_price_factor: EXPIRED_PRICE_FACTOR,
            collateral_buffer_ppm: COLLATERAL_BUFFER_PPM,
            invest_fee_ppm: INVEST_FEE_PPM,
            redeem_fee_ppm: REDEEM_FEE_PPM,
            min_holding_period: MIN_HOLDING_PERIOD,
            rate_change_delay: RATE_CHANGE_DELAY,
            quorum_bps: QUORUM_BPS,
            min_application_period: MIN_APPLICATION_PERIOD,
            min_application_fee: MIN_APPLICATION_FEE,
            max_events: MAX_EVENTS,
        }
    }
}

impl ProtocolParams {
    /// Set reserve investment and redemption fees (for testing)
    pub fn with_share_fees(mut self, invest_ppm: u32, redeem_ppm: u32) -> Self {
        self.invest_fee_ppm = invest_ppm;
        self.redeem_fee_ppm = redeem_ppm;
        self
    }

    /// Set the opening fee (for testing)
    pub fn with_opening_fee(mut self, fee: u128) -> Self {
        self.opening_fee = fee;
        self
    }

    /// Set the collateral buffer
    pub fn with_collateral_buffer(mut self, buffer_ppm: u32) -> Self {
        self.collateral_buffer_ppm = buffer_ppm;
        self
    }

    /// Set the minimum holding period (for testing)
    pub fn with_holding_period(mut self, seconds: u64) -> Self {
        self.min_holding_period = seconds;
        self
    }

    /// Validate parameters are consistent
    pub fn validate(&self) -> Result<()> {
        let ppm_fields = [
            ("challenger_reward_ppm", self.challenger_reward_ppm),
            ("invest_fee_ppm", self.invest_fee_ppm),
            ("redeem_fee_ppm", self.redeem_fee_ppm),
        ];
        for (name, value) in ppm_fields {
            if value as u128 >= PPM_DIVISOR {
                return Err(invalid(name, "must be below 100%"));
            }
        }
        if self.quorum_bps == 0 || self.quorum_bps as u128 > BPS_DIVISOR {
            return Err(invalid("quorum_bps", "must be in (0, 10000]"));
        }
        if self.min_price_cooldown > self.price_increase_cooldown {
            return Err(invalid(
                "min_price_cooldown",
                "must not exceed price_increase_cooldown",
            ));
        }
        if self.expired_price_factor == 0 {
            return Err(invalid("expired_price_factor", "must be at least 1"));
        }
        if self.rate_change_delay == 0 {
            return Err(invalid("rate_change_delay", "must be positive"));
        }
        if self.max_events == 0 {
            return Err(invalid("max_events", "must be positive"));
        }
        Ok(())
    }

    /// Load parameters from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Storage(e.to_string()))?;
        let params: Self =
            serde_json::from_str(&content).map_err(|e| Error::Deserialization(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Save parameters as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Storage(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| Error::Storage(e.to_string()))
    }
}

fn invalid(name: &str, reason: &str) -> Error {
    Error::InvalidParameter {
        name: name.into(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_params_default() {
        let params = ProtocolParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.opening_fee, OPENING_FEE);
        assert_eq!(params.min_holding_period, 90 * SECONDS_PER_DAY);
    }

    #[test]
    fn test_builders() {
        let params = ProtocolParams::default()
            .with_share_fees(0, 0)
            .with_opening_fee(0)
            .with_collateral_buffer(100_000);
        assert_eq!(params.invest_fee_ppm, 0);
        assert_eq!(params.opening_fee, 0);
        assert_eq!(params.collateral_buffer_ppm, 100_000);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut params = ProtocolParams::default();
        params.redeem_fee_ppm = 1_000_000;
        assert!(params.validate().is_err());

        let mut params = ProtocolParams::default();
        params.quorum_bps = 0;
        assert!(params.validate().is_err());

        let mut params = ProtocolParams::default();
        params.min_price_cooldown = params.price_increase_cooldown + 1;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let params: ProtocolParams = serde_json::from_str(r#"{"invest_fee_ppm": 0}"#).unwrap();
        assert_eq!(params.invest_fee_ppm, 0);
        assert_eq!(params.redeem_fee_ppm, REDEEM_FEE_PPM);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        let params = ProtocolParams::default().with_opening_fee(5 * ONE);

        params.save(&path).unwrap();
        let loaded = ProtocolParams::load(&path).unwrap();
        assert_eq!(loaded, params);
    }
}
