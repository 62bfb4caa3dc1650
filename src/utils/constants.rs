//! Protocol constants and magic numbers.
//!
//! All protocol-wide constants are defined here for easy auditing. The tunable
//! ones are defaults for [`crate::core::config::ProtocolParams`].

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Token decimals (stablecoin, shares and default collateral)
pub const TOKEN_DECIMALS: u8 = 18;

/// One whole token in raw units (10^18)
pub const ONE: u128 = 1_000_000_000_000_000_000;

/// Parts-per-million divisor (1_000_000 = 100%)
pub const PPM_DIVISOR: u128 = 1_000_000;

/// Basis points divisor (10_000 = 100%)
pub const BPS_DIVISOR: u128 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// TIME
// ═══════════════════════════════════════════════════════════════════════════════

/// Seconds per day
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Seconds per year used for interest (365 days)
pub const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;

// ═══════════════════════════════════════════════════════════════════════════════
// MINTING HUB
// ═══════════════════════════════════════════════════════════════════════════════

/// Fee for opening a new position, paid into the reserve - 1,000 units
pub const OPENING_FEE: u128 = 1_000 * ONE;

/// Minimum initialization period of a new position - 3 days
pub const MIN_INIT_PERIOD: u64 = 3 * SECONDS_PER_DAY;

/// Minimum value of the minimum collateral at the liquidation price - 100 units
pub const MIN_POSITION_VALUE: u128 = 100 * ONE;

/// Challenger reward - 2% of the challenged volume
pub const CHALLENGER_REWARD_PPM: u32 = 20_000;

/// Cooldown for a price increase that doubles the price - 3 days
pub const PRICE_INCREASE_COOLDOWN: u64 = 3 * SECONDS_PER_DAY;

/// Shortest cooldown after any price increase - 1 day
pub const MIN_PRICE_COOLDOWN: u64 = SECONDS_PER_DAY;

/// Minting restriction after an averted challenge - 1 day
pub const AVERTED_CHALLENGE_COOLDOWN: u64 = SECONDS_PER_DAY;

/// Expired collateral starts selling at this multiple of the liquidation price
pub const EXPIRED_PRICE_FACTOR: u128 = 10;

/// Extra collateral required above the debt, in ppm (none by default)
pub const COLLATERAL_BUFFER_PPM: u32 = 0;

// ═══════════════════════════════════════════════════════════════════════════════
// RESERVE POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Share price when no shares exist (1.0)
pub const GENESIS_SHARE_PRICE: u128 = ONE;

/// Shares locked in the pool at genesis so the supply never returns to zero
pub const GENESIS_LOCKED_SHARES: u128 = 1_000_000_000_000_000;

/// Minimum holding period before redemption - 90 days
pub const MIN_HOLDING_PERIOD: u64 = 90 * SECONDS_PER_DAY;

/// Fee retained by the pool on investments (0.3%)
pub const INVEST_FEE_PPM: u32 = 3_000;

/// Fee retained by the pool on redemptions (0.3%)
pub const REDEEM_FEE_PPM: u32 = 3_000;

/// Share of total votes needed to be qualified (2%)
pub const QUORUM_BPS: u32 = 200;

// ═══════════════════════════════════════════════════════════════════════════════
// GOVERNANCE
// ═══════════════════════════════════════════════════════════════════════════════

/// Delay before a proposed leading rate takes effect - 7 days
pub const RATE_CHANGE_DELAY: u64 = 7 * SECONDS_PER_DAY;

/// Minimum minter application period - 14 days
pub const MIN_APPLICATION_PERIOD: u64 = 14 * SECONDS_PER_DAY;

/// Minimum minter application fee - 1,000 units
pub const MIN_APPLICATION_FEE: u128 = 1_000 * ONE;

// ═══════════════════════════════════════════════════════════════════════════════
// ADDRESSES
// ═══════════════════════════════════════════════════════════════════════════════

/// Length of an account address in bytes
pub const ADDRESS_LENGTH: usize = 20;

// ═══════════════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum number of events kept in memory
pub const MAX_EVENTS: usize = 10_000;
