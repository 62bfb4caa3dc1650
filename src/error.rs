//! Error types for the JuiceDollar engine.
//!
//! Every failure surfaces immediately to the caller. Public entry points run
//! inside a transaction, so an error also means nothing was applied.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Position Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Position not found in the registry
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    /// Requested mint exceeds the remaining minting headroom
    #[error("Minting limit exceeded: requested {requested}, available {available}")]
    LimitExceeded {
        /// Requested mint amount
        requested: u128,
        /// Remaining headroom of the position family
        available: u128,
    },

    /// Collateral value does not cover the debt after the operation
    #[error("Insufficient collateral: required {required}, available {available}")]
    InsufficientCollateral {
        /// Required collateral value in stablecoin units
        required: u128,
        /// Collateral value available at the position price
        available: u128,
    },

    /// Position has an open challenge
    #[error("Position {0} is challenged")]
    PositionChallenged(String),

    /// Position has expired
    #[error("Position expired at {expiration}")]
    PositionExpired {
        /// Expiration timestamp
        expiration: u64,
    },

    /// Position has not expired yet
    #[error("Position expires at {expiration}, not yet expired")]
    PositionNotExpired {
        /// Expiration timestamp
        expiration: u64,
    },

    /// Position is still in its initialization period
    #[error("Position is initializing until {start}")]
    PositionInitializing {
        /// End of the initialization period
        start: u64,
    },

    /// Position has been closed, denied or liquidated
    #[error("Position {0} is closed")]
    PositionClosed(String),

    /// Minting is restricted after a price increase or averted challenge
    #[error("Minting is restricted until {until}")]
    MintingCooldown {
        /// End of the cooldown
        until: u64,
    },

    /// Price would put the minimum collateral above the minting bounds
    #[error("Price {price} exceeds maximum {max}")]
    PriceTooHigh {
        /// Requested price
        price: u128,
        /// Highest allowed price
        max: u128,
    },

    /// Clone initialization was attempted twice
    #[error("Position already initialized")]
    AlreadyInitialized,

    /// Clone expiration is in the past or after the original's expiration
    #[error("Invalid expiration {requested}: must be in ({now}, {max}]")]
    InvalidExpiration {
        /// Requested expiration
        requested: u64,
        /// Current time
        now: u64,
        /// Expiration of the original position
        max: u64,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Challenge Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Challenge not found
    #[error("Challenge not found: {0}")]
    ChallengeNotFound(u64),

    /// Challenge size below the position's minimum collateral
    #[error("Challenge size {size} below minimum {minimum}")]
    ChallengeTooSmall {
        /// Requested size
        size: u128,
        /// Minimum size
        minimum: u128,
    },

    /// Challenge is still in its averting phase
    #[error("Challenge matures at {matures_at}")]
    ChallengeNotMatured {
        /// End of the averting phase
        matures_at: u64,
    },

    /// An older challenge on the same position must settle first
    #[error("Challenge {pending} on the same position must settle first")]
    ChallengeOutOfOrder {
        /// Oldest pending challenge
        pending: u64,
    },

    /// Challenge has already been fully averted or settled
    #[error("Challenge {0} is already settled")]
    ChallengeSettled(u64),

    // ═══════════════════════════════════════════════════════════════════
    // Reserve, Savings and Rate Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Redemption or transfer exceeds held shares
    #[error("Insufficient share balance: requested {requested}, available {available}")]
    InsufficientShareBalance {
        /// Requested shares
        requested: u128,
        /// Shares held
        available: u128,
    },

    /// Realized amount below the caller's floor
    #[error("Slippage exceeded: expected at least {expected}, got {actual}")]
    SlippageExceeded {
        /// Caller's floor
        expected: u128,
        /// Realized amount
        actual: u128,
    },

    /// Shares were acquired too recently to be redeemed
    #[error("Minimum holding period not elapsed: {remaining}s remaining")]
    MinimumHoldingPeriodNotElapsed {
        /// Seconds until redemption is allowed
        remaining: u64,
    },

    /// Redemption would remove the locked genesis shares
    #[error("Redemption of {requested} shares leaves fewer than {minimum} outstanding")]
    TooManySharesRedeemed {
        /// Requested shares
        requested: u128,
        /// Minimum outstanding shares
        minimum: u128,
    },

    /// Outstanding shares are backed by no equity
    #[error("Reserve equity exhausted: {shares} shares outstanding with no equity")]
    EquityExhausted {
        /// Shares outstanding
        shares: u128,
    },

    /// Savings deposits are disabled while the rate is zero
    #[error("Savings module disabled: leading rate is zero with no increase scheduled")]
    ModuleDisabled,

    /// No rate change proposal is pending
    #[error("No pending rate change")]
    NoPendingChange,

    /// The pending rate change has not matured yet
    #[error("Rate change not ready until {ready_at}")]
    ChangeNotReady {
        /// Timestamp at which the change may be applied
        ready_at: u64,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Authorization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Caller lacks the required role
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Address is not an active minter
    #[error("Not a minter: {0}")]
    NotMinter(String),

    /// Minter application does not satisfy period or fee minimums
    #[error("Minter application rejected: {0}")]
    ApplicationRejected(String),

    /// Old and new position are wired to different hubs or collateral
    #[error("Roller mismatch: {0}")]
    RollerMismatch(String),

    /// Share target is a contract of the wrong kind
    #[error("Target {0} is not an interest-free position")]
    TargetTypeMismatch(String),

    /// Zero address supplied as a target
    #[error("Zero address")]
    ZeroAddress,

    /// Target address holds no contract
    #[error("Target {0} is not a contract")]
    NotAContract(String),

    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Amount is zero
    #[error("Amount cannot be zero")]
    ZeroAmount,

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Token Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Underlying token movement failed
    #[error("Transfer of {token} failed: {reason}")]
    TransferFailed {
        /// Token symbol
        token: String,
        /// Failure reason
        reason: String,
    },

    /// Unknown token address
    #[error("Unknown token: {0}")]
    UnknownToken(String),

    // ═══════════════════════════════════════════════════════════════════
    // Serialization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Returns true if the caller can retry after changing inputs or waiting
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientCollateral { .. }
                | Error::LimitExceeded { .. }
                | Error::SlippageExceeded { .. }
                | Error::MinimumHoldingPeriodNotElapsed { .. }
                | Error::ChangeNotReady { .. }
                | Error::ChallengeNotMatured { .. }
                | Error::MintingCooldown { .. }
                | Error::TransferFailed { .. }
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::Overflow { .. } | Error::Underflow { .. } | Error::Storage(_)
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Position errors: 1xxx
            Error::PositionNotFound(_) => 1001,
            Error::LimitExceeded { .. } => 1002,
            Error::InsufficientCollateral { .. } => 1003,
            Error::PositionChallenged(_) => 1004,
            Error::PositionExpired { .. } => 1005,
            Error::PositionNotExpired { .. } => 1006,
            Error::PositionInitializing { .. } => 1007,
            Error::PositionClosed(_) => 1008,
            Error::MintingCooldown { .. } => 1009,
            Error::PriceTooHigh { .. } => 1010,
            Error::AlreadyInitialized => 1011,
            Error::InvalidExpiration { .. } => 1012,

            // Challenge errors: 2xxx
            Error::ChallengeNotFound(_) => 2001,
            Error::ChallengeTooSmall { .. } => 2002,
            Error::ChallengeNotMatured { .. } => 2003,
            Error::ChallengeOutOfOrder { .. } => 2004,
            Error::ChallengeSettled(_) => 2005,

            // Reserve, savings and rate errors: 3xxx
            Error::InsufficientShareBalance { .. } => 3001,
            Error::SlippageExceeded { .. } => 3002,
            Error::MinimumHoldingPeriodNotElapsed { .. } => 3003,
            Error::TooManySharesRedeemed { .. } => 3004,
            Error::ModuleDisabled => 3005,
            Error::NoPendingChange => 3006,
            Error::ChangeNotReady { .. } => 3007,
            Error::EquityExhausted { .. } => 3008,

            // Authorization errors: 4xxx
            Error::Unauthorized(_) => 4001,
            Error::NotMinter(_) => 4002,
            Error::ApplicationRejected(_) => 4003,
            Error::RollerMismatch(_) => 4004,
            Error::TargetTypeMismatch(_) => 4005,
            Error::ZeroAddress => 4006,
            Error::NotAContract(_) => 4007,

            // Validation errors: 5xxx
            Error::InvalidParameter { .. } => 5001,
            Error::ZeroAmount => 5002,
            Error::Overflow { .. } => 5003,
            Error::Underflow { .. } => 5004,

            // Token errors: 6xxx
            Error::TransferFailed { .. } => 6001,
            Error::UnknownToken(_) => 6002,

            // Serialization errors: 7xxx
            Error::Serialization(_) => 7001,
            Error::Deserialization(_) => 7002,

            // Internal errors: 9xxx
            Error::Storage(_) => 9003,
        }
    }
}
