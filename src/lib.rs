//! # JuiceDollar
//!
//! A collateralized stablecoin engine. Users lock collateral in minting
//! positions and mint the stablecoin against it; a shared reserve pool backs
//! every position and earns the interest, fees and auction proceeds.
//!
//! ## Architecture
//!
//! - **Core**: parameters, token ledgers, the stablecoin with its minter
//!   registry, the leading rate and savings
//! - **Position**: position records, interest accrual, variants and challenges
//! - **Reserve**: the equity pool, its shares and holding-weighted votes
//! - **Protocol**: the engine that ties everything together, run as atomic
//!   transactions (minting hub, position lifecycle, roller, auto-invest)
//! - **Storage**: snapshot persistence
//!
//! ## Example
//!
//! ```rust,ignore
//! use juicedollar::prelude::*;
//!
//! let mut protocol = Protocol::new(ProtocolParams::default(), 50_000)?;
//! let weth = protocol.create_token("WETH")?;
//! let id = protocol.open_position(owner, PositionParams::new(weth, ONE, 10 * ONE, limit, price))?;
//! protocol.advance_time(3 * SECONDS_PER_DAY);
//! let receipt = protocol.mint(owner, id, owner, 10_000 * ONE)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod cli;
pub mod core;
pub mod error;
pub mod position;
pub mod protocol;
pub mod reserve;
pub mod storage;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        config::ProtocolParams,
        leadrate::Leadrate,
        savings::Savings,
        stablecoin::Stablecoin,
        token::TokenLedger,
    };
    pub use crate::error::{Error, Result};
    pub use crate::position::{
        challenge::{Challenge, ChallengePhase},
        kind::PositionKind,
        position::{Position, PositionId, PositionState},
    };
    pub use crate::protocol::{
        events::ProtocolEvent,
        operations::{OperationResult, PositionParams, ProtocolOperation},
        state_machine::{Protocol, ProtocolState},
    };
    pub use crate::reserve::pool::ReservePool;
    pub use crate::utils::{
        address::Address,
        constants::{ONE, SECONDS_PER_DAY, SECONDS_PER_YEAR},
    };
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "JuiceDollar";
