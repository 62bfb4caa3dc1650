//! Core ledgers and parameters.
//!
//! - Protocol parameters and their validation
//! - Token ledgers for the stablecoin and collateral assets
//! - The stablecoin with its minter registry and reserve accounting
//! - The leading rate and the savings module paying it

pub mod config;
pub mod leadrate;
pub mod savings;
pub mod stablecoin;
pub mod token;

pub use config::*;
pub use leadrate::*;
pub use savings::*;
pub use stablecoin::*;
pub use token::*;
