//! Reserve pool: the shared equity backing all positions.
//!
//! Minting fees, interest and opening fees flow in as profit; challenge
//! deficits and savings interest flow out. Shareholders own the equity and
//! govern the protocol with holding-weighted votes.

pub mod pool;

pub use pool::*;
