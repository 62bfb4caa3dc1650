//! Utility modules for the JuiceDollar engine.
//!
//! This module contains shared utilities used across the engine:
//! - Addresses and hashes
//! - Fixed-point arithmetic
//! - Formatting helpers
//! - Constants

pub mod address;
pub mod constants;
pub mod format;
pub mod math;

pub use address::*;
pub use constants::*;
pub use format::*;
pub use math::*;
