//! Minting positions.
//!
//! This module contains the position record and everything that lives next
//! to it:
//! - Interest accrual
//! - Position variants and their behavior table
//! - Challenges
//! - The position arena

pub mod challenge;
pub mod interest;
pub mod kind;
#[allow(clippy::module_inception)]
pub mod position;
pub mod registry;

pub use challenge::*;
pub use interest::*;
pub use kind::*;
pub use position::*;
pub use registry::*;
