//! Protocol engine.
//!
//! `ProtocolState` owns every ledger of the system. Its operations are
//! split by concern across the files of this module, each adding an
//! `impl ProtocolState` block. `Protocol` wraps the state and runs every
//! operation as an atomic transaction.

pub mod auto_invest;
pub mod events;
pub mod governance;
pub mod hub;
pub mod lifecycle;
pub mod operations;
pub mod roller;
pub mod state_machine;

#[cfg(test)]
pub(crate) mod fixtures;

pub use events::*;
pub use operations::*;
pub use state_machine::*;
