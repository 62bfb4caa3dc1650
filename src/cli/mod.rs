//! Support code for the `juice` simulator binary.
//!
//! Configuration, scripted scenarios and output formatting live here so the
//! binary stays a thin argument parser.

pub mod config;
pub mod output;
pub mod scenario;

pub use config::*;
pub use output::*;
pub use scenario::*;

use std::path::Path;

use crate::error::Result;
use crate::protocol::state_machine::Protocol;
use crate::storage::backend::{FileStore, TypedStore};

/// Persist `protocol` into a file store at `dir`
pub fn persist(protocol: &Protocol, dir: &Path) -> Result<()> {
    let store = TypedStore::new(FileStore::new(dir)?);
    protocol.save_to(&store)
}

/// Restore a protocol persisted at `dir`
pub fn restore(dir: &Path) -> Result<Protocol> {
    let store = TypedStore::new(FileStore::new(dir)?);
    Protocol::load_from(&store)
}

/// Views of every position, ordered by id
pub fn position_views(protocol: &Protocol) -> Vec<PositionView> {
    protocol
        .state()
        .positions
        .iter()
        .map(|p| PositionView::new(protocol, p))
        .collect()
}
