//! Persistence for engine snapshots.
//!
//! A snapshot is written as one entry per position (`pos:<id>`) plus one
//! entry for everything else (`state:engine`), so a single position can be
//! read back without decoding the whole engine.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use juicedollar::storage::{FileStore, TypedStore};
//!
//! let store = TypedStore::new(FileStore::new("./juice-data")?);
//! protocol.save_to(&store)?;
//! let restored = Protocol::load_from(&store)?;
//! ```

pub mod backend;

pub use backend::*;
