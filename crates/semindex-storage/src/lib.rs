//! Semindex storage crate - SQLite-backed record store with capacity eviction.
//!
//! Provides the WAL-mode database handle, schema migrations, and the
//! `RecordStore` that the concurrency queue owns exclusively.

pub mod db;
pub mod migrations;
pub mod store;

pub use db::Database;
pub use store::{decode_embedding, encode_embedding, RecordStore, StoreState};
