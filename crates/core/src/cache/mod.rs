//! SQLite-backed result store.
//!
//! Stores one record per normalized URL key, holding capture timestamp ->
//! simhash fields and a whole-record expiry, accessed asynchronously through
//! tokio-rusqlite. It supports:
//!
//! - Hash-map style field access (set, get, keys, multi-get)
//! - Per-record time-to-live with lazy invisibility and explicit purge
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod captures;
pub mod connection;
pub mod key;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use key::url_key;
