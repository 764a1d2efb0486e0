//! SQLite-backed cache generations and sync task storage.
//!
//! This module provides a persistent store using SQLite with async access via
//! tokio-rusqlite. It supports:
//!
//! - Named, versioned generations of request -> response entries
//! - Request identity keyed by SHA-256 of method and URL
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Predicate purge of whole generations
//! - A durable queue of sync tasks

pub mod connection;
pub mod generations;
pub mod hash;
pub mod migrations;
pub mod sync_tasks;

pub use crate::Error;

pub use connection::CacheDb;
pub use generations::CacheHandle;
pub use sync_tasks::{SyncKind, SyncTask};
