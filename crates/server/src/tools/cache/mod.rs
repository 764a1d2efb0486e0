//! Cache-related MCP tools.
//!
//! These read and prune the generation store directly, without going
//! through the worker's strategies.

pub mod get;
pub mod purge;

pub use get::{CacheGetParams, get_impl};
pub use purge::{CachePurgeParams, purge_impl};
