//! Core types and shared functionality for casa-sw.
//!
//! This crate provides:
//! - Generation-keyed response cache and sync task storage with SQLite backend
//! - Request/response descriptors shared by every worker component
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod http;

pub use cache::{CacheDb, CacheHandle, SyncKind, SyncTask};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use http::{RequestDescriptor, RequestDestination, StoredResponse};
