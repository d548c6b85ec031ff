//! Core types and shared functionality for waypost.
//!
//! This crate provides:
//! - Versioned response cache with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheEntry, CacheStore, CacheVersion, CachedResponse, RequestIdentity};
pub use config::{AppConfig, ConfigError, RouteConfig, RoutePattern};
pub use error::Error;
