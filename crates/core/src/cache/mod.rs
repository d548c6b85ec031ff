//! SQLite-backed, versioned response cache.
//!
//! This module provides the persistent store the engine reads and writes
//! request/response pairs through. It supports:
//!
//! - One named generation per [`CacheVersion`], entries owned by exactly one
//! - Content-addressed entry keys using SHA-256 over the request identity
//! - Automatic schema migrations
//! - Bulk eviction of whole versions by predicate

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod store;
pub mod versions;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheEntry, CachedResponse, RequestIdentity};
pub use store::CacheStore;
pub use versions::CacheVersion;
