//! Cache versions: named generations of the store.
//!
//! Exactly one version is current for a running engine; every other
//! version present in the database is stale and eligible for eviction.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

use super::connection::CacheDb;
use super::store::CacheStore;
use crate::Error;

/// Opaque name of one cache generation, e.g. `app-v2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(transparent)]
pub struct CacheVersion(String);

impl CacheVersion {
    /// Create a version from a name. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidVersion` if the name is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidVersion("cache version must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl CacheDb {
    /// Create (if needed) and return the store for a version.
    ///
    /// Idempotent: opening an existing version leaves its entries alone.
    pub async fn open_store(&self, version: &CacheVersion) -> Result<CacheStore, Error> {
        let name = version.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO cache_versions (name, created_at) VALUES (?1, ?2)",
                    params![name, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(CacheStore::new(self.clone(), version.clone()))
    }

    /// List every version currently present, oldest first.
    pub async fn list_versions(&self) -> Result<Vec<CacheVersion>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<CacheVersion>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_versions ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names.into_iter().map(CacheVersion).collect())
            })
            .await
            .map_err(Error::from)
    }

    /// Check whether a version is present.
    pub async fn has_version(&self, version: &CacheVersion) -> Result<bool, Error> {
        let name = version.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_versions WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every version the predicate selects, with all of its entries.
    ///
    /// Runs in one transaction. Returns the versions that were removed.
    pub async fn delete_versions_where<F>(&self, predicate: F) -> Result<Vec<CacheVersion>, Error>
    where
        F: Fn(&CacheVersion) -> bool + Send + 'static,
    {
        self.conn
            .call(move |conn| -> Result<Vec<CacheVersion>, Error> {
                let tx = conn.transaction()?;
                let doomed: Vec<CacheVersion> = {
                    let mut stmt = tx.prepare("SELECT name FROM cache_versions")?;
                    let names = stmt
                        .query_map([], |row| row.get::<_, String>(0))?
                        .collect::<Result<Vec<_>, _>>()?;
                    names.into_iter().map(CacheVersion).filter(|v| predicate(v)).collect()
                };

                for version in &doomed {
                    tx.execute("DELETE FROM cache_versions WHERE name = ?1", params![version.as_str()])?;
                }
                tx.commit()?;
                Ok(doomed)
            })
            .await
            .map_err(Error::from)
    }
}
