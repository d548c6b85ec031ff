//! Cache entry rows: request identity to response snapshot.
//!
//! An entry is written whole and never patched; a second write for the same
//! identity in the same version replaces the first.

use serde::{Deserialize, Serialize};
use tokio_rusqlite::{params, rusqlite};

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use super::versions::CacheVersion;
use crate::Error;

/// The key a cache entry is addressed by.
///
/// Method is upper-cased, header names lower-cased, and vary headers kept
/// sorted so equal requests always produce equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIdentity {
    pub method: String,
    pub url: String,
    pub vary: Vec<(String, String)>,
}

impl RequestIdentity {
    pub fn new(method: impl AsRef<str>, url: impl Into<String>) -> Self {
        Self { method: method.as_ref().to_ascii_uppercase(), url: url.into(), vary: Vec::new() }
    }

    /// Add a header that participates in identity.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        let name = name.as_ref().to_ascii_lowercase();
        self.vary.retain(|(n, _)| *n != name);
        self.vary.push((name, value.into()));
        self.vary.sort();
        self
    }

    /// Content-addressed storage key for this identity.
    pub fn key(&self) -> String {
        let vary = self
            .vary
            .iter()
            .map(|(name, value)| format!("{name}:{value}"))
            .collect::<Vec<_>>()
            .join("\n");
        compute_cache_key(&self.method, &self.url, &vary)
    }
}

/// Byte-for-byte copy of a response, taken when it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

type EntryRow = (String, String, String, u16, String, Vec<u8>, String);

/// A stored (identity, response) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub version: CacheVersion,
    pub identity: RequestIdentity,
    pub response: CachedResponse,
    pub stored_at: String,
}

impl CacheDb {
    /// Insert or replace an entry in a version.
    ///
    /// The version row is created in the same transaction, so an entry is
    /// never visible without its owner and a failed write leaves nothing.
    pub async fn upsert_entry(
        &self, version: &CacheVersion, identity: &RequestIdentity, response: &CachedResponse,
    ) -> Result<(), Error> {
        let version = version.as_str().to_string();
        let key = identity.key();
        let method = identity.method.clone();
        let url = identity.url.clone();
        let vary_json = serde_json::to_string(&identity.vary)?;
        let headers_json = serde_json::to_string(&response.headers)?;
        let status = response.status;
        let body = response.body.clone();
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO cache_versions (name, created_at) VALUES (?1, ?2)",
                    params![&version, &now],
                )?;
                tx.execute(
                    "INSERT INTO cache_entries (
                    version, key, method, url, vary_json, status, headers_json, body, stored_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(version, key) DO UPDATE SET
                    method = excluded.method,
                    url = excluded.url,
                    vary_json = excluded.vary_json,
                    status = excluded.status,
                    headers_json = excluded.headers_json,
                    body = excluded.body,
                    stored_at = excluded.stored_at",
                    params![&version, &key, &method, &url, &vary_json, status, &headers_json, &body, &now],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry by identity from one version.
    ///
    /// Returns None if the version holds no entry for the identity.
    pub async fn get_entry(&self, version: &CacheVersion, identity: &RequestIdentity) -> Result<Option<CacheEntry>, Error> {
        let name = version.as_str().to_string();
        let key = identity.key();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let result = conn.query_row(
                    "SELECT method, url, vary_json, status, headers_json, body, stored_at
                    FROM cache_entries WHERE version = ?1 AND key = ?2",
                    params![name, key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?)),
                );

                match result {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((method, url, vary_json, status, headers_json, body, stored_at)) = row else {
            return Ok(None);
        };

        Ok(Some(CacheEntry {
            version: version.clone(),
            identity: RequestIdentity { method, url, vary: serde_json::from_str(&vary_json)? },
            response: CachedResponse { status, headers: serde_json::from_str(&headers_json)?, body },
            stored_at,
        }))
    }

    /// Number of entries held by one version.
    pub async fn count_version_entries(&self, version: &CacheVersion) -> Result<u64, Error> {
        let name = version.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM cache_entries WHERE version = ?1", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries across every version.
    pub async fn count_entries(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_response(status: u16, body: &str) -> CachedResponse {
        CachedResponse {
            status,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_identity_normalizes() {
        let a = RequestIdentity::new("get", "https://example.com/")
            .with_header("Accept-Language", "en")
            .with_header("X-Variant", "b");
        let b = RequestIdentity::new("GET", "https://example.com/")
            .with_header("x-variant", "b")
            .with_header("accept-language", "en");
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_identity_header_replaces() {
        let identity = RequestIdentity::new("GET", "https://example.com/")
            .with_header("accept-language", "en")
            .with_header("Accept-Language", "de");
        assert_eq!(identity.vary, vec![("accept-language".to_string(), "de".to_string())]);
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let version = CacheVersion::new("app-v1").unwrap();
        let identity = RequestIdentity::new("GET", "https://example.com/manifest.json");
        let response = make_response(200, "{}");

        db.upsert_entry(&version, &identity, &response).await.unwrap();

        let entry = db.get_entry(&version, &identity).await.unwrap().unwrap();
        assert_eq!(entry.identity, identity);
        assert_eq!(entry.response, response);
        assert_eq!(entry.version, version);
    }

    #[tokio::test]
    async fn test_upsert_last_write_wins() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let version = CacheVersion::new("app-v1").unwrap();
        let identity = RequestIdentity::new("GET", "https://example.com/app");

        db.upsert_entry(&version, &identity, &make_response(200, "first"))
            .await
            .unwrap();
        db.upsert_entry(&version, &identity, &make_response(200, "second"))
            .await
            .unwrap();

        assert_eq!(db.count_version_entries(&version).await.unwrap(), 1);
        let entry = db.get_entry(&version, &identity).await.unwrap().unwrap();
        assert_eq!(entry.response.body, b"second".to_vec());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let version = CacheVersion::new("app-v1").unwrap();
        let result = db
            .get_entry(&version, &RequestIdentity::new("GET", "https://example.com/nope"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_versions_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let v1 = CacheVersion::new("app-v1").unwrap();
        let v2 = CacheVersion::new("app-v2").unwrap();
        let identity = RequestIdentity::new("GET", "https://example.com/app.css");

        db.upsert_entry(&v1, &identity, &make_response(200, "old")).await.unwrap();

        assert!(db.get_entry(&v2, &identity).await.unwrap().is_none());
        assert_eq!(db.count_entries().await.unwrap(), 1);
    }
}
