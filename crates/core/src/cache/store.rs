//! Handle to the store of a single cache version.
//!
//! `try_*` methods surface storage errors. `get` and `put` are the forms the
//! request path uses: a storage failure is logged and reads as a miss or a
//! skipped write, never as a failed response.

use super::connection::CacheDb;
use super::entries::{CacheEntry, CachedResponse, RequestIdentity};
use super::versions::CacheVersion;
use crate::Error;

/// Largest response body stored by default (25MB).
pub const DEFAULT_MAX_ENTRY_BYTES: usize = 25 * 1024 * 1024;

/// Store for one [`CacheVersion`].
#[derive(Clone, Debug)]
pub struct CacheStore {
    db: CacheDb,
    version: CacheVersion,
    max_entry_bytes: usize,
}

impl CacheStore {
    /// Create a handle without touching the database.
    ///
    /// The version row is created lazily by the first write; use
    /// [`CacheDb::open_store`] to create it eagerly.
    pub fn new(db: CacheDb, version: CacheVersion) -> Self {
        Self { db, version, max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES }
    }

    /// Set the largest body this store accepts.
    pub fn with_max_entry_bytes(mut self, max_entry_bytes: usize) -> Self {
        self.max_entry_bytes = max_entry_bytes;
        self
    }

    pub fn version(&self) -> &CacheVersion {
        &self.version
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    /// Look up an entry, surfacing storage errors.
    pub async fn try_get(&self, identity: &RequestIdentity) -> Result<Option<CacheEntry>, Error> {
        self.db.get_entry(&self.version, identity).await
    }

    /// Look up an entry. Storage errors are logged and read as a miss.
    pub async fn get(&self, identity: &RequestIdentity) -> Option<CacheEntry> {
        match self.try_get(identity).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(version = %self.version, url = %identity.url, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a response, surfacing storage errors.
    ///
    /// # Errors
    ///
    /// Returns `Error::QuotaExceeded` if the body is larger than the
    /// configured limit, or a database error if the write fails.
    pub async fn try_put(&self, identity: &RequestIdentity, response: CachedResponse) -> Result<(), Error> {
        if response.body.len() > self.max_entry_bytes {
            return Err(Error::QuotaExceeded(format!(
                "{} bytes exceeds {}",
                response.body.len(),
                self.max_entry_bytes
            )));
        }
        self.db.upsert_entry(&self.version, identity, &response).await
    }

    /// Store a response. Failures are logged and the write is skipped.
    ///
    /// Returns whether the entry was stored.
    pub async fn put(&self, identity: &RequestIdentity, response: CachedResponse) -> bool {
        match self.try_put(identity, response).await {
            Ok(()) => {
                tracing::debug!(version = %self.version, url = %identity.url, "cached response");
                true
            }
            Err(e) => {
                tracing::warn!(version = %self.version, url = %identity.url, error = %e, "cache write skipped");
                false
            }
        }
    }

    /// Number of entries in this version.
    pub async fn len(&self) -> Result<u64, Error> {
        self.db.count_version_entries(&self.version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &[u8]) -> CachedResponse {
        CachedResponse { status: 200, headers: vec![], body: body.to_vec() }
    }

    async fn store() -> CacheStore {
        let db = CacheDb::open_in_memory().await.unwrap();
        CacheStore::new(db, CacheVersion::new("app-v1").unwrap())
    }

    #[tokio::test]
    async fn test_put_creates_version_lazily() {
        let store = store().await;
        assert!(!store.db().has_version(store.version()).await.unwrap());

        let identity = RequestIdentity::new("GET", "https://example.com/a.js");
        assert!(store.put(&identity, response(b"a")).await);

        assert!(store.db().has_version(store.version()).await.unwrap());
        assert_eq!(store.get(&identity).await.unwrap().response.body, b"a".to_vec());
    }

    #[tokio::test]
    async fn test_put_over_quota_is_noop() {
        let store = store().await.with_max_entry_bytes(4);
        let identity = RequestIdentity::new("GET", "https://example.com/big.bin");

        let err = store.try_put(&identity, response(b"12345")).await.unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded(_)));

        assert!(!store.put(&identity, response(b"12345")).await);
        assert!(store.get(&identity).await.is_none());
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_at_quota_boundary() {
        let store = store().await.with_max_entry_bytes(4);
        let identity = RequestIdentity::new("GET", "https://example.com/ok.bin");
        assert!(store.put(&identity, response(b"1234")).await);
    }

    #[tokio::test]
    async fn test_put_survives_full_purge() {
        let store = store().await;
        let identity = RequestIdentity::new("GET", "https://example.com/a.js");
        store.put(&identity, response(b"a")).await;

        store.db().delete_versions_where(|_| true).await.unwrap();
        assert!(store.get(&identity).await.is_none());

        assert!(store.put(&identity, response(b"b")).await);
        assert_eq!(store.get(&identity).await.unwrap().response.body, b"b".to_vec());
    }
}
