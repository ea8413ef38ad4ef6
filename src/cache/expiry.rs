//! In-memory expiry-ordered cache of live credential records.

use crate::core::{CacheError, SessionCredential, SessionKey};
use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Expiry-ordered collection of live credential records.
///
/// Records are keyed by session key and indexed by `(expiry, session key)`
/// so a renewal sweep can walk them earliest-first and stop at the first
/// record not yet due. Mutations go through a single writer lock with a
/// bounded acquisition timeout; lookups take a reader lock and never wait
/// on in-flight I/O because all I/O happens outside the lock.
///
/// The cache performs no I/O itself and owns its records exclusively;
/// renewal replaces records by reference via [`swap`](ExpiryCache::swap),
/// never by field mutation.
pub struct ExpiryCache {
    inner: RwLock<Inner>,
    lock_timeout: Duration,
}

#[derive(Default)]
struct Inner {
    by_key: HashMap<SessionKey, Arc<SessionCredential>>,
    by_expiry: BTreeSet<(DateTime<Utc>, SessionKey)>,
}

impl Inner {
    fn insert(&mut self, record: Arc<SessionCredential>) -> Option<Arc<SessionCredential>> {
        let replaced = self.remove(&record.session_key);
        self.by_expiry
            .insert((record.expires_at, record.session_key.clone()));
        self.by_key.insert(record.session_key.clone(), record);
        replaced
    }

    fn remove(&mut self, key: &SessionKey) -> Option<Arc<SessionCredential>> {
        let prior = self.by_key.remove(key)?;
        self.by_expiry.remove(&(prior.expires_at, prior.session_key.clone()));
        Some(prior)
    }
}

impl ExpiryCache {
    /// Create a cache whose writer lock acquisitions time out after
    /// `lock_timeout`.
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            lock_timeout,
        }
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, CacheError> {
        self.inner
            .try_write_for(self.lock_timeout)
            .ok_or(CacheError::LockTimeout {
                timeout: self.lock_timeout,
            })
    }

    /// Current record for a session key, if any.
    pub fn get(&self, key: &SessionKey) -> Option<Arc<SessionCredential>> {
        self.inner.read().by_key.get(key).cloned()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.inner.read().by_key.len()
    }

    /// Whether the cache holds no records.
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_key.is_empty()
    }

    /// Insert a record, replacing any prior record under the same session
    /// key. Returns the replaced record.
    pub fn add(
        &self,
        record: Arc<SessionCredential>,
    ) -> Result<Option<Arc<SessionCredential>>, CacheError> {
        Ok(self.write()?.insert(record))
    }

    /// Remove and return the record for a session key.
    pub fn remove(&self, key: &SessionKey) -> Result<Option<Arc<SessionCredential>>, CacheError> {
        Ok(self.write()?.remove(key))
    }

    /// Snapshot of all records in ascending expiry order.
    ///
    /// Intended to be consumed left-to-right with early termination: once
    /// a record is not due for renewal, no later record is either.
    pub fn ascending(&self) -> Vec<Arc<SessionCredential>> {
        let inner = self.inner.read();
        inner
            .by_expiry
            .iter()
            .filter_map(|(_, key)| inner.by_key.get(key).cloned())
            .collect()
    }

    /// Atomically replace records by session key under one writer-lock
    /// acquisition, so concurrent readers observe either all old or all
    /// new records of a renewal batch for each key.
    pub fn swap(
        &self,
        replacements: impl IntoIterator<Item = Arc<SessionCredential>>,
    ) -> Result<(), CacheError> {
        let mut inner = self.write()?;
        for record in replacements {
            inner.insert(record);
        }
        Ok(())
    }
}
