//! TTL key-value storage for ephemeral protocol state
//!
//! Codes, challenges, device codes, PAR requests, DPoP jtis, refresh
//! families, and revocation markers all live behind [`TtlStore`]. Records
//! are stored as JSON strings so the trait stays object-safe; callers own
//! the (de)serialization of their record types.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait TtlStore: Send + Sync {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError>;
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn delete(&self, key: &str) -> Result<(), KvError>;
    /// Insert only when the key is absent (or expired). Returns whether the
    /// insert happened. This is the primitive behind single-use jti records.
    async fn put_if_absent(&self, key: &str, value: String, ttl: Duration)
        -> Result<bool, KvError>;
}

/// In-process TTL store. Entries expire lazily on read; [`sweep`] reclaims
/// the rest.
///
/// [`sweep`]: MemoryTtlStore::sweep
#[derive(Default)]
pub struct MemoryTtlStore {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryTtlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Intended for a periodic background task.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires)| *expires > now);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "Swept expired KV entries");
        }
        removed
    }
}

#[async_trait]
impl TtlStore for MemoryTtlStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.1 > Instant::now() {
                return Ok(Some(entry.0.clone()));
            }
            drop(entry);
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<bool, KvError> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().1 <= now {
                    occupied.insert((value, now + ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert((value, now + ttl));
                Ok(true)
            }
        }
    }
}

/// Cached JWKS response body. Invalidated on every key rotation; lookups
/// falling through to the key manager rebuild it.
#[derive(Default)]
pub struct JwksResponseCache {
    body: parking_lot::RwLock<Option<String>>,
}

impl JwksResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.body.read().clone()
    }

    pub fn set(&self, body: String) {
        *self.body.write() = Some(body);
    }

    pub fn invalidate(&self) {
        *self.body.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire() {
        let store = MemoryTtlStore::new();
        store
            .put("k", "v".to_string(), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_if_absent_is_single_winner() {
        let store = MemoryTtlStore::new();
        let first = store
            .put_if_absent("jti:abc", "1".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let second = store
            .put_if_absent("jti:abc", "1".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn put_if_absent_succeeds_after_expiry() {
        let store = MemoryTtlStore::new();
        store
            .put_if_absent("k", "1".to_string(), Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let again = store
            .put_if_absent("k", "2".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(again);
    }

    #[tokio::test]
    async fn sweep_reclaims_expired_entries() {
        let store = MemoryTtlStore::new();
        store
            .put("a", "1".to_string(), Duration::from_millis(5))
            .await
            .unwrap();
        store
            .put("b", "2".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.sweep(), 1);
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn jwks_cache_invalidation() {
        let cache = JwksResponseCache::new();
        assert!(cache.get().is_none());
        cache.set("{\"keys\":[]}".to_string());
        assert!(cache.get().is_some());
        cache.invalidate();
        assert!(cache.get().is_none());
    }
}
