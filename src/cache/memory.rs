//! In-process store
//!
//! Shares nothing across processes. Useful for single-instance deployments and
//! tests; expiry follows the tokio clock so paused-time tests can age entries.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{CacheStore, MembershipStore, StoreResult};
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    entries: HashMap<String, (Vec<u8>, Instant)>,
    sets: HashMap<String, HashSet<String>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Number of unexpired entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|inner| inner.entries.values().filter(|(_, exp)| *exp > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut inner = self.lock()?;
        match inner.entries.get(key) {
            Some((data, expires_at)) if *expires_at > Instant::now() => Ok(Some(data.clone())),
            Some(_) => {
                inner.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let expires_at = Instant::now() + ttl;
        self.lock()?
            .entries
            .insert(key.to_string(), (value.to_vec(), expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.lock()?.entries.remove(key);
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn add(&self, set: &str, member: &str) -> StoreResult<()> {
        self.lock()?
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn contains(&self, set: &str, member: &str) -> StoreResult<bool> {
        Ok(self
            .lock()?
            .sets
            .get(set)
            .is_some_and(|members| members.contains(member)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        store.set("k", b"v", Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        store.set("k", b"v", Duration::from_secs(10)).await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sets_are_separate() {
        let store = MemoryStore::new();
        store.add("a", "1").await.unwrap();
        assert!(store.contains("a", "1").await.unwrap());
        assert!(!store.contains("b", "1").await.unwrap());
        assert!(!store.contains("a", "2").await.unwrap());
    }
}
