//! Storage backends for cached responses and the dedup ledger
//!
//! Two narrow traits cover everything the pipeline needs from storage:
//! [`CacheStore`] is a TTL key-value store (response cache, ledger fast path)
//! and [`MembershipStore`] is a write-once set (ledger source of truth).
//! Every backend here implements both.

pub mod key;
pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;
pub mod storage;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// TTL-capable key-value store. Expiry is the store's job.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Value for `key`, or `None` if absent or expired
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;
}

/// Grow-only set membership
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn add(&self, set: &str, member: &str) -> StoreResult<()>;

    async fn contains(&self, set: &str, member: &str) -> StoreResult<bool>;
}

pub use key::{MARKER_SEGMENT, cache_key, marker_key};
pub use memory::MemoryStore;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisStore;
pub use storage::SqliteStore;
