//! Redis-backed store for caches and ledgers shared across hosts.
//!
//! Expiry is native (`PSETEX`); ledger sets are plain Redis sets.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{CacheStore, MembershipStore, StoreResult};

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis (e.g. "redis://localhost:6379")
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn set_key(set: &str) -> String {
        format!("set:{}", set)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        // PSETEX rejects 0
        let millis = (ttl.as_millis() as u64).max(1);
        conn.pset_ex::<_, _, ()>(key, value, millis).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for RedisStore {
    async fn add(&self, set: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(Self::set_key(set), member).await?;
        Ok(())
    }

    async fn contains(&self, set: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let found: bool = conn.sismember(Self::set_key(set), member).await?;
        Ok(found)
    }
}
