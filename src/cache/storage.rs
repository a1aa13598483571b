//! SQLite-based store with file blob support
//!
//! Small values live inline in SQLite, large ones (>10KB) as files. The same
//! database holds the dedup ledger's permanent set, so several processes on
//! one host share both through the file.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::key::{MARKER_SEGMENT, digest};
use super::{CacheStore, MembershipStore, StoreResult};
use crate::error::StoreError;

/// Schema version stored in `user_version`
const SCHEMA_VERSION: i32 = 1;

/// Values larger than this are stored as external blobs
const INLINE_THRESHOLD: usize = 10 * 1024; // 10KB

/// SQLite-backed store with file blob support
pub struct SqliteStore {
    conn: Mutex<Connection>,
    blobs_dir: PathBuf,
}

impl SqliteStore {
    /// Open or create the store at the default XDG cache location
    pub fn open() -> StoreResult<Self> {
        let cache_dir = Self::cache_dir()?;
        Self::open_at(&cache_dir)
    }

    /// Open in `dir`, or the default location when `None`
    pub fn open_or_default(dir: Option<&Path>) -> StoreResult<Self> {
        match dir {
            Some(dir) => Self::open_at(dir),
            None => Self::open(),
        }
    }

    /// Get the cache directory path (~/.cache/gamegate on Linux)
    pub fn cache_dir() -> StoreResult<PathBuf> {
        let cache_base = dirs::cache_dir().ok_or(StoreError::NoHome)?;
        Ok(cache_base.join("gamegate"))
    }

    /// Open the store in a specific directory
    pub fn open_at(cache_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(cache_dir)
            .map_err(|e| StoreError::Io(format!("Failed to create cache dir: {}", e)))?;

        let db_path = cache_dir.join("gamegate.db");
        let blobs_dir = cache_dir.join("blobs");
        std::fs::create_dir_all(&blobs_dir)
            .map_err(|e| StoreError::Io(format!("Failed to create blobs dir: {}", e)))?;

        let conn = Connection::open(&db_path)?;

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        // The ledger table cannot be rebuilt from anything, so a mismatch is
        // an error instead of the cache's nuke-and-rebuild.
        if version != 0 && version != SCHEMA_VERSION {
            return Err(StoreError::Io(format!(
                "Store schema version {} is not supported (expected {})",
                version, SCHEMA_VERSION
            )));
        }

        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                cache_key TEXT PRIMARY KEY NOT NULL,
                data BLOB,
                blob_path TEXT,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_expires_at ON cache_entries(expires_at);

            CREATE TABLE IF NOT EXISTS ledger_members (
                set_name TEXT NOT NULL,
                member_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (set_name, member_id)
            );
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
            blobs_dir,
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Get a value if present and not expired
    pub fn get_entry(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = Utc::now().timestamp_millis();
        let conn = self.conn()?;

        let result: Option<(Option<Vec<u8>>, Option<String>)> = conn
            .query_row(
                "SELECT data, blob_path FROM cache_entries
                 WHERE cache_key = ?1 AND expires_at > ?2",
                params![key, now],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match result {
            Some((Some(data), None)) => Ok(Some(data)),
            Some((None, Some(blob_path))) => {
                let full_path = self.blobs_dir.join(&blob_path);
                match std::fs::read(&full_path) {
                    Ok(data) => Ok(Some(data)),
                    Err(e) => {
                        log::warn!("Failed to read blob {}: {}", blob_path, e);
                        let _ = conn.execute("DELETE FROM cache_entries WHERE cache_key = ?1", [key]);
                        Ok(None)
                    }
                }
            }
            _ => Ok(None),
        }
    }

    /// Store a value with TTL, overwriting any previous entry
    pub fn put(&self, key: &str, data: &[u8], ttl: Duration) -> StoreResult<()> {
        let now = Utc::now().timestamp_millis();
        let expires = now.saturating_add(ttl.as_millis() as i64);

        let new_blob = if data.len() > INLINE_THRESHOLD {
            Some(self.write_blob(key, data)?)
        } else {
            None
        };

        let conn = self.conn()?;
        let old_blob: Option<Option<String>> = conn
            .query_row(
                "SELECT blob_path FROM cache_entries WHERE cache_key = ?1",
                [key],
                |r| r.get(0),
            )
            .optional()?;

        match &new_blob {
            None => conn.execute(
                "INSERT OR REPLACE INTO cache_entries
                 (cache_key, data, blob_path, created_at, expires_at, size_bytes)
                 VALUES (?1, ?2, NULL, ?3, ?4, ?5)",
                params![key, data, now, expires, data.len()],
            )?,
            Some(blob_path) => conn.execute(
                "INSERT OR REPLACE INTO cache_entries
                 (cache_key, data, blob_path, created_at, expires_at, size_bytes)
                 VALUES (?1, NULL, ?2, ?3, ?4, ?5)",
                params![key, blob_path, now, expires, data.len()],
            )?,
        };

        // Drop a blob the new row no longer references
        if let Some(Some(old)) = old_blob {
            if new_blob.as_deref() != Some(old.as_str()) {
                if let Err(e) = std::fs::remove_file(self.blobs_dir.join(&old)) {
                    log::warn!("Failed to remove blob {}: {}", old, e);
                }
            }
        }
        Ok(())
    }

    /// Delete a specific cache entry by key
    pub fn delete_by_key(&self, key: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let blob_path: Option<Option<String>> = conn
            .query_row(
                "SELECT blob_path FROM cache_entries WHERE cache_key = ?1",
                [key],
                |r| r.get(0),
            )
            .optional()?;

        let deleted = conn.execute("DELETE FROM cache_entries WHERE cache_key = ?1", [key])?;
        if let Some(Some(path)) = blob_path {
            let _ = std::fs::remove_file(self.blobs_dir.join(path));
        }
        Ok(deleted > 0)
    }

    /// Remove expired cache entries and their blobs.
    ///
    /// Reads already ignore expired rows; this only reclaims space.
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let now = Utc::now().timestamp_millis();
        let conn = self.conn()?;

        let blob_paths: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT blob_path FROM cache_entries
                 WHERE expires_at <= ?1 AND blob_path IS NOT NULL",
            )?;
            let rows = stmt.query_map([now], |r| r.get(0))?;
            let paths = rows.collect::<rusqlite::Result<Vec<String>>>()?;
            paths
        };

        let deleted = conn.execute("DELETE FROM cache_entries WHERE expires_at <= ?1", [now])?;

        for path in blob_paths {
            if let Err(e) = std::fs::remove_file(self.blobs_dir.join(&path)) {
                log::warn!("Failed to remove blob {}: {}", path, e);
            }
        }

        Ok(deleted)
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let now = Utc::now().timestamp_millis();
        let conn = self.conn()?;

        let total_entries: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |r| r.get(0))?;

        let valid_entries: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE expires_at > ?1",
            [now],
            |r| r.get(0),
        )?;

        let total_size: i64 = conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entries",
            [],
            |r| r.get(0),
        )?;

        let dedup_markers: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE expires_at > ?1 AND instr(cache_key, ?2) > 0",
            params![now, MARKER_SEGMENT],
            |r| r.get(0),
        )?;

        let ledger_members: i64 = conn.query_row("SELECT COUNT(*) FROM ledger_members", [], |r| r.get(0))?;

        Ok(StoreStats {
            total_entries: total_entries as usize,
            valid_entries: valid_entries as usize,
            expired_entries: (total_entries - valid_entries) as usize,
            total_size_bytes: total_size as usize,
            dedup_markers: dedup_markers as usize,
            ledger_members: ledger_members as usize,
        })
    }

    /// Record a ledger member. Existing members are left untouched.
    pub fn add_member(&self, set: &str, member: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO ledger_members (set_name, member_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![set, member, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    pub fn has_member(&self, set: &str, member: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM ledger_members WHERE set_name = ?1 AND member_id = ?2",
                params![set, member],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Write a blob file, sharded by the first 2 chars of the key digest
    fn write_blob(&self, key: &str, data: &[u8]) -> StoreResult<String> {
        let name = digest(key);
        let shard = &name[..2];
        let shard_dir = self.blobs_dir.join(shard);
        std::fs::create_dir_all(&shard_dir)
            .map_err(|e| StoreError::Io(format!("Failed to create shard dir: {}", e)))?;

        let filename = format!("{}.json", name);
        let rel_path = format!("{}/{}", shard, filename);
        let full_path = shard_dir.join(&filename);

        std::fs::write(&full_path, data)
            .map_err(|e| StoreError::Io(format!("Failed to write blob: {}", e)))?;

        Ok(rel_path)
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.get_entry(key)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.put(key, value, ttl)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.delete_by_key(key).map(|_| ())
    }
}

#[async_trait]
impl MembershipStore for SqliteStore {
    async fn add(&self, set: &str, member: &str) -> StoreResult<()> {
        self.add_member(set, member)
    }

    async fn contains(&self, set: &str, member: &str) -> StoreResult<bool> {
        self.has_member(set, member)
    }
}

/// Statistics about store state
#[derive(Debug)]
pub struct StoreStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub total_size_bytes: usize,
    /// Unexpired ledger fast-path markers, also counted in `valid_entries`
    pub dedup_markers: usize,
    pub ledger_members: usize,
}
