//! Grow-only dedup ledger for background consumers
//!
//! Membership lives in a permanent set. A TTL marker in a fast store answers
//! repeat lookups. The permanent write always lands before the marker, so a
//! marker never exists without its permanent entry.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::cache::{CacheStore, MembershipStore, marker_key};
use crate::error::Result;

const MARKER: &[u8] = b"1";

pub struct DedupLedger {
    members: Arc<dyn MembershipStore>,
    markers: Arc<dyn CacheStore>,
    namespace: String,
    marker_ttl: Duration,
}

impl DedupLedger {
    pub fn new(
        members: Arc<dyn MembershipStore>,
        markers: Arc<dyn CacheStore>,
        namespace: impl Into<String>,
        marker_ttl: Duration,
    ) -> Self {
        Self {
            members,
            markers,
            namespace: namespace.into(),
            marker_ttl,
        }
    }

    /// Whether `member` has been marked in `set`.
    ///
    /// A marker miss falls through to the permanent set; a hit there puts the
    /// marker back.
    pub async fn is_marked(&self, set: &str, member: &str) -> Result<bool> {
        let key = marker_key(&self.namespace, set, member);
        match self.markers.get(&key).await {
            Ok(Some(_)) => return Ok(true),
            Ok(None) => {}
            Err(e) => warn!("Dedup marker lookup failed for {}: {}", key, e),
        }

        if !self.members.contains(set, member).await? {
            return Ok(false);
        }

        debug!("Restoring dedup marker {}", key);
        self.write_marker(&key).await;
        Ok(true)
    }

    /// Record `member` in `set`. Marking twice is a no-op.
    pub async fn mark(&self, set: &str, member: &str) -> Result<()> {
        self.members.add(set, member).await?;
        self.write_marker(&marker_key(&self.namespace, set, member))
            .await;
        Ok(())
    }

    /// Markers only speed up lookups, so failures are logged and dropped
    async fn write_marker(&self, key: &str) {
        if let Err(e) = self.markers.set(key, MARKER, self.marker_ttl).await {
            warn!("Failed to write dedup marker {}: {}", key, e);
        }
    }
}
