//! Upstream credential rotation
//!
//! Round-robin over a static set of API keys. A key that fails authorization
//! sits out for a while; if every key is out, the one coming back soonest is
//! used anyway rather than stalling the caller.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::debug;
use tokio::time::Instant;

use crate::config::CredentialEntry;
use crate::error::ConfigError;

/// An upstream API key
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    id: String,
    secret: String,
}

impl Credential {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl From<&CredentialEntry> for Credential {
    fn from(entry: &CredentialEntry) -> Self {
        Credential::new(entry.id.clone(), entry.secret.clone())
    }
}

struct Slot {
    credential: Credential,
    suspended_until: Mutex<Option<Instant>>,
}

impl Slot {
    fn suspended_until(&self) -> Option<Instant> {
        // A poisoned lock still holds a valid deadline
        *self
            .suspended_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_eligible(&self, now: Instant) -> bool {
        self.suspended_until().is_none_or(|until| until <= now)
    }
}

/// Process-wide pool of credentials
pub struct CredentialPool {
    slots: Vec<Slot>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    /// Build a pool. At least one credential is required.
    pub fn new(credentials: Vec<Credential>) -> Result<Self, ConfigError> {
        if credentials.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }

        let slots = credentials
            .into_iter()
            .map(|credential| Slot {
                credential,
                suspended_until: Mutex::new(None),
            })
            .collect();

        Ok(Self {
            slots,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn from_entries(entries: &[CredentialEntry]) -> Result<Self, ConfigError> {
        Self::new(entries.iter().map(Credential::from).collect())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Next eligible credential in round-robin order.
    ///
    /// Each probe advances the shared cursor, so concurrent callers spread
    /// over the eligible keys instead of piling onto the first one after a
    /// suspended key.
    pub fn next(&self) -> Credential {
        let now = Instant::now();
        let len = self.slots.len();

        for _ in 0..len {
            let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
            let slot = &self.slots[idx];
            if slot.is_eligible(now) {
                return slot.credential.clone();
            }
        }

        // Everything is suspended: degrade to the key that recovers first
        let slot = self
            .slots
            .iter()
            .min_by_key(|slot| slot.suspended_until())
            .unwrap_or(&self.slots[0]);
        debug!(
            "All credentials suspended, using {} (earliest recovery)",
            slot.credential.id
        );
        slot.credential.clone()
    }

    /// Take a credential out of rotation for `duration`.
    ///
    /// An existing longer suspension is kept. Returns false for unknown ids.
    pub fn suspend(&self, id: &str, duration: Duration) -> bool {
        let Some(slot) = self.slots.iter().find(|slot| slot.credential.id == id) else {
            return false;
        };

        let until = Instant::now() + duration;
        let mut guard = slot
            .suspended_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(guard.map_or(until, |current| current.max(until)));
        true
    }

    pub fn is_suspended(&self, id: &str) -> bool {
        let now = Instant::now();
        self.slots
            .iter()
            .find(|slot| slot.credential.id == id)
            .is_some_and(|slot| !slot.is_eligible(now))
    }

    /// When a suspended credential becomes eligible again
    pub fn suspended_until(&self, id: &str) -> Option<Instant> {
        let now = Instant::now();
        self.slots
            .iter()
            .find(|slot| slot.credential.id == id)
            .and_then(Slot::suspended_until)
            .filter(|until| *until > now)
    }

    pub fn eligible_count(&self) -> usize {
        let now = Instant::now();
        self.slots.iter().filter(|slot| slot.is_eligible(now)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(ids: &[&str]) -> CredentialPool {
        CredentialPool::new(
            ids.iter()
                .map(|id| Credential::new(*id, format!("secret-{}", id)))
                .collect(),
        )
        .unwrap()
    }

    fn take(pool: &CredentialPool, n: usize) -> Vec<String> {
        (0..n).map(|_| pool.next().id().to_string()).collect()
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(matches!(
            CredentialPool::new(Vec::new()),
            Err(ConfigError::MissingCredentials)
        ));
    }

    #[test]
    fn test_round_robin() {
        let pool = pool(&["a", "b", "c"]);
        assert_eq!(take(&pool, 6), vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_suspended_evenly() {
        let pool = pool(&["a", "b", "c"]);
        assert!(pool.suspend("a", Duration::from_secs(60)));

        let picks = take(&pool, 4);
        assert!(!picks.contains(&"a".to_string()));
        assert_eq!(picks.iter().filter(|id| *id == "b").count(), 2);
        assert_eq!(picks.iter().filter(|id| *id == "c").count(), 2);
        assert_eq!(pool.eligible_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspension_expires() {
        let pool = pool(&["a", "b"]);
        pool.suspend("a", Duration::from_secs(30));
        assert!(pool.is_suspended("a"));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!pool.is_suspended("a"));
        assert!(pool.suspended_until("a").is_none());
        assert_eq!(pool.eligible_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_suspended_returns_earliest() {
        let pool = pool(&["a", "b", "c"]);
        pool.suspend("a", Duration::from_secs(90));
        pool.suspend("b", Duration::from_secs(10));
        pool.suspend("c", Duration::from_secs(60));

        assert_eq!(pool.eligible_count(), 0);
        assert_eq!(pool.next().id(), "b");
        assert_eq!(pool.next().id(), "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_never_shortens() {
        let pool = pool(&["a"]);
        pool.suspend("a", Duration::from_secs(100));
        let long = pool.suspended_until("a").unwrap();

        pool.suspend("a", Duration::from_secs(5));
        assert_eq!(pool.suspended_until("a"), Some(long));
    }

    #[test]
    fn test_suspend_unknown_id() {
        let pool = pool(&["a"]);
        assert!(!pool.suspend("zzz", Duration::from_secs(1)));
        assert!(!pool.is_suspended("zzz"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credential = Credential::new("primary", "RGAPI-very-secret");
        let debug = format!("{:?}", credential);
        assert!(debug.contains("primary"));
        assert!(!debug.contains("RGAPI-very-secret"));
    }
}
