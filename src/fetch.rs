//! Cache-aside resolution against the upstream API
//!
//! [`FetchCoordinator::resolve`] serves a cached payload when one is present,
//! and otherwise spends a rate-limit permit, picks a credential and calls
//! upstream. Throttled and faulted calls are retried a bounded number of
//! times; credentials rejected by the upstream are suspended and the call
//! fails over to the next key. Successful payloads are written back to the
//! cache in the background.
//!
//! Concurrent misses for the same key are not coalesced: each one calls
//! upstream and the last cache write wins.

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::{debug, warn};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::sleep;

use crate::cache::CacheStore;
use crate::client::taxonomy::{self, DEFAULT_RETRY_AFTER};
use crate::client::{CredentialPool, RateLimiter, ResourceLocator, Transport, UpstreamRequest};
use crate::config::{ApiConfig, Config, ForbiddenConfig, RetryConfig};
use crate::error::{Error, Result, TransportError, UpstreamError, UpstreamErrorKind};

/// Background cache writes still in flight
#[derive(Default)]
struct PendingWrites {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the pending count when the write task ends, however it ends
struct WriteGuard(Arc<PendingWrites>);

impl WriteGuard {
    fn new(pending: &Arc<PendingWrites>) -> Self {
        pending.count.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(pending))
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Outcome of one upstream call that did not succeed
enum Failure {
    Upstream(UpstreamError),
    Transport(TransportError),
}

pub struct FetchCoordinator {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn CacheStore>,
    credentials: Arc<CredentialPool>,
    limiter: Arc<RateLimiter>,
    api: ApiConfig,
    retry: RetryConfig,
    forbidden: ForbiddenConfig,
    suspension: Duration,
    pending: Arc<PendingWrites>,
}

impl FetchCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<dyn CacheStore>,
        credentials: Arc<CredentialPool>,
        limiter: Arc<RateLimiter>,
        config: &Config,
    ) -> Self {
        Self {
            transport,
            cache,
            credentials,
            limiter,
            api: config.api.clone(),
            retry: config.retry,
            forbidden: config.forbidden.clone(),
            suspension: config.credentials.suspension(),
            pending: Arc::new(PendingWrites::default()),
        }
    }

    pub fn credentials(&self) -> &CredentialPool {
        &self.credentials
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Resolve `locator`, caching the payload under `key` for `ttl`.
    ///
    /// With `force_refresh` the cache is not read, but a successful payload
    /// still overwrites the entry.
    pub async fn resolve(
        &self,
        key: &str,
        locator: &ResourceLocator,
        ttl: Duration,
        force_refresh: bool,
    ) -> Result<Value> {
        if force_refresh {
            debug!("Cache bypass: {}", key);
        } else if let Some(payload) = self.read_cached(key).await {
            debug!("Cache hit: {}", key);
            return Ok(payload);
        } else {
            debug!("Cache miss: {}", key);
        }

        let url = locator.url(self.api.base_url(&locator.region)?)?;
        let mut body = self.fetch_upstream(&url).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            body = b"null".to_vec();
        }

        let payload: Value = serde_json::from_slice(&body).map_err(|e| {
            Error::InvalidResponse(format!("{} returned a non-JSON body: {}", url.path(), e))
        })?;

        self.write_behind(key, body, ttl);
        Ok(payload)
    }

    /// [`resolve`](Self::resolve), deserialized into `T`
    pub async fn resolve_as<T: DeserializeOwned>(
        &self,
        key: &str,
        locator: &ResourceLocator,
        ttl: Duration,
        force_refresh: bool,
    ) -> Result<T> {
        let payload = self.resolve(key, locator, ttl, force_refresh).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Wait for every background cache write started so far
    pub async fn flush(&self) {
        loop {
            let mut notified = pin!(self.pending.idle.notified());
            notified.as_mut().enable();
            if self.pending.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Cached payload, if present and readable. Store errors count as a miss.
    async fn read_cached(&self, key: &str) -> Option<Value> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!("Ignoring unreadable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed for {}, fetching upstream: {}", key, e);
                None
            }
        }
    }

    /// Store the body without holding up the caller. The task outlives a
    /// cancelled caller.
    fn write_behind(&self, key: &str, body: Vec<u8>, ttl: Duration) {
        let guard = WriteGuard::new(&self.pending);
        let cache = Arc::clone(&self.cache);
        let key = key.to_string();

        tokio::spawn(async move {
            let _guard = guard;
            match cache.set(&key, &body, ttl).await {
                Ok(()) => debug!("Cached {} ({} bytes, ttl {:?})", key, body.len(), ttl),
                Err(e) => warn!("Failed to cache {}: {}", key, e),
            }
        });
    }

    /// Call upstream until success or a failure that should reach the caller
    async fn fetch_upstream(&self, url: &Url) -> Result<Vec<u8>> {
        // Calls that ended in a retryable failure, and credential failovers
        let mut attempts: u32 = 0;
        let mut failovers: usize = 0;

        loop {
            self.limiter.acquire().await;
            let credential = self.credentials.next();
            let request = UpstreamRequest::get(url.clone(), credential.clone());

            let failure = match self.transport.call(&request).await {
                Ok(response) if response.is_success() => return Ok(response.body),
                Ok(response) => Failure::Upstream(taxonomy::classify(
                    response.status,
                    &response.headers,
                    &response.body,
                )),
                Err(e) => Failure::Transport(e),
            };

            match failure {
                Failure::Upstream(err) if taxonomy::is_credential_failure(&err, &self.forbidden) => {
                    warn!(
                        "Credential {} rejected with {}, suspending for {:?}",
                        credential.id(),
                        err.status,
                        self.suspension
                    );
                    self.credentials.suspend(credential.id(), self.suspension);
                    failovers += 1;

                    if failovers < self.credentials.len() && self.credentials.eligible_count() > 0 {
                        debug!("Failing over to the next credential for {}", url.path());
                        continue;
                    }
                    return Err(err.into());
                }
                Failure::Upstream(err) if err.kind.is_retryable() => {
                    attempts += 1;
                    if attempts >= self.retry.max_attempts {
                        warn!(
                            "Giving up on {} after {} attempts: {} {}",
                            url.path(),
                            attempts,
                            err.status,
                            err.kind
                        );
                        return Err(err.exhausted().into());
                    }

                    let wait = match err.kind {
                        UpstreamErrorKind::Throttled => err.retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
                        _ => err
                            .retry_after
                            .unwrap_or_else(|| self.retry.fault_backoff(attempts - 1)),
                    };
                    warn!(
                        "{} from upstream for {} (attempt {}/{}), retrying in {:?}",
                        err.status,
                        url.path(),
                        attempts,
                        self.retry.max_attempts,
                        wait
                    );
                    sleep(wait).await;
                }
                Failure::Upstream(err) => return Err(err.into()),
                Failure::Transport(err) => {
                    attempts += 1;
                    if attempts >= self.retry.max_attempts {
                        warn!("Giving up on {} after {} attempts: {}", url.path(), attempts, err);
                        return Err(err.into());
                    }

                    let wait = self.retry.fault_backoff(attempts - 1);
                    warn!("{} (attempt {}), retrying in {:?}", err, attempts, wait);
                    sleep(wait).await;
                }
            }
        }
    }
}
