//! One-stop assembly of the resolution pipeline from [`Config`]

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde_json::Value;

use crate::cache::{CacheStore, MembershipStore, SqliteStore, cache_key};
use crate::client::{CredentialPool, RateLimiter, ReqwestTransport, ResourceLocator, Transport};
use crate::config::Config;
use crate::error::Result;
use crate::fetch::FetchCoordinator;
use crate::ledger::DedupLedger;

/// Process-wide gateway: one limiter, one credential pool, one store
pub struct Gateway {
    config: Config,
    coordinator: FetchCoordinator,
    ledger: DedupLedger,
}

impl Gateway {
    /// Build with the SQLite store and the HTTP transport
    pub fn from_config(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::open_or_default(config.cache.path.as_deref())?);
        let transport = Arc::new(ReqwestTransport::new(
            config.api.auth_header.clone(),
            Duration::from_secs(config.api.timeout_secs),
        )?);
        Self::with_parts(config, transport, store)
    }

    /// Build around a given transport and a store serving both the cache and
    /// the ledger
    pub fn with_parts<S>(config: Config, transport: Arc<dyn Transport>, store: Arc<S>) -> Result<Self>
    where
        S: CacheStore + MembershipStore + 'static,
    {
        let credentials = Arc::new(CredentialPool::from_entries(&config.credentials.keys)?);
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        debug!(
            "Gateway ready: {} credential(s), {} region(s)",
            credentials.len(),
            config.api.regions.len()
        );

        let coordinator =
            FetchCoordinator::new(transport, store.clone(), credentials, limiter, &config);
        let ledger = DedupLedger::new(
            store.clone(),
            store,
            config.namespace.clone(),
            config.dedup.marker_ttl(),
        );

        Ok(Self {
            config,
            coordinator,
            ledger,
        })
    }

    /// Fetch a resource, keyed and expired per its resource type
    pub async fn fetch(
        &self,
        resource_type: &str,
        region: &str,
        path: &str,
        params: &[(String, String)],
        force_refresh: bool,
    ) -> Result<Value> {
        let identity: Vec<(&str, &str)> = params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let key = cache_key(&self.config.namespace, resource_type, region, path, &identity);
        let ttl = self.config.cache.ttl_for(resource_type);

        let mut locator = ResourceLocator::new(region, path);
        locator.params = params.to_vec();

        self.coordinator.resolve(&key, &locator, ttl, force_refresh).await
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Let background cache writes finish
    pub async fn shutdown(&self) {
        self.coordinator.flush().await;
    }
}
