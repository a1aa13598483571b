//! Upstream game-data API client pieces
//!
//! Everything that touches the upstream lives here: the [`Transport`] seam,
//! the shared [`RateLimiter`] and [`CredentialPool`], and the pure
//! [`taxonomy`] that turns failed responses into [`UpstreamError`]s.
//!
//! [`UpstreamError`]: crate::error::UpstreamError

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};

use crate::error::{ConfigError, TransportError};

pub mod credentials;
#[cfg(test)]
pub mod mock;
pub mod rate_limit;
pub mod taxonomy;
pub mod transport;

pub use credentials::{Credential, CredentialPool};
#[cfg(test)]
pub use mock::{MockTransport, Reply};
pub use rate_limit::RateLimiter;
pub use transport::ReqwestTransport;

/// Performs one network call. Retries, limits and classification happen above.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError>;
}

/// A resolved call: where to go and with which credential
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    pub credential: Credential,
    pub headers: Vec<(String, String)>,
}

impl UpstreamRequest {
    pub fn get(url: Url, credential: Credential) -> Self {
        Self {
            method: Method::GET,
            url,
            credential,
            headers: Vec::new(),
        }
    }
}

/// Raw upstream reply, before classification
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Which upstream resource to read: a region plus a path and query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLocator {
    pub region: String,
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl ResourceLocator {
    pub fn new(region: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Join the region's base URL with this locator's path and query
    pub fn url(&self, base_url: &str) -> Result<Url, ConfigError> {
        let joined = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );
        let url = if self.params.is_empty() {
            Url::parse(&joined)
        } else {
            Url::parse_with_params(&joined, &self.params)
        };
        url.map_err(|e| ConfigError::Invalid(format!("invalid upstream URL `{}`: {}", joined, e)))
    }
}
