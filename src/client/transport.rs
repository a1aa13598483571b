//! HTTP transport backed by reqwest

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client as HttpClient;

use super::{Transport, UpstreamRequest, UpstreamResponse};
use crate::error::TransportError;

/// Sends upstream calls over HTTPS, secret in a configurable header
#[derive(Clone)]
pub struct ReqwestTransport {
    http: HttpClient,
    auth_header: String,
}

impl ReqwestTransport {
    pub fn new(auth_header: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .user_agent(concat!("gamegate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self {
            http,
            auth_header: auth_header.into(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn call(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        debug!(
            "{} {} (credential {})",
            request.method,
            request.url,
            request.credential.id()
        );

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .header(self.auth_header.as_str(), request.credential.secret());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!("{} -> {} ({} bytes)", request.url, status, body.len());
        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
