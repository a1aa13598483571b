//! Scripted transport for testing
//!
//! Replies are queued per credential id (`"*"` matches any credential). The
//! last reply in a queue repeats forever, so a single `with_reply` covers
//! every call.
//!
//! # Example
//! ```ignore
//! let mock = MockTransport::new()
//!     .with_reply("primary", Reply::throttled(1)).await
//!     .with_reply("primary", Reply::json(200, r#"{"ok":true}"#)).await;
//! ```

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

use super::{Transport, UpstreamRequest, UpstreamResponse};
use crate::error::TransportError;

/// Matches any credential
pub const ANY: &str = "*";

/// One scripted outcome
#[derive(Debug, Clone)]
pub struct Reply {
    outcome: Outcome,
    delay: Duration,
}

#[derive(Debug, Clone)]
enum Outcome {
    Response {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    Fail(TransportError),
}

impl Reply {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            outcome: Outcome::Response {
                status,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                body: body.as_bytes().to_vec(),
            },
            delay: Duration::ZERO,
        }
    }

    /// A 429 carrying `Retry-After: secs`
    pub fn throttled(secs: u64) -> Self {
        Self::json(429, r#"{"status":{"message":"Rate limit exceeded","status_code":429}}"#)
            .header("retry-after", &secs.to_string())
    }

    pub fn fail(error: TransportError) -> Self {
        Self {
            outcome: Outcome::Fail(error),
            delay: Duration::ZERO,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Outcome::Response { headers, .. } = &mut self.outcome {
            headers.push((name.to_string(), value.to_string()));
        }
        self
    }

    /// Hold the reply back for `delay` (simulated latency)
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A call the mock received
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub credential: String,
    pub url: Url,
    pub at: Instant,
}

#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<CapturedCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for calls made with `credential` (or [`ANY`])
    pub async fn with_reply(self, credential: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .await
            .entry(credential.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub async fn calls(&self) -> Vec<CapturedCall> {
        self.calls.lock().await.clone()
    }

    /// Credential ids in call order
    pub async fn credentials_used(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .map(|call| call.credential.clone())
            .collect()
    }

    async fn next_reply(&self, credential: &str) -> Option<Reply> {
        let mut replies = self.replies.lock().await;
        let key = if replies.get(credential).is_some_and(|queue| !queue.is_empty()) {
            credential
        } else {
            ANY
        };
        let queue = replies.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        let credential = request.credential.id().to_string();
        self.calls.lock().await.push(CapturedCall {
            credential: credential.clone(),
            url: request.url.clone(),
            at: Instant::now(),
        });

        let reply = self.next_reply(&credential).await.ok_or_else(|| {
            TransportError::Other(format!("no scripted reply for credential {}", credential))
        })?;

        if !reply.delay.is_zero() {
            sleep(reply.delay).await;
        }

        match reply.outcome {
            Outcome::Response {
                status,
                headers,
                body,
            } => {
                let mut map = HeaderMap::new();
                for (name, value) in headers {
                    if let (Ok(name), Ok(value)) = (
                        HeaderName::from_bytes(name.as_bytes()),
                        HeaderValue::from_str(&value),
                    ) {
                        map.insert(name, value);
                    }
                }
                Ok(UpstreamResponse {
                    status,
                    headers: map,
                    body,
                })
            }
            Outcome::Fail(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Credential;

    fn request(credential: &str) -> UpstreamRequest {
        UpstreamRequest::get(
            Url::parse("http://upstream.test/x").unwrap(),
            Credential::new(credential, "secret"),
        )
    }

    #[tokio::test]
    async fn test_last_reply_repeats() {
        let mock = MockTransport::new()
            .with_reply(ANY, Reply::json(500, "{}"))
            .await
            .with_reply(ANY, Reply::json(200, "{}"))
            .await;

        assert_eq!(mock.call(&request("a")).await.unwrap().status, 500);
        assert_eq!(mock.call(&request("a")).await.unwrap().status, 200);
        assert_eq!(mock.call(&request("b")).await.unwrap().status, 200);
        assert_eq!(mock.call_count().await, 3);
    }

    #[tokio::test]
    async fn test_credential_specific_reply_wins() {
        let mock = MockTransport::new()
            .with_reply("bad", Reply::json(401, "{}"))
            .await
            .with_reply(ANY, Reply::json(200, "{}"))
            .await;

        assert_eq!(mock.call(&request("bad")).await.unwrap().status, 401);
        assert_eq!(mock.call(&request("good")).await.unwrap().status, 200);
        assert_eq!(mock.credentials_used().await, vec!["bad", "good"]);
    }

    #[tokio::test]
    async fn test_unscripted_call_fails() {
        let mock = MockTransport::new();
        assert!(mock.call(&request("a")).await.is_err());
    }

    #[tokio::test]
    async fn test_throttled_sets_retry_after() {
        let mock = MockTransport::new().with_reply(ANY, Reply::throttled(2)).await;
        let response = mock.call(&request("a")).await.unwrap();
        assert_eq!(response.status, 429);
        assert_eq!(response.headers.get("retry-after").unwrap(), "2");
    }
}
