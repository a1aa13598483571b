//! Classification of failed upstream responses
//!
//! Pure functions: `(status, headers, body)` in, [`UpstreamError`] out. The
//! upstream's own message text is carried through untouched.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;

use crate::config::{ForbiddenConfig, ForbiddenPolicy};
use crate::error::{UpstreamError, UpstreamErrorKind};

/// Wait applied to a 429 that carries no hint
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Classify a non-2xx response
pub fn classify(status: u16, headers: &HeaderMap, body: &[u8]) -> UpstreamError {
    let json = serde_json::from_slice::<Value>(body).ok();
    let message = extract_message(json.as_ref(), body).unwrap_or_else(|| fallback_message(status));
    let error = UpstreamError::new(status, message);

    let hint = retry_after_header(headers).or_else(|| json.as_ref().and_then(retry_after_field));
    match error.kind {
        UpstreamErrorKind::Throttled => error.with_retry_after(hint.unwrap_or(DEFAULT_RETRY_AFTER)),
        UpstreamErrorKind::UpstreamFault => match hint {
            Some(wait) => error.with_retry_after(wait),
            None => error,
        },
        _ => error,
    }
}

/// Whether the failure is the credential's fault rather than the resource's
pub fn is_credential_failure(error: &UpstreamError, forbidden: &ForbiddenConfig) -> bool {
    match error.kind {
        UpstreamErrorKind::Unauthorized => true,
        UpstreamErrorKind::Forbidden => match forbidden.policy {
            ForbiddenPolicy::Passthrough => false,
            ForbiddenPolicy::Always => true,
            ForbiddenPolicy::KeyRestriction => {
                let message = error.message.to_lowercase();
                forbidden
                    .markers
                    .iter()
                    .any(|marker| !marker.is_empty() && message.contains(&marker.to_lowercase()))
            }
        },
        _ => false,
    }
}

/// `status.message`, then top-level `message`, then the raw body text
fn extract_message(json: Option<&Value>, body: &[u8]) -> Option<String> {
    if let Some(json) = json {
        let nested = json
            .pointer("/status/message")
            .and_then(Value::as_str)
            .or_else(|| json.get("message").and_then(Value::as_str));
        if let Some(message) = nested {
            return Some(message.to_string());
        }
    }

    let text = String::from_utf8_lossy(body);
    if text.trim().is_empty() {
        None
    } else {
        Some(text.into_owned())
    }
}

fn fallback_message(status: u16) -> String {
    match status {
        400 => "Bad request".to_string(),
        401 => "Unauthorized".to_string(),
        403 => "Forbidden".to_string(),
        404 => "Data not found".to_string(),
        429 => "Rate limit exceeded".to_string(),
        500..=599 => "Upstream service unavailable".to_string(),
        _ => format!("Unexpected upstream status {}", status),
    }
}

/// `Retry-After` as delta-seconds or an HTTP date
fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

/// `retry_after` (seconds) at the top level or under `status`
fn retry_after_field(json: &Value) -> Option<Duration> {
    let secs = json
        .get("retry_after")
        .or_else(|| json.pointer("/status/retry_after"))
        .and_then(Value::as_f64)?;
    Duration::try_from_secs_f64(secs).ok()
}
