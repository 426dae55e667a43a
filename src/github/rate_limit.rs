//! Classification of GitHub REST error responses.
//!
//! GitHub signals rate limits through:
//! - HTTP 403 with `x-ratelimit-remaining: 0` (primary rate limit)
//! - HTTP 403 or 429 with a `retry-after` header (secondary rate limit)
//! - HTTP 403 with "rate limit" in the message body

use std::time::Duration;

use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode};
use serde::Deserialize;

use crate::error::SearchError;
use crate::types::RateLimitInfo;

/// Wait applied when GitHub reports a rate limit without saying for how long.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Extract `x-ratelimit-*` headers.
pub(crate) fn rate_limit_info(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let limit = header_u64(headers, "x-ratelimit-limit")?;
    let remaining = header_u64(headers, "x-ratelimit-remaining")?;
    let reset_at = header_u64(headers, "x-ratelimit-reset")
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    Some(RateLimitInfo {
        limit: u32::try_from(limit).unwrap_or(u32::MAX),
        remaining: u32::try_from(remaining).unwrap_or(u32::MAX),
        reset_at,
    })
}

/// How long to wait before retrying, from `retry-after` or the reset time.
fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(secs) = header_u64(headers, "retry-after") {
        return Some(Duration::from_secs(secs));
    }
    let info = rate_limit_info(headers)?;
    if info.remaining > 0 {
        return None;
    }
    let reset = info.reset_at?;
    Some((reset - now).to_std().unwrap_or(Duration::ZERO))
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    resource: Option<String>,
    field: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

/// Human-readable message from a GitHub error body, falling back to the raw
/// body text.
pub(crate) fn error_message(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return body.trim().to_owned();
    };
    let mut message = parsed.message;
    for err in parsed.errors {
        match (err.resource, err.field, err.code, err.message) {
            (_, _, _, Some(msg)) => {
                message.push_str(&format!(" [{msg}]"));
            }
            (Some(resource), Some(field), Some(code), None) => {
                message.push_str(&format!(" [{resource}:{field} - {code}]"));
            }
            _ => {}
        }
    }
    if message.is_empty() {
        body.trim().to_owned()
    } else {
        message
    }
}

/// Map a non-success search response to a `SearchError`.
pub(crate) fn classify(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now: DateTime<Utc>,
) -> SearchError {
    let message = error_message(body);

    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (retry_after(headers, now).is_some()
                || message.to_lowercase().contains("rate limit")))
    {
        return SearchError::RateLimited {
            retry_after: retry_after(headers, now).unwrap_or(DEFAULT_RETRY_AFTER),
        };
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SearchError::Auth(message),
        StatusCode::UNPROCESSABLE_ENTITY => SearchError::InvalidQuery(message),
        StatusCode::REQUEST_TIMEOUT => SearchError::Transient(format!("{status}: {message}")),
        s if s.is_client_error() => SearchError::InvalidQuery(format!("{status}: {message}")),
        _ => SearchError::Transient(format!("{status}: {message}")),
    }
}
