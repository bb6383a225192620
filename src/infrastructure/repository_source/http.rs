//! HTTP plumbing shared by the forge clients: client construction, JSON GETs
//! and mapping of non-success responses onto [`RepositorySourceError`].

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::{RepositorySourceError, RepositorySourceResult};

const MAX_MESSAGE_LEN: usize = 200;

/// Build a client with a finite timeout and the given default headers
pub fn build_client(
    user_agent: &str,
    timeout: Duration,
    mut headers: HeaderMap,
) -> RepositorySourceResult<Client> {
    let agent = HeaderValue::from_str(user_agent)
        .map_err(|e| RepositorySourceError::Configuration(format!("user agent: {}", e)))?;
    headers.insert(USER_AGENT, agent);

    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| RepositorySourceError::Configuration(e.to_string()))
}

/// GET `url` and decode a JSON body, classifying every failure
pub async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> RepositorySourceResult<T> {
    debug!(url, "GET");
    let response = client.get(url).send().await.map_err(transport_error)?;
    let status = response.status();

    if status.is_success() {
        return response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                RepositorySourceError::Decode(format!("{}: {}", url, e))
            } else {
                transport_error(e)
            }
        });
    }

    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    Err(classify_error_response(status, &headers, &body, url))
}

/// Map a transport-level failure. Timeouts are network errors like any other
/// and are never retried within a run.
pub fn transport_error(e: reqwest::Error) -> RepositorySourceError {
    if e.is_timeout() {
        RepositorySourceError::Network(format!("request timed out: {}", e))
    } else {
        RepositorySourceError::Network(e.to_string())
    }
}

/// Classify a non-success response.
///
/// 403 is ambiguous on GitHub: it signals both exhausted rate limits and
/// missing permissions. It is only treated as a rate limit when the response
/// carries a rate-limit signal (`x-ratelimit-remaining: 0`, `retry-after`, or
/// a body mentioning "rate limit"). 429 is always a rate limit.
pub fn classify_error_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    url: &str,
) -> RepositorySourceError {
    let message = extract_message(body);

    match status {
        StatusCode::NOT_FOUND => RepositorySourceError::NotFound(url.to_string()),
        StatusCode::TOO_MANY_REQUESTS => RepositorySourceError::RateLimited {
            retry_after: retry_after_secs(headers),
            message,
        },
        StatusCode::FORBIDDEN if has_rate_limit_signal(headers, body) => {
            RepositorySourceError::RateLimited {
                retry_after: retry_after_secs(headers),
                message,
            }
        }
        other => RepositorySourceError::Api {
            status: other.as_u16(),
            message,
        },
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn has_rate_limit_signal(headers: &HeaderMap, body: &str) -> bool {
    let exhausted = ["x-ratelimit-remaining", "ratelimit-remaining"]
        .iter()
        .any(|name| header_str(headers, name) == Some("0"));
    exhausted
        || headers.contains_key("retry-after")
        || body.to_lowercase().contains("rate limit")
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    if let Some(secs) = header_str(headers, "retry-after").and_then(|v| v.parse::<u64>().ok()) {
        return Some(secs);
    }
    ["x-ratelimit-reset", "ratelimit-reset"]
        .iter()
        .find_map(|name| header_str(headers, name).and_then(|v| v.parse::<i64>().ok()))
        .map(|reset| (reset - Utc::now().timestamp()).max(0) as u64)
}

/// Prefer the API's `message` field, otherwise a truncated body
fn extract_message(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string));
    let message = from_json.unwrap_or_else(|| body.trim().to_string());
    if message.chars().count() > MAX_MESSAGE_LEN {
        message.chars().take(MAX_MESSAGE_LEN).collect::<String>() + "…"
    } else {
        message
    }
}
