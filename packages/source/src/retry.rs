//! HTTP retry helpers for transient errors.
//!
//! Feed requests go through [`send_json`] instead of calling
//! `reqwest::RequestBuilder::send()` directly, so every request retries
//! timeouts, connection resets, HTTP 429, and HTTP 5xx with capped
//! exponential backoff.
//!
//! ```ignore
//! use crate::retry::{self, RetryPolicy};
//!
//! let body = retry::send_json(&RetryPolicy::default(), || client.get(&url)).await?;
//! ```

use std::time::Duration;

use crate::SourceError;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Upper bound for a single backoff sleep.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Sleep before retry number `attempt` (1-based): `min(2^attempt, max)`
    /// seconds.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.max_backoff)
    }
}

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// A response whose body cannot be read or parsed is re-fetched through
/// the same retry budget.
///
/// # Errors
///
/// Returns [`SourceError::Status`] for HTTP 4xx other than 429 (these are
/// never retried), or the last transient error once the retries run out.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    policy: &RetryPolicy,
    build_request: F,
) -> Result<serde_json::Value, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    for body_attempt in 0..=policy.max_retries {
        let response = send_inner(&build_request, policy).await?;

        let url = response.url().to_string();
        let status = response.status();

        // Read the raw body first so a parse failure can show what arrived.
        let error = match response.text().await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(value) => return Ok(value),
                Err(json_err) => {
                    let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
                    log::warn!(
                        "JSON parse failed for {url} (status {status}, {} bytes): {json_err}\n  \
                         body preview: {preview}",
                        text.len(),
                    );
                    SourceError::Json(json_err)
                }
            },
            Err(e) => {
                log::warn!("Response body read failed for {url} (status {status}): {e}");
                SourceError::Http(e)
            }
        };

        if body_attempt == policy.max_retries {
            return Err(error);
        }
        let delay = policy.backoff(body_attempt + 1);
        log::warn!(
            "  body retry {}/{} in {delay:?}...",
            body_attempt + 1,
            policy.max_retries
        );
        tokio::time::sleep(delay).await;
    }

    unreachable!("send_json body retry loop exited without returning")
}

/// Core retry loop. Returns the first successful (2xx/3xx) response.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let max_retries = policy.max_retries;
    let mut last_error: Option<SourceError> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = policy.backoff(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    last_error = Some(SourceError::Http(e));
                    continue;
                }
                return Err(SourceError::Http(e));
            }
            Ok(response) => {
                let status = response.status();
                let url = response.url().to_string();

                if is_retryable_status(status) {
                    let error = SourceError::Status {
                        status: status.as_u16(),
                        url,
                    };
                    if attempt < max_retries {
                        log::warn!("  {error}");
                        last_error = Some(error);
                        continue;
                    }
                    return Err(error);
                }

                if status.is_client_error() {
                    return Err(SourceError::Status {
                        status: status.as_u16(),
                        url,
                    });
                }

                return Ok(response);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SourceError::Normalization {
        message: "request failed after all retries".to_string(),
    }))
}

/// HTTP 429 and 5xx are worth another attempt.
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}
