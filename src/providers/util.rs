use crate::core::error::FetchError;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// How many times a failed fetch is re-attempted before giving up.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        RetryPolicy {
            retries: 0,
            delay: Duration::ZERO,
        }
    }
}

/// Retries an async fetch while it keeps failing with a transient error
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `policy`: retry attempts (total runs = 1 initial + retries) and delay between them
///
/// # Returns
/// Either the successful result or the last error. Non-transient errors
/// (unknown symbol, malformed payload) are returned immediately.
pub async fn with_retry<F, Fut, T>(mut operation: F, policy: RetryPolicy) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > policy.retries || !err.is_transient() {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, policy.retries, err
                );
                attempt += 1;
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

/// Builds the shared HTTP client every provider uses.
pub fn http_client() -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .user_agent("pulseboard/0.1")
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| FetchError::network("http client", e))
}

/// Sends a GET request and decodes a JSON body, mapping every failure mode
/// to a `FetchError` for `target`.
pub async fn get_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    target: &str,
) -> Result<T, FetchError> {
    let response = request
        .send()
        .await
        .map_err(|e| FetchError::network(target, e))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound(target.to_string()));
    }
    if !status.is_success() {
        return Err(FetchError::Http {
            target: target.to_string(),
            status: status.as_u16(),
        });
    }

    let text = response
        .text()
        .await
        .map_err(|e| FetchError::network(target, e))?;
    serde_json::from_str(&text).map_err(|e| FetchError::malformed(target, e))
}
