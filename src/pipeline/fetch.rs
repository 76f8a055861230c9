//! Page download with bounded retry.
//!
//! A page fetch is the only job-fatal network call: without the HTML there
//! is nothing to render. Transport errors and non-2xx statuses are retried
//! up to `retry_attempts` extra times. By default retries are immediate;
//! `retry_backoff_ms` turns on exponential backoff without changing the
//! attempt bound.

use crate::config::RenderConfig;
use crate::error::FetchError;
use crate::pipeline::charset::charset_from_content_type;
use encoding_rs::Encoding;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Url};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Raw page bytes plus the URL they were finally served from.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub body: Vec<u8>,
    /// Effective URL after redirects; relative references resolve against it.
    pub final_url: Url,
    /// Raw `Content-Type` header, when the server sent one.
    pub content_type: Option<String>,
}

impl FetchResult {
    /// Character encoding named by the `Content-Type` charset, if any.
    pub fn declared_encoding(&self) -> Option<&'static Encoding> {
        self.content_type.as_deref().and_then(charset_from_content_type)
    }
}

/// HTTP fetcher shared by every job in a batch.
///
/// Wraps a single [`reqwest::Client`] so connection pools are reused across
/// jobs. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct ContentFetcher {
    client: Client,
    retry_attempts: u32,
    retry_backoff_ms: u64,
}

impl ContentFetcher {
    pub fn new(client: Client, retry_attempts: u32, retry_backoff_ms: u64) -> Self {
        Self {
            client,
            retry_attempts,
            retry_backoff_ms,
        }
    }

    /// Build a fetcher from the batch configuration.
    pub fn from_config(client: Client, config: &RenderConfig) -> Self {
        Self::new(client, config.retry_attempts, config.retry_backoff_ms)
    }

    /// The underlying client, for image downloads that share its pool.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// GET `url`, retrying transport errors and non-2xx responses.
    ///
    /// Performs at most `retry_attempts + 1` requests. A WARN event is emitted
    /// before every retry.
    ///
    /// # Errors
    /// [`FetchError`] carrying the URL, the number of attempts made, and the
    /// last failure.
    pub async fn fetch(
        &self,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<FetchResult, FetchError> {
        let total_attempts = self.retry_attempts + 1;
        let mut last_err = String::new();

        for attempt in 0..total_attempts {
            if attempt > 0 {
                warn!(
                    "Retrying {} (attempt {}/{}) after: {}",
                    url,
                    attempt + 1,
                    total_attempts,
                    last_err
                );
                if self.retry_backoff_ms > 0 {
                    sleep(backoff_delay(self.retry_backoff_ms, attempt)).await;
                }
            }

            match self.fetch_once(url, headers, timeout).await {
                Ok(result) => {
                    debug!(
                        "Fetched {} ({} bytes, final URL {})",
                        url,
                        result.body.len(),
                        result.final_url
                    );
                    return Ok(result);
                }
                Err(reason) => last_err = reason,
            }
        }

        Err(FetchError {
            url: url.to_string(),
            attempts: total_attempts,
            reason: last_err,
        })
    }

    async fn fetch_once(
        &self,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<FetchResult, String> {
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("timed out after {}s", timeout.as_secs())
                } else {
                    e.to_string()
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| e.to_string())?;

        Ok(FetchResult {
            body: body.to_vec(),
            final_url,
            content_type,
        })
    }
}

/// Delay before retry number `retry` (1-based): `base_ms * 2^(retry-1)`,
/// saturating instead of overflowing for long retry chains.
fn backoff_delay(base_ms: u64, retry: u32) -> Duration {
    let factor = 2u64
        .checked_pow(retry.saturating_sub(1))
        .unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// Headers for the page request.
pub fn page_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(ua) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, ua);
    }
    headers.insert(ACCEPT, HeaderValue::from_static(HTML_ACCEPT));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn fetcher(retries: u32) -> ContentFetcher {
        ContentFetcher::new(Client::new(), retries, 0)
    }

    #[tokio::test]
    async fn fetch_returns_body_and_final_url() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/page").header("accept", HTML_ACCEPT);
                then.status(200).body("<html></html>");
            })
            .await;

        let url = server.url("/page");
        let result = fetcher(2)
            .fetch(&url, &page_headers("test-agent"), Duration::from_secs(5))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.body, b"<html></html>");
        assert_eq!(result.final_url.as_str(), url);
    }

    #[tokio::test]
    async fn fetch_keeps_content_type_charset() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/latin1");
                then.status(200)
                    .header("content-type", "text/html; charset=ISO-8859-1")
                    .body(b"<p>caf\xe9</p>".to_vec());
            })
            .await;

        let result = fetcher(0)
            .fetch(&server.url("/latin1"), &HeaderMap::new(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(result.body, b"<p>caf\xe9</p>");
        assert_eq!(result.declared_encoding(), Some(encoding_rs::WINDOWS_1252));
    }

    #[tokio::test]
    async fn fetch_with_backoff_keeps_attempt_bound() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/down");
                then.status(500);
            })
            .await;

        let err = ContentFetcher::new(Client::new(), 2, 5)
            .fetch(&server.url("/down"), &HeaderMap::new(), Duration::from_secs(5))
            .await
            .unwrap_err();

        mock.assert_calls_async(3).await;
        assert_eq!(err.attempts, 3);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_delay(100, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(100, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(100, 4), Duration::from_millis(800));
        assert_eq!(backoff_delay(100, 65), Duration::from_millis(u64::MAX));
        assert_eq!(backoff_delay(1, u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[tokio::test]
    async fn fetch_makes_exactly_retry_plus_one_attempts() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/flaky");
                then.status(503);
            })
            .await;

        let url = server.url("/flaky");
        let err = fetcher(2)
            .fetch(&url, &HeaderMap::new(), Duration::from_secs(5))
            .await
            .unwrap_err();

        mock.assert_calls_async(3).await;
        assert_eq!(err.attempts, 3);
        assert_eq!(err.url, url);
        assert!(err.reason.contains("503"), "got: {}", err.reason);
    }

    #[tokio::test]
    async fn fetch_with_zero_retries_tries_once() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/gone");
                then.status(404);
            })
            .await;

        let err = fetcher(0)
            .fetch(&server.url("/gone"), &HeaderMap::new(), Duration::from_secs(5))
            .await
            .unwrap_err();

        mock.assert_calls_async(1).await;
        assert_eq!(err.attempts, 1);
    }

    #[tokio::test]
    async fn fetch_reports_transport_errors() {
        // Port 9 (discard) on localhost is closed in test environments.
        let err = fetcher(1)
            .fetch("http://127.0.0.1:9/", &HeaderMap::new(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(!err.reason.is_empty());
    }

    #[test]
    fn page_headers_carry_user_agent() {
        let h = page_headers("agent/1.0");
        assert_eq!(h.get(USER_AGENT).unwrap(), "agent/1.0");
        assert!(h.get(ACCEPT).unwrap().to_str().unwrap().starts_with("text/html"));
    }
}
