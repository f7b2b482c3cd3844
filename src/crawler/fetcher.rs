//! HTTP page fetcher with pacing, retries and charset detection
//!
//! This module provides the single entry point for GET requests against the
//! catalog and the REST API:
//! - Request pacing with governor
//! - Fixed-attempt retry with a constant delay
//! - Charset detection (declared charset, UTF-8, Windows-1252 fallback)
//! - JSON decoding for API pages

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE},
    Client, Response,
};
use std::num::NonZeroU32;
use std::time::Duration;

use crate::config::Config;
use crate::parser::Document;
use crate::utils::error::FetchError;
use crate::utils::retry::{with_retry_if, RetryConfig};

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const JSON_ACCEPT: &str = "application/json";

/// Paced, retrying HTTP GET client
///
/// Every failure mode (timeout, transport error, non-2xx status) is retried
/// until the attempt budget is spent; callers receive either a parsed page or
/// an error they are expected to log and skip.
pub struct PageFetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Attempt budget and delay
    retry: RetryConfig,
}

impl PageFetcher {
    /// Create a fetcher for catalog pages from the application configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        Self::with_config(
            config.http.requests_per_second,
            config.retry(),
            config.request_timeout(),
            &config.http.user_agent,
        )
    }

    /// Create a fetcher with custom pacing, retry policy and timeout
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn with_config(
        requests_per_second: u32,
        retry: RetryConfig,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7"),
        );

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .gzip(true)
            .cookie_store(true)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            retry,
        })
    }

    /// Retry policy used by this fetcher
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Fetch and parse an HTML page
    ///
    /// # Errors
    ///
    /// Returns `FetchError::MaxRetriesExceeded` once every attempt failed with
    /// a transient error, or the first non-transient error encountered
    pub async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        tracing::debug!(url, "Fetching page");

        let html = self
            .get_with_retry(url, &[], HTML_ACCEPT, |response| async move {
                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                    .unwrap_or_default();
                let bytes = response.bytes().await.map_err(FetchError::Http)?;
                Ok::<_, FetchError>(decode_bytes(&bytes, &content_type))
            })
            .await?;

        tracing::debug!(url, bytes = html.len(), "Retrieved page");
        Ok(Document::parse(html))
    }

    /// Fetch a JSON document, optionally with query parameters
    ///
    /// # Errors
    ///
    /// Same as [`fetch`](Self::fetch); a body that is not valid JSON is a
    /// non-transient `FetchError::Decode`
    pub async fn fetch_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, FetchError> {
        tracing::debug!(url, ?query, "Fetching JSON");

        self.get_with_retry(url, query, JSON_ACCEPT, |response| async move {
            let bytes = response.bytes().await.map_err(FetchError::Http)?;
            serde_json::from_slice::<serde_json::Value>(&bytes)
                .map_err(|e| FetchError::Decode(e.to_string()))
        })
        .await
    }

    async fn get_with_retry<T, F, Fut>(
        &self,
        url: &str,
        query: &[(&str, String)],
        accept: &'static str,
        read_body: F,
    ) -> Result<T, FetchError>
    where
        F: Fn(Response) -> Fut,
        Fut: std::future::Future<Output = Result<T, FetchError>>,
    {
        let read_body = &read_body;
        let result = with_retry_if(
            &self.retry,
            |attempt| async move {
                tracing::trace!(url, attempt, "Sending request");
                let response = self.send_once(url, query, accept).await?;
                read_body(response).await
            },
            FetchError::is_transient,
        )
        .await;

        result.map_err(|e| {
            if e.is_transient() {
                tracing::error!(url, attempts = self.retry.max_attempts, error = %e, "Giving up on request");
                FetchError::MaxRetriesExceeded {
                    attempts: self.retry.max_attempts,
                    last: e.to_string(),
                }
            } else {
                e
            }
        })
    }

    async fn send_once(
        &self,
        url: &str,
        query: &[(&str, String)],
        accept: &'static str,
    ) -> Result<Response, FetchError> {
        self.rate_limiter.until_ready().await;

        let mut request = self.client.get(url).header(ACCEPT, accept);
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else if e.is_builder() {
                FetchError::InvalidUrl(url.to_string())
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::ServerError(status.as_u16()));
        }

        Ok(response)
    }
}

/// Decode a response body to text
///
/// Strategy:
/// 1. Charset declared in the Content-Type header, when recognized
/// 2. Strict UTF-8
/// 3. Windows-1252, a superset of the Latin-1 still served by older portals
pub fn decode_bytes(bytes: &[u8], content_type: &str) -> String {
    let declared = content_type
        .to_ascii_lowercase()
        .split(';')
        .filter_map(|part| part.trim().strip_prefix("charset=").map(str::to_string))
        .next()
        .and_then(|label| Encoding::for_label(label.trim_matches('"').as_bytes()));

    if let Some(encoding) = declared {
        let (text, _, _) = encoding.decode(bytes);
        return text.into_owned();
    }

    let (text, _, had_errors) = UTF_8.decode(bytes);
    if !had_errors {
        return text.into_owned();
    }

    let (text, _, _) = WINDOWS_1252.decode(bytes);
    text.into_owned()
}
