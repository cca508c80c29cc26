//! Retrying JSON fetch utilities shared by the catalog server and its client.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, info_span, warn, Instrument};

/// Resolves after `duration` has elapsed.
pub async fn delay(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Retries after the initial attempt.
    pub retries: u32,
    pub base_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl BackoffPolicy {
    pub fn new(retries: u32, base_delay: Duration) -> Self {
        Self {
            retries,
            base_delay,
        }
    }

    pub fn delay_for_attempt(&self, attempt_index: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt_index).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Runs `operation` until it succeeds, fails terminally, or the retry budget
/// runs out. Waits double after every failed attempt.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: BackoffPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) if attempt >= policy.retries => {
                error!(
                    label,
                    attempts = attempt + 1,
                    error = %err,
                    "call failed after multiple retries"
                );
                return Err(err);
            }
            Err(err) => {
                let wait = policy.delay_for_attempt(attempt);
                warn!(
                    label,
                    error = %err,
                    retries_left = policy.retries - attempt,
                    "call failed; retrying in {}ms",
                    wait.as_millis()
                );
                delay(wait).await;
                attempt += 1;
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{message}")]
    HttpStatus {
        status: u16,
        message: String,
        details: Option<JsonValue>,
    },
    #[error("malformed response from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid response shape: {0}")]
    InvalidShape(String),
}

impl ApiError {
    /// Builds the error for a non-2xx response, preferring a `message` field
    /// from a JSON error body when one parses.
    pub fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let details = serde_json::from_slice::<JsonValue>(body).ok();
        let message = details
            .as_ref()
            .and_then(|d| d.get("message"))
            .map(|m| match m {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| {
                format!(
                    "API Error: {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or_default()
                )
                .trim_end()
                .to_string()
            });
        ApiError::HttpStatus {
            status: status.as_u16(),
            message,
            details,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn details(&self) -> Option<&JsonValue> {
        match self {
            ApiError::HttpStatus { details, .. } => details.as_ref(),
            _ => None,
        }
    }
}

impl Retryable for ApiError {
    fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transport { .. } | ApiError::HttpStatus { .. })
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Deadline for a single attempt, connect through body.
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: Some(concat!("skiphire/", env!("CARGO_PKG_VERSION")).to_string()),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            backoff: config.backoff,
        })
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// GETs `url` and decodes the JSON body, retrying with the fetcher's policy.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        self.get_json_with(url, self.backoff).await
    }

    pub async fn get_json_with<T: DeserializeOwned>(
        &self,
        url: &str,
        policy: BackoffPolicy,
    ) -> Result<T, ApiError> {
        let span = info_span!("http_fetch", url);
        retry_with_backoff(policy, url, || self.attempt(url))
            .instrument(span)
            .await
    }

    async fn attempt<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let transport = |source| ApiError::Transport {
            url: url.to_string(),
            source,
        };

        let resp = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(transport)?;

        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }

        serde_json::from_slice(&body).map_err(|source| ApiError::Malformed {
            url: url.to_string(),
            source,
        })
    }
}
