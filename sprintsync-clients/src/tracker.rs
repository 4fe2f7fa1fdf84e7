//! Issue-tracker REST client.
//!
//! Requests are authenticated with a Bearer token and time out after ten
//! seconds. Responses with status 429 or 5xx are retried through
//! [`Retry`]; a `Retry-After` header, when present and usable, replaces the
//! computed backoff. Every other failure propagates immediately.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Method};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::retry::{Retry, RetryPolicy};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker request needs a non-empty path")]
    MissingPath,

    #[error("tracker returned status {status}: {body}")]
    Status {
        status: u16,
        body: String,
        /// Server-provided wait before the next attempt.
        retry_after: Option<Duration>,
    },

    #[error("tracker request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("tracker response was malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid tracker configuration: {0}")]
    Configuration(String),
}

impl TrackerError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TrackerError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Only rate limiting and server errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self.status(), Some(429) | Some(500..=599))
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TrackerError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One call against the tracker API, relative to the client's base URL.
#[derive(Debug, Clone, Default)]
pub struct TrackerRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl TrackerRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }
}

/// Seam between processors and the tracker transport.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    /// Perform `request` and return the decoded JSON body.
    async fn request(&self, request: TrackerRequest) -> Result<Value, TrackerError>;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct TrackerClient {
    base_url: String,
    client: Client,
    policy: RetryPolicy,
}

impl TrackerClient {
    pub fn new(base_url: &str, api_token: &str) -> Result<Self, TrackerError> {
        let mut headers = header::HeaderMap::new();
        let auth = header::HeaderValue::from_str(&format!("Bearer {api_token}"))
            .map_err(|err| TrackerError::Configuration(format!("API token is invalid: {err}")))?;
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|err| {
                TrackerError::Configuration(format!("failed to build HTTP client: {err}"))
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client,
            policy: RetryPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send_once(&self, request: &TrackerRequest) -> Result<Value, TrackerError> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.endpoint(&request.path))
            .query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(TrackerError::Transport)?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));
        let body = response.text().await.map_err(TrackerError::Transport)?;

        if !status.is_success() {
            return Err(TrackerError::Status {
                status: status.as_u16(),
                body,
                retry_after,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl TrackerApi for TrackerClient {
    async fn request(&self, request: TrackerRequest) -> Result<Value, TrackerError> {
        if request.path.trim().is_empty() {
            return Err(TrackerError::MissingPath);
        }

        let path = request.path.clone();
        Retry::new(self.policy.clone())
            .should_retry(|err: &TrackerError, _| err.is_retryable())
            .retry_delay(|err: &TrackerError, _| err.retry_after())
            .on_retry(move |a| {
                warn!(
                    path = %path,
                    attempt = a.attempt,
                    delay_ms = a.delay.as_millis() as u64,
                    status = ?a.error.status(),
                    "retrying tracker request"
                );
            })
            .run(|_| self.send_once(&request))
            .await
    }
}

/// Interpret a `Retry-After` value as a wait.
///
/// Numbers are seconds. Dates (RFC 2822 / HTTP-date) give the time left
/// until that instant; past dates and anything unparseable yield `None`.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(seconds) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(seconds).ok();
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    let delta = at - now;
    if delta <= chrono::Duration::zero() {
        return None;
    }
    delta.to_std().ok()
}
