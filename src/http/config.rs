//! Per-client configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Url;

use super::error::ConfigError;
use super::retry::DEFAULT_MAX_ATTEMPTS;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable configuration of one [`ApiClient`](super::ApiClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    timeout: Duration,
    retry_attempts: u32,
    default_headers: BTreeMap<String, String>,
    service_name: String,
    span: Option<tracing::Span>,
}

impl ClientConfig {
    /// Starts a builder; the base URL is normalized in [`ClientConfigBuilder::build`].
    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            retry_attempts: DEFAULT_MAX_ATTEMPTS,
            default_headers: BTreeMap::new(),
            service_name: "api".to_string(),
            span: None,
        }
    }

    /// Always ends with exactly one `/`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Attempts per call, including the first one.
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Headers sent with every request, by name.
    pub fn default_headers(&self) -> &BTreeMap<String, String> {
        &self.default_headers
    }

    /// Name used in logs and the client span.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub(crate) fn span(&self) -> Option<&tracing::Span> {
        self.span.as_ref()
    }

    /// Joins the base URL and a relative endpoint with a single `/`.
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

#[derive(Debug)]
pub struct ClientConfigBuilder {
    base_url: String,
    timeout: Duration,
    retry_attempts: u32,
    default_headers: BTreeMap<String, String>,
    service_name: String,
    span: Option<tracing::Span>,
}

impl ClientConfigBuilder {
    /// Per-attempt timeout; defaults to [`DEFAULT_TIMEOUT`].
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attempts per call including the first; must be at least 1.
    #[must_use]
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Adds a default header, replacing an earlier one with the same name.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Name reported in the `service` field of every log event.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Parent span for the client's events; owned by the host application.
    #[must_use]
    pub fn span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Normalizes the base URL and validates the attempt count.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let base_url = normalize_base_url(&self.base_url)?;

        if self.retry_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }

        Ok(ClientConfig {
            base_url,
            timeout: self.timeout,
            retry_attempts: self.retry_attempts,
            default_headers: self.default_headers,
            service_name: self.service_name,
            span: self.span,
        })
    }
}

/// Trims whitespace and trailing slashes, validates, and appends one `/`.
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyBaseUrl);
    }

    let normalized = format!("{}/", trimmed);
    let parsed = Url::parse(&normalized).map_err(|e| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if parsed.cannot_be_a_base() {
        return Err(ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: "URL cannot be used as a base".to_string(),
        });
    }

    Ok(normalized)
}
