//! Error taxonomy raised at the client boundary.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Boxed cause carried by an [`ApiError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The closed set of failure categories a call can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection failure, timeout, or a broken response stream.
    Network,
    /// The upstream refused the call because of a rate limit or quota.
    RateLimit,
    /// 5xx from the upstream.
    ServiceUnavailable,
    /// The payload could not be decoded or did not match the expected schema.
    InvalidResponse,
    /// Any other failure, typically a 4xx caused by the request itself.
    Api,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::RateLimit => write!(f, "rate-limit"),
            ErrorKind::ServiceUnavailable => write!(f, "service-unavailable"),
            ErrorKind::InvalidResponse => write!(f, "invalid-response"),
            ErrorKind::Api => write!(f, "api"),
        }
    }
}

/// Errors returned by [`ApiClient`](super::ApiClient) and the service clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// `quota` names the service that promoted a vendor-specific quota
    /// message into a rate-limit error; `None` for a plain HTTP 429.
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        status: Option<StatusCode>,
        quota: Option<&'static str>,
        retry_after: Option<Duration>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        message: String,
        status: Option<StatusCode>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Invalid response: {message}")]
    InvalidResponse {
        message: String,
        status: Option<StatusCode>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("API error: {message}")]
    Api {
        message: String,
        status: Option<StatusCode>,
        #[source]
        source: Option<BoxError>,
    },
}

impl ApiError {
    /// Connection failure or timeout, wrapping the transport error.
    pub fn network(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ApiError::Network {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// A plain HTTP 429.
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        ApiError::RateLimit {
            message: message.into(),
            status: Some(StatusCode::TOO_MANY_REQUESTS),
            quota: None,
            retry_after,
            source: None,
        }
    }

    /// A service-specific quota error promoted by a response classifier.
    pub fn quota_exhausted(
        service: &'static str,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        ApiError::RateLimit {
            message: message.into(),
            status: Some(status),
            quota: Some(service),
            retry_after: None,
            source: None,
        }
    }

    /// A 5xx response.
    pub fn service_unavailable(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable {
            message: message.into(),
            status: Some(status),
            source: None,
        }
    }

    /// A 2xx body that is not JSON or does not match the expected shape.
    pub fn invalid_response(
        message: impl Into<String>,
        status: Option<StatusCode>,
        source: Option<BoxError>,
    ) -> Self {
        ApiError::InvalidResponse {
            message: message.into(),
            status,
            source,
        }
    }

    /// Any other failure: non-429 4xx responses and caller mistakes such as
    /// an unknown endpoint or a missing parameter.
    pub fn api(message: impl Into<String>, status: Option<StatusCode>) -> Self {
        ApiError::Api {
            message: message.into(),
            status,
            source: None,
        }
    }

    /// Attach a cause to any variant, replacing a previous one.
    pub fn with_source(mut self, cause: impl Into<BoxError>) -> Self {
        let slot = match &mut self {
            ApiError::Network { source, .. }
            | ApiError::RateLimit { source, .. }
            | ApiError::ServiceUnavailable { source, .. }
            | ApiError::InvalidResponse { source, .. }
            | ApiError::Api { source, .. } => source,
        };
        *slot = Some(cause.into());
        self
    }

    /// The variant as a plain tag, for matching and logging.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network { .. } => ErrorKind::Network,
            ApiError::RateLimit { .. } => ErrorKind::RateLimit,
            ApiError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            ApiError::InvalidResponse { .. } => ErrorKind::InvalidResponse,
            ApiError::Api { .. } => ErrorKind::Api,
        }
    }

    /// Human-readable message, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            ApiError::Network { message, .. }
            | ApiError::RateLimit { message, .. }
            | ApiError::ServiceUnavailable { message, .. }
            | ApiError::InvalidResponse { message, .. }
            | ApiError::Api { message, .. } => message,
        }
    }

    /// HTTP status of the response that produced this error, if there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Network { .. } => None,
            ApiError::RateLimit { status, .. }
            | ApiError::ServiceUnavailable { status, .. }
            | ApiError::InvalidResponse { status, .. }
            | ApiError::Api { status, .. } => *status,
        }
    }

    /// The service tag of a quota error, e.g. `Some("bmrs")`.
    pub fn quota_service(&self) -> Option<&'static str> {
        match self {
            ApiError::RateLimit { quota, .. } => *quota,
            _ => None,
        }
    }

    /// Whether a service classifier flagged this as a quota error.
    pub fn is_quota_exhausted(&self) -> bool {
        self.quota_service().is_some()
    }

    /// Transient failures: network and 5xx.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Network | ErrorKind::ServiceUnavailable
        )
    }
}

/// Errors raised while constructing a client. Never produced by a call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Base URL must not be empty")]
    EmptyBaseUrl,

    #[error("Invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Retry attempts must be at least 1")]
    ZeroAttempts,

    #[error("Invalid wait bounds: min {min:?} is greater than max {max:?}")]
    InvalidWaitBounds { min: Duration, max: Duration },

    #[error("Backoff multiplier must be a positive finite number, got {0}")]
    InvalidMultiplier(f64),

    #[error("{0} API key is required")]
    MissingCredential(&'static str),

    #[error("Invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
