//! HTTP client module with retry logic and error handling.

mod client;
mod config;
mod error;
mod params;
mod retry;

pub use client::{
    ApiClient, ApiClientBuilder, ApiRequest, HeaderProvider, ResponseClassifier, USER_AGENT,
    classify_response, parse_header,
};
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_TIMEOUT, normalize_base_url};
pub use error::{ApiError, BoxError, ConfigError, ErrorKind};
pub use params::{DATE_FORMAT, ParamValue, Params, TIMESTAMP_FORMAT};
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_WAIT_MAX, DEFAULT_WAIT_MIN, RetryPolicy, RetryPolicyBuilder,
    RetryPredicate, call_with_retry, default_retryable,
};
