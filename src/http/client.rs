//! Base HTTP client: URL building, header merging, response classification
//! and retries.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{Instrument, error, info};

use super::config::ClientConfig;
use super::error::{ApiError, ConfigError};
use super::params::Params;
use super::retry::{RetryPolicy, call_with_retry};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("gridclient/", env!("GRIDCLIENT_VERSION"));

/// Longest slice of a response body copied into an error message.
const BODY_SNIPPET_LEN: usize = 512;

/// Produces extra headers for every request (e.g. credentials).
pub type HeaderProvider = Arc<dyn Fn() -> HeaderMap + Send + Sync>;

/// Inspects a response before the status-based classification runs.
///
/// Returning `Some` short-circuits the base rules, for any status including
/// 2xx.
pub trait ResponseClassifier: Send + Sync {
    fn classify(&self, status: StatusCode, body: &str) -> Option<ApiError>;
}

impl<F> ResponseClassifier for F
where
    F: Fn(StatusCode, &str) -> Option<ApiError> + Send + Sync,
{
    fn classify(&self, status: StatusCode, body: &str) -> Option<ApiError> {
        self(status, body)
    }
}

/// One outbound call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    endpoint: String,
    params: Params,
    body: Option<Value>,
    headers: HeaderMap,
}

impl ApiRequest {
    /// A request for `endpoint`, relative to the base URL. A leading `/` is
    /// stripped.
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            method,
            endpoint: endpoint.trim_start_matches('/').to_string(),
            params: Params::new(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    /// Shorthand for a GET request.
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    /// Shorthand for a POST request.
    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    /// Query parameters; absent values are not transmitted.
    #[must_use]
    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// JSON request body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Per-request header; overrides client-level headers of the same name.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// HTTP method of the request.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Relative path, never starting with `/`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// HTTP client shared by all service clients.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: Arc<ClientConfig>,
    base_headers: HeaderMap,
    header_provider: Option<HeaderProvider>,
    classifiers: Vec<Arc<dyn ResponseClassifier>>,
    retry: RetryPolicy,
    span: tracing::Span,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url())
            .field("service", &self.config.service_name())
            .field("classifiers", &self.classifiers.len())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Client with the default retry policy sized by `config.retry_attempts()`.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    /// Starts a builder for attaching header providers, classifiers or a
    /// custom retry policy.
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            client: None,
            header_provider: None,
            classifiers: Vec::new(),
            retry: None,
        }
    }

    /// The configuration the client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Normalized base URL, always ending in `/`.
    pub fn base_url(&self) -> &str {
        self.config.base_url()
    }

    /// The policy wrapping every call.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Full URL for a relative endpoint.
    pub fn url_for(&self, endpoint: &str) -> String {
        self.config.url_for(endpoint)
    }

    /// GET returning the decoded JSON body as-is.
    pub async fn get(&self, endpoint: &str, params: Params) -> Result<Value, ApiError> {
        self.execute(ApiRequest::get(endpoint).params(params)).await
    }

    /// GET validated against the schema `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Params,
    ) -> Result<T, ApiError> {
        self.execute(ApiRequest::get(endpoint).params(params)).await
    }

    /// POST a JSON body. Retried like a GET, so only use it for calls the
    /// upstream treats as idempotent.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<Value, ApiError> {
        self.post_json(endpoint, body).await
    }

    /// POST a JSON body, validating the response against the schema `T`.
    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| {
            ApiError::api(format!("Failed to serialize request body: {}", e), None).with_source(e)
        })?;
        self.execute(ApiRequest::post(endpoint).json(body)).await
    }

    /// Issues `request` under the retry policy and decodes the result into `T`.
    pub async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let url = self.url_for(&request.endpoint);
        let headers = self.headers_for(&request);
        let operation = format!("{} {}", request.method, request.endpoint);

        call_with_retry(&self.retry, &operation, || {
            self.send_once::<T>(&request, &url, &headers)
        })
        .instrument(self.span.clone())
        .await
    }

    /// Defaults, then config headers, then the provider, then the request.
    fn headers_for(&self, request: &ApiRequest) -> HeaderMap {
        let mut headers = self.base_headers.clone();
        if let Some(provider) = &self.header_provider {
            for (name, value) in provider().iter() {
                headers.insert(name.clone(), value.clone());
            }
        }
        for (name, value) in request.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        headers
    }

    /// A single attempt, without retry.
    async fn send_once<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<T, ApiError> {
        info!(method = %request.method, url, "Making {} request to {}", request.method, url);

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(headers.clone())
            .timeout(self.config.timeout());

        let query = request.params.to_query();
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let result = async {
            let response = builder.send().await.map_err(transport_error)?;
            let status = response.status();
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.map_err(transport_error)?;

            if let Some(err) = self
                .classifiers
                .iter()
                .find_map(|c| c.classify(status, &body))
            {
                return Err(err);
            }

            let value = classify_response(status, &body, retry_after)?;
            serde_json::from_value::<T>(value).map_err(|e| {
                ApiError::invalid_response(
                    format!("Response validation failed: {}", e),
                    Some(status),
                    Some(Box::new(e)),
                )
            })
        }
        .await;

        if let Err(e) = &result {
            error!(
                method = %request.method,
                url,
                kind = %e.kind(),
                status = e.status().map(|s| s.as_u16()),
                "{} {} failed: {}",
                request.method,
                url,
                e
            );
        }
        result
    }
}

/// Builder wiring the capability hooks into an [`ApiClient`].
pub struct ApiClientBuilder {
    config: ClientConfig,
    client: Option<Client>,
    header_provider: Option<HeaderProvider>,
    classifiers: Vec<Arc<dyn ResponseClassifier>>,
    retry: Option<RetryPolicy>,
}

impl ApiClientBuilder {
    /// Reuse an existing reqwest client (and its connection pool).
    #[must_use]
    pub fn http_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Called on every attempt to produce extra headers, e.g. credentials.
    #[must_use]
    pub fn header_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> HeaderMap + Send + Sync + 'static,
    {
        self.header_provider = Some(Arc::new(provider));
        self
    }

    /// Append a classifier; classifiers run in the order they were added.
    #[must_use]
    pub fn classifier<C: ResponseClassifier + 'static>(mut self, classifier: C) -> Self {
        self.classifiers.push(Arc::new(classifier));
        self
    }

    /// Overrides the default policy, including its attempt count.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Builds the reqwest client (unless one was supplied) and the client span.
    pub fn build(self) -> Result<ApiClient, ConfigError> {
        let retry = match self.retry {
            Some(policy) => policy,
            None => RetryPolicy::with_attempts(self.config.retry_attempts())?,
        };

        let mut base_headers = HeaderMap::new();
        base_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in self.config.default_headers() {
            let (name, value) = parse_header(name, value)?;
            base_headers.insert(name, value);
        }

        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(USER_AGENT)
                .timeout(self.config.timeout())
                .build()?,
        };

        let span = match self.config.span() {
            Some(parent) => {
                tracing::info_span!(parent: parent, "api_client", service = %self.config.service_name())
            }
            None => tracing::info_span!("api_client", service = %self.config.service_name()),
        };

        Ok(ApiClient {
            client,
            config: Arc::new(self.config),
            base_headers,
            header_provider: self.header_provider,
            classifiers: self.classifiers,
            retry,
            span,
        })
    }
}

/// Parses a header pair, reporting the offending name on failure.
pub fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ConfigError> {
    let header_name =
        HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
    let header_value = HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok((header_name, header_value))
}

/// Maps a reqwest failure to the taxonomy.
fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode() {
        ApiError::network("Network connection failed", e)
    } else {
        ApiError::api(format!("Unexpected API error occurred: {}", e), None).with_source(e)
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(BODY_SNIPPET_LEN) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Status-based classification of a complete response.
///
/// A 2xx body is decoded as JSON (an empty body decodes to `null`).
pub fn classify_response(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> Result<Value, ApiError> {
    if status.is_success() {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(body).map_err(|e| {
            ApiError::invalid_response(
                format!("Response is not valid JSON: {}", e),
                Some(status),
                Some(Box::new(e)),
            )
        });
    }

    let error_msg = format!("HTTP {} Error: {}", status.as_u16(), snippet(body));

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ApiError::rate_limited(error_msg, retry_after));
    }
    if status.is_server_error() {
        return Err(ApiError::service_unavailable(status, error_msg));
    }
    Err(ApiError::api(error_msg, Some(status)))
}
