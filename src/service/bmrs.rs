//! BMRS (Elexon Insights) dataset client.
//!
//! Requires an API key, sent as a bearer token. The upstream reports quota
//! exhaustion in the body, sometimes with HTTP 200, so responses are screened
//! before the status rules apply and quota errors are retried with a longer
//! backoff than the other services use.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone};
use log::debug;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::http::{
    ApiClient, ApiError, ClientConfig, ConfigError, Params, RetryPolicy, default_retryable,
};

use super::{Endpoint, Service, find_endpoint};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://data.elexon.co.uk/bmrs/api/v1";

/// Tag carried by quota errors raised by this client.
pub const QUOTA_TAG: &str = "bmrs";

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_WAIT_MIN: Duration = Duration::from_secs(1);
pub const DEFAULT_WAIT_MAX: Duration = Duration::from_secs(30);
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// JSON endpoint; `format` defaults to `json`.
const fn bm(
    id: &'static str,
    path: &'static str,
    required: &'static [&'static str],
    optional: &'static [&'static str],
) -> Endpoint {
    Endpoint {
        id,
        path,
        required,
        optional,
        accepts_format: true,
    }
}

/// Streaming endpoint; always JSON, no `format` parameter.
const fn stream(
    id: &'static str,
    path: &'static str,
    required: &'static [&'static str],
    optional: &'static [&'static str],
) -> Endpoint {
    Endpoint {
        id,
        path,
        required,
        optional,
        accepts_format: false,
    }
}

const NONE: &[&str] = &[];
const FROM_TO: &[&str] = &["from", "to"];
const BM_UNIT: &[&str] = &["bmUnit"];
const UNIT_FROM_TO: &[&str] = &["bmUnit", "from", "to"];
const UNIT_SNAPSHOT: &[&str] = &["bmUnit", "snapshotAt"];
const SNAPSHOT_OPT: &[&str] = &[
    "until",
    "snapshotAtSettlementPeriod",
    "untilSettlementPeriod",
    "dataset",
];
const SETTLEMENT: &[&str] = &["settlementDate", "settlementPeriod"];
const PERIODS: &[&str] = &["settlementPeriodFrom", "settlementPeriodTo"];
const PERIODS_UNIT: &[&str] = &["settlementPeriodFrom", "settlementPeriodTo", "bmUnit"];
const PUBLISH_WINDOW: &[&str] = &["publishDateTimeFrom", "publishDateTimeTo"];
const BOUNDARY_WINDOW: &[&str] = &["boundary", "publishDateTimeFrom", "publishDateTimeTo"];
const OUTPUT_FILTER: &[&str] = &["fuelType", "publishDateTimeFrom", "publishDateTimeTo", "bmUnit"];
const FUEL_FILTER: &[&str] = &[
    "publishDateTimeFrom",
    "publishDateTimeTo",
    "settlementDateFrom",
    "settlementDateTo",
    "settlementPeriod",
    "fuelType",
];

/// Every BMRS endpoint, keyed by a stable id. Query names are the upstream's.
pub static ENDPOINTS: &[Endpoint] = &[
    bm("balancing-dynamic", "balancing/dynamic", UNIT_SNAPSHOT, SNAPSHOT_OPT),
    bm("balancing-dynamic-all", "balancing/dynamic/all", SETTLEMENT, &["bmUnit", "dataset"]),
    bm("balancing-dynamic-rates", "balancing/dynamic/rates", UNIT_SNAPSHOT, SNAPSHOT_OPT),
    bm(
        "balancing-dynamic-rates-all",
        "balancing/dynamic/rates/all",
        SETTLEMENT,
        &["bmUnit", "dataset"],
    ),
    bm(
        "balancing-physical",
        "balancing/physical",
        UNIT_FROM_TO,
        &["settlementPeriodFrom", "settlementPeriodTo", "dataset"],
    ),
    bm(
        "balancing-physical-all",
        "balancing/physical/all",
        &["dataset", "settlementDate", "settlementPeriod"],
        BM_UNIT,
    ),
    bm("balancing-nonbm-disbsad-summary", "balancing/nonbm/disbsad/summary", FROM_TO, PERIODS),
    bm("balancing-nonbm-disbsad-details", "balancing/nonbm/disbsad/details", SETTLEMENT, NONE),
    bm(
        "balancing-nonbm-netbsad",
        "balancing/nonbm/netbsad",
        FROM_TO,
        &["settlementPeriodFrom", "settlementPeriodTo", "includeZero"],
    ),
    bm(
        "balancing-nonbm-netbsad-events",
        "balancing/nonbm/netbsad/events",
        &["count"],
        &["before", "settlementPeriodBefore"],
    ),
    bm("balancing-bid-offer", "balancing/bid-offer", UNIT_FROM_TO, PERIODS),
    bm("balancing-bid-offer-all", "balancing/bid-offer/all", SETTLEMENT, BM_UNIT),
    bm("balancing-acceptances", "balancing/acceptances", UNIT_FROM_TO, PERIODS),
    bm("balancing-acceptances-all", "balancing/acceptances/all", SETTLEMENT, BM_UNIT),
    bm("balancing-acceptances-all-latest", "balancing/acceptances/all/latest", NONE, NONE),
    bm(
        "balancing-acceptances-by-id",
        "balancing/acceptances/{acceptanceNumber}",
        &["acceptanceNumber"],
        NONE,
    ),
    bm("datasets-nonbm", "datasets/NONBM", NONE, FROM_TO),
    stream("datasets-nonbm-stream", "datasets/NONBM/stream", NONE, FROM_TO),
    bm("datasets-pn", "datasets/PN", SETTLEMENT, BM_UNIT),
    stream("datasets-pn-stream", "datasets/PN/stream", FROM_TO, PERIODS_UNIT),
    bm("datasets-qpn", "datasets/QPN", SETTLEMENT, BM_UNIT),
    stream("datasets-qpn-stream", "datasets/QPN/stream", FROM_TO, PERIODS_UNIT),
    bm("datasets-mels", "datasets/MELS", FROM_TO, PERIODS_UNIT),
    stream("datasets-mels-stream", "datasets/MELS/stream", FROM_TO, PERIODS_UNIT),
    bm("datasets-mils", "datasets/MILS", FROM_TO, PERIODS_UNIT),
    stream("datasets-mils-stream", "datasets/MILS/stream", FROM_TO, PERIODS_UNIT),
    bm("datasets-qas", "datasets/QAS", FROM_TO, PERIODS_UNIT),
    stream("datasets-qas-stream", "datasets/QAS/stream", FROM_TO, PERIODS_UNIT),
    bm("datasets-netbsad", "datasets/NETBSAD", FROM_TO, PERIODS),
    stream("datasets-netbsad-stream", "datasets/NETBSAD/stream", FROM_TO, PERIODS),
    bm("datasets-disbsad", "datasets/DISBSAD", FROM_TO, PERIODS),
    stream("datasets-disbsad-stream", "datasets/DISBSAD/stream", FROM_TO, PERIODS),
    bm("datasets-bod", "datasets/BOD", FROM_TO, PERIODS_UNIT),
    stream("datasets-bod-stream", "datasets/BOD/stream", FROM_TO, PERIODS_UNIT),
    bm("datasets-boalf", "datasets/BOALF", FROM_TO, PERIODS_UNIT),
    stream("datasets-boalf-stream", "datasets/BOALF/stream", FROM_TO, PERIODS_UNIT),
    bm(
        "datasets-mid",
        "datasets/MID",
        FROM_TO,
        &["settlementPeriodFrom", "settlementPeriodTo", "dataProviders"],
    ),
    stream(
        "datasets-mid-stream",
        "datasets/MID/stream",
        FROM_TO,
        &["settlementPeriodFrom", "settlementPeriodTo", "dataProviders"],
    ),
    bm("datasets-fuelhh", "datasets/FUELHH", NONE, FUEL_FILTER),
    stream("datasets-fuelhh-stream", "datasets/FUELHH/stream", NONE, FUEL_FILTER),
    bm("datasets-fuelinst", "datasets/FUELINST", NONE, FUEL_FILTER),
    stream("datasets-fuelinst-stream", "datasets/FUELINST/stream", NONE, FUEL_FILTER),
    bm("datasets-uou2t14d", "datasets/UOU2T14D", NONE, OUTPUT_FILTER),
    stream("datasets-uou2t14d-stream", "datasets/UOU2T14D/stream", NONE, OUTPUT_FILTER),
    bm("datasets-uou2t3yw", "datasets/UOU2T3YW", NONE, OUTPUT_FILTER),
    stream("datasets-uou2t3yw-stream", "datasets/UOU2T3YW/stream", NONE, OUTPUT_FILTER),
    bm(
        "datasets-fou2t14d",
        "datasets/FOU2T14D",
        NONE,
        &["fuelType", "publishDate", "publishDateTimeFrom", "publishDateTimeTo", "biddingZone", "interconnector"],
    ),
    bm(
        "datasets-fou2t3yw",
        "datasets/FOU2T3YW",
        NONE,
        &["fuelType", "publishDate", "publishDateTimeFrom", "publishDateTimeTo", "week", "year", "biddingZone", "interconnector"],
    ),
    bm(
        "datasets-nou2t14d",
        "datasets/NOU2T14D",
        NONE,
        &["publishDate", "publishDateTimeFrom", "publishDateTimeTo"],
    ),
    bm(
        "datasets-nou2t3yw",
        "datasets/NOU2T3YW",
        NONE,
        &["publishDate", "publishDateTimeFrom", "publishDateTimeTo", "week", "year"],
    ),
    bm("datasets-temp", "datasets/TEMP", NONE, PUBLISH_WINDOW),
    bm("datasets-indgen", "datasets/INDGEN", NONE, BOUNDARY_WINDOW),
    stream("datasets-indgen-stream", "datasets/INDGEN/stream", NONE, BOUNDARY_WINDOW),
    bm("datasets-inddem", "datasets/INDDEM", NONE, BOUNDARY_WINDOW),
    stream("datasets-inddem-stream", "datasets/INDDEM/stream", NONE, BOUNDARY_WINDOW),
    bm("datasets-syswarn", "datasets/SYSWARN", PUBLISH_WINDOW, NONE),
    stream("datasets-syswarn-stream", "datasets/SYSWARN/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-dci", "datasets/DCI", PUBLISH_WINDOW, NONE),
    stream("datasets-dci-stream", "datasets/DCI/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-soso", "datasets/SOSO", PUBLISH_WINDOW, NONE),
    stream("datasets-soso-stream", "datasets/SOSO/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-tudm", "datasets/TUDM", SETTLEMENT, &["tradingUnitName", "tradingUnitType"]),
    stream(
        "datasets-tudm-stream",
        "datasets/TUDM/stream",
        &["settlementDateFrom", "settlementPeriodFrom", "settlementDateTo", "settlementPeriodTo"],
        &["tradingUnitName", "tradingUnitType"],
    ),
    bm("datasets-sil", "datasets/SIL", FROM_TO, BM_UNIT),
    stream("datasets-sil-stream", "datasets/SIL/stream", FROM_TO, BM_UNIT),
    bm("datasets-mzt", "datasets/MZT", FROM_TO, PERIODS_UNIT),
    stream("datasets-mzt-stream", "datasets/MZT/stream", FROM_TO, PERIODS_UNIT),
    bm("datasets-agws", "datasets/AGWS", PUBLISH_WINDOW, NONE),
    stream("datasets-agws-stream", "datasets/AGWS/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-b1610", "datasets/B1610", SETTLEMENT, BM_UNIT),
    stream("datasets-b1610-stream", "datasets/B1610/stream", FROM_TO, PERIODS_UNIT),
    bm("datasets-remit", "datasets/REMIT", PUBLISH_WINDOW, NONE),
    stream("datasets-remit-stream", "datasets/REMIT/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-watl", "datasets/WATL", PUBLISH_WINDOW, NONE),
    stream("datasets-watl-stream", "datasets/WATL/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-dag", "datasets/DAG", PUBLISH_WINDOW, NONE),
    stream("datasets-dag-stream", "datasets/DAG/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-matl", "datasets/MATL", PUBLISH_WINDOW, NONE),
    stream("datasets-matl-stream", "datasets/MATL/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-yatl", "datasets/YATL", PUBLISH_WINDOW, NONE),
    stream("datasets-yatl-stream", "datasets/YATL/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-ccm", "datasets/CCM", PUBLISH_WINDOW, NONE),
    stream("datasets-ccm-stream", "datasets/CCM/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-yafm", "datasets/YAFM", PUBLISH_WINDOW, NONE),
    stream("datasets-yafm-stream", "datasets/YAFM/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-abuc", "datasets/ABUC", PUBLISH_WINDOW, NONE),
    stream("datasets-abuc-stream", "datasets/ABUC/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-ppbr", "datasets/PPBR", PUBLISH_WINDOW, NONE),
    stream("datasets-ppbr-stream", "datasets/PPBR/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-feib", "datasets/FEIB", PUBLISH_WINDOW, NONE),
    stream("datasets-feib-stream", "datasets/FEIB/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-aobe", "datasets/AOBE", PUBLISH_WINDOW, NONE),
    stream("datasets-aobe-stream", "datasets/AOBE/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-beb", "datasets/BEB", PUBLISH_WINDOW, NONE),
    stream("datasets-beb-stream", "datasets/BEB/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-cbs", "datasets/CBS", PUBLISH_WINDOW, NONE),
    stream("datasets-cbs-stream", "datasets/CBS/stream", PUBLISH_WINDOW, NONE),
    bm("datasets-pbc", "datasets/PBC", PUBLISH_WINDOW, NONE),
    stream("datasets-pbc-stream", "datasets/PBC/stream", PUBLISH_WINDOW, NONE),
    bm("cdn", "CDN", NONE, NONE),
    bm(
        "demand-outturn",
        "demand/outturn",
        &["settlementDateFrom", "settlementDateTo"],
        &["settlementPeriod"],
    ),
];

const QUOTA_MESSAGE: &[u8] = b"quota exceeded";

/// Promotes a quota message in any response body to a BMRS rate-limit error.
pub fn classify_quota(status: StatusCode, body: &str) -> Option<ApiError> {
    contains_ignore_ascii_case(body.as_bytes(), QUOTA_MESSAGE)
        .then(|| ApiError::quota_exhausted(QUOTA_TAG, "BMRS API quota exceeded", status))
}

/// Case-insensitive substring scan over the raw body, without copying it.
fn contains_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}

fn is_bmrs_quota(error: &ApiError) -> bool {
    error.quota_service() == Some(QUOTA_TAG)
}

/// Client for the BMRS dataset API.
#[derive(Debug, Clone)]
pub struct BmrsService {
    client: ApiClient,
}

/// Builder for [`BmrsService`].
pub struct BmrsServiceBuilder {
    api_key: String,
    base_url: Option<String>,
    timeout: Option<Duration>,
    retry_attempts: u32,
    backoff: (Duration, Duration),
    span: Option<tracing::Span>,
}

impl BmrsServiceBuilder {
    /// Overrides [`DEFAULT_BASE_URL`].
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attempts per call including the first; defaults to
    /// [`DEFAULT_RETRY_ATTEMPTS`].
    #[must_use]
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Bounds for the wait between attempts.
    #[must_use]
    pub fn backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff = (min, max);
        self
    }

    /// Parent span for the client's own span.
    #[must_use]
    pub fn span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Fails with [`ConfigError::MissingCredential`] before anything else is
    /// set up when the key is empty.
    pub fn build(self) -> Result<BmrsService, ConfigError> {
        let api_key = self.api_key.trim();
        if api_key.is_empty() {
            return Err(ConfigError::MissingCredential("BMRS"));
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
            ConfigError::InvalidHeader {
                name: AUTHORIZATION.to_string(),
                reason: e.to_string(),
            }
        })?;
        auth.set_sensitive(true);

        let mut config = ClientConfig::builder(self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))
            .service_name("bmrs")
            .retry_attempts(self.retry_attempts);
        if let Some(timeout) = self.timeout {
            config = config.timeout(timeout);
        }
        if let Some(span) = self.span {
            config = config.span(span);
        }
        let config = config.build()?;

        let (wait_min, wait_max) = self.backoff;
        let policy = RetryPolicy::builder()
            .max_attempts(self.retry_attempts)
            .multiplier(BACKOFF_MULTIPLIER)
            .wait(wait_min, wait_max)
            .retry_if(default_retryable)
            .or_retry_if(is_bmrs_quota)
            .build()?;

        let client = ApiClient::builder(config)
            .header_provider(move || {
                let mut headers = HeaderMap::new();
                headers.insert(AUTHORIZATION, auth.clone());
                headers
            })
            .classifier(classify_quota)
            .retry_policy(policy)
            .build()?;

        Ok(BmrsService { client })
    }
}

impl BmrsService {
    /// Client against the public BMRS API with default settings.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ConfigError> {
        Self::builder(api_key).build()
    }

    /// Starts a builder; the key is only checked by
    /// [`BmrsServiceBuilder::build`].
    pub fn builder(api_key: impl Into<String>) -> BmrsServiceBuilder {
        BmrsServiceBuilder {
            api_key: api_key.into(),
            base_url: None,
            timeout: None,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff: (DEFAULT_WAIT_MIN, DEFAULT_WAIT_MAX),
            span: None,
        }
    }

    /// The underlying HTTP client.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Calls an endpoint from [`ENDPOINTS`] and deserializes the body into `T`.
    pub async fn fetch_as<T: DeserializeOwned>(
        &self,
        endpoint_id: &str,
        params: Params,
    ) -> Result<T, ApiError> {
        let endpoint = find_endpoint(ENDPOINTS, endpoint_id)?;
        let (path, query) = endpoint.resolve(&params)?;
        debug!("bmrs: {} -> {}", endpoint_id, path);
        self.client.get_json(&path, query).await
    }

    /// Dynamic data (SEL, SIL, MZT...) for one BM unit at `snapshot_at`,
    /// optionally up to `until`.
    pub async fn get_balancing_dynamic<Tz: TimeZone>(
        &self,
        bm_unit: &str,
        snapshot_at: DateTime<Tz>,
        until: Option<DateTime<Tz>>,
    ) -> Result<Value, ApiError> {
        let params = Params::new()
            .set("bmUnit", bm_unit)
            .set("snapshotAt", snapshot_at)
            .opt("until", until);
        self.fetch_as("balancing-dynamic", params).await
    }

    /// A single bid-offer acceptance by its number.
    pub async fn get_balancing_acceptance(&self, acceptance_number: u64) -> Result<Value, ApiError> {
        let params = Params::new().set("acceptanceNumber", acceptance_number);
        self.fetch_as("balancing-acceptances-by-id", params).await
    }

    /// The most recent acceptances across all BM units.
    pub async fn get_balancing_acceptances_latest(&self) -> Result<Value, ApiError> {
        self.fetch_as("balancing-acceptances-all-latest", Params::new())
            .await
    }

    /// Initial demand outturn between two settlement dates, optionally for a
    /// single settlement period.
    pub async fn get_demand_outturn(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        settlement_period: Option<u8>,
    ) -> Result<Value, ApiError> {
        let params = Params::new()
            .set("settlementDateFrom", from)
            .set("settlementDateTo", to)
            .opt("settlementPeriod", settlement_period);
        self.fetch_as("demand-outturn", params).await
    }

    /// Instantaneous generation by fuel type (FUELINST).
    pub async fn get_fuel_instant<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        to: DateTime<Tz>,
    ) -> Result<Value, ApiError> {
        let params = Params::new()
            .set("publishDateTimeFrom", from)
            .set("publishDateTimeTo", to);
        self.fetch_as("datasets-fuelinst", params).await
    }

    /// System warnings (SYSWARN) published in `[from, to]`.
    pub async fn get_system_warnings<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        to: DateTime<Tz>,
    ) -> Result<Value, ApiError> {
        let params = Params::new()
            .set("publishDateTimeFrom", from)
            .set("publishDateTimeTo", to);
        self.fetch_as("datasets-syswarn", params).await
    }

    /// Credit default notices.
    pub async fn get_cdn(&self) -> Result<Value, ApiError> {
        self.fetch_as("cdn", Params::new()).await
    }
}

#[async_trait]
impl Service for BmrsService {
    fn name(&self) -> &'static str {
        "bmrs"
    }

    fn endpoints(&self) -> &'static [Endpoint] {
        ENDPOINTS
    }

    async fn fetch(&self, endpoint_id: &str, params: Params) -> Result<Value, ApiError> {
        self.fetch_as(endpoint_id, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ErrorKind;
    use chrono::Utc;
    use mockito::Matcher;
    use serde_json::json;
    use std::collections::HashSet;

    fn service(url: &str, attempts: u32) -> BmrsService {
        BmrsService::builder("test-key")
            .base_url(url)
            .retry_attempts(attempts)
            .backoff(Duration::ZERO, Duration::ZERO)
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_key_rejected() {
        for key in ["", "   "] {
            let result = BmrsService::new(key);
            assert!(
                matches!(result, Err(ConfigError::MissingCredential("BMRS"))),
                "key {:?}",
                key
            );
        }
    }

    #[tokio::test]
    async fn test_empty_key_makes_no_calls() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let result = BmrsService::builder("").base_url(server.url()).build();

        assert!(result.is_err());
        mock.assert_async().await;
    }

    #[test]
    fn test_default_policy() {
        let service = BmrsService::new("k").unwrap();
        let policy = service.client().retry_policy();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.multiplier(), 2.0);
        assert_eq!(
            policy.wait_bounds(),
            (Duration::from_secs(1), Duration::from_secs(30))
        );
        assert_eq!(policy.wait_for(1), Duration::from_secs(2));
        assert_eq!(policy.wait_for(5), Duration::from_secs(30));

        let quota = ApiError::quota_exhausted(QUOTA_TAG, "q", StatusCode::OK);
        assert!(policy.should_retry(&quota));
        assert!(!policy.should_retry(&ApiError::rate_limited("429", None)));
        assert!(policy.should_retry(&ApiError::service_unavailable(
            StatusCode::BAD_GATEWAY,
            "x"
        )));
        assert_eq!(
            service.client().base_url(),
            "https://data.elexon.co.uk/bmrs/api/v1/"
        );
    }

    #[test]
    fn test_debug_hides_key() {
        let service = BmrsService::new("super-secret").unwrap();
        assert!(!format!("{:?}", service).contains("super-secret"));
    }

    #[test]
    fn test_classify_quota() {
        let err = classify_quota(StatusCode::OK, r#"{"error": "Quota Exceeded"}"#).unwrap();
        assert!(err.is_quota_exhausted());
        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert_eq!(err.message(), "BMRS API quota exceeded");
        assert!(classify_quota(StatusCode::OK, r#"{"data": []}"#).is_none());
    }

    #[test]
    fn test_classify_quota_scans_whole_body() {
        let mut body = "é,".repeat(50_000);
        body.push_str("QUOTA exceeded for key");
        assert!(classify_quota(StatusCode::FORBIDDEN, &body).is_some());

        assert!(classify_quota(StatusCode::OK, "").is_none());
        assert!(classify_quota(StatusCode::OK, "quota").is_none());
        assert!(classify_quota(StatusCode::OK, "quota  exceeded").is_none());
    }

    #[test]
    fn test_endpoint_table() {
        assert_eq!(ENDPOINTS.len(), 101);
        let ids: HashSet<_> = ENDPOINTS.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), ENDPOINTS.len(), "endpoint ids must be unique");
        for endpoint in ENDPOINTS {
            assert!(!endpoint.path.starts_with('/'), "{}", endpoint.id);
            assert_eq!(
                endpoint.accepts_format,
                !endpoint.path.ends_with("/stream"),
                "{}",
                endpoint.id
            );
            for name in endpoint.path_params() {
                assert!(endpoint.required.contains(&name), "{}: {}", endpoint.id, name);
            }
        }
    }

    #[tokio::test]
    async fn test_sends_bearer_and_format() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/balancing/dynamic")
            .match_header("authorization", "Bearer test-key")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("bmUnit".into(), "T_DRAXX-1".into()),
                Matcher::UrlEncoded("snapshotAt".into(), "2024-01-01T00:00:00Z".into()),
                Matcher::UrlEncoded("format".into(), "json".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"data": []}"#)
            .create_async()
            .await;

        let snapshot = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let result = service(&server.url(), 1)
            .get_balancing_dynamic("T_DRAXX-1", snapshot, None)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, json!({"data": []}));
    }

    #[tokio::test]
    async fn test_stream_endpoint_has_no_format() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/datasets/SYSWARN/stream")
            .match_query(Matcher::Exact(
                "publishDateTimeFrom=2024-01-01T00%3A00Z&publishDateTimeTo=2024-01-02T00%3A00Z"
                    .to_string(),
            ))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let params = Params::new()
            .set("publishDateTimeFrom", "2024-01-01T00:00Z")
            .set("publishDateTimeTo", "2024-01-02T00:00Z");
        service(&server.url(), 1)
            .fetch("datasets-syswarn-stream", params)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_acceptance_number_in_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/balancing/acceptances/123456")
            .match_query(Matcher::UrlEncoded("format".into(), "json".into()))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        service(&server.url(), 1)
            .get_balancing_acceptance(123456)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_demand_outturn_dates() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/demand/outturn")
            .match_query(Matcher::Exact(
                "settlementDateFrom=2024-01-01&settlementDateTo=2024-01-07&format=json".to_string(),
            ))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        service(&server.url(), 1)
            .get_demand_outturn(from, to, None)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_quota_on_success_status_retried_then_raised() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/CDN")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"message": "Quota Exceeded for this key"}"#)
            .expect(3)
            .create_async()
            .await;

        let err = service(&server.url(), 3).get_cdn().await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert_eq!(err.quota_service(), Some(QUOTA_TAG));
        assert_eq!(err.status(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_quota_then_success() {
        let mut server = mockito::Server::new_async().await;
        let quota = server
            .mock("GET", "/CDN")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("quota exceeded")
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/CDN")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data": [1]}"#)
            .expect(1)
            .create_async()
            .await;

        let result = service(&server.url(), 5).get_cdn().await.unwrap();

        quota.assert_async().await;
        ok.assert_async().await;
        assert_eq!(result, json!({"data": [1]}));
    }

    #[tokio::test]
    async fn test_plain_rate_limit_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/CDN")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body("Too Many Requests")
            .expect(1)
            .create_async()
            .await;

        let err = service(&server.url(), 5).get_cdn().await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert!(!err.is_quota_exhausted());
    }

    #[tokio::test]
    async fn test_server_errors_use_all_attempts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/CDN")
            .match_query(Matcher::Any)
            .with_status(500)
            .expect(5)
            .create_async()
            .await;

        let err = service(&server.url(), 5).get_cdn().await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    }

    #[tokio::test]
    async fn test_missing_required_param_sends_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let err = service(&server.url(), 1)
            .fetch("datasets-pn", Params::new().set("settlementDate", "2024-01-01"))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::Api);
        assert!(err.message().contains("settlementPeriod"));
    }
}
