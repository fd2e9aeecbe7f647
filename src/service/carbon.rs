//! Carbon-intensity API client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone};
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::http::{ApiClient, ApiError, ClientConfig, ConfigError, Params, RetryPolicy};

use super::types::{GenerationResponse, IntensityResponse, RegionalResponse};
use super::{Endpoint, Service, find_endpoint};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.carbonintensity.org.uk/";

const fn ep(id: &'static str, path: &'static str, required: &'static [&'static str]) -> Endpoint {
    Endpoint {
        id,
        path,
        required,
        optional: &[],
        accepts_format: false,
    }
}

const FROM: &[&str] = &["from"];
const FROM_TO: &[&str] = &["from", "to"];
const FROM_POSTCODE: &[&str] = &["from", "postcode"];
const FROM_REGIONID: &[&str] = &["from", "regionid"];
const FROM_TO_POSTCODE: &[&str] = &["from", "to", "postcode"];
const FROM_TO_REGIONID: &[&str] = &["from", "to", "regionid"];

/// Every carbon-intensity endpoint, keyed by a stable id.
pub static ENDPOINTS: &[Endpoint] = &[
    // National intensity
    ep("intensity", "intensity", &[]),
    ep("intensity-today", "intensity/date", &[]),
    ep("intensity-date", "intensity/date/{date}", &["date"]),
    ep("intensity-date-period", "intensity/date/{date}/{period}", &["date", "period"]),
    ep("intensity-factors", "intensity/factors", &[]),
    ep("intensity-from", "intensity/{from}", FROM),
    ep("intensity-fw24h", "intensity/{from}/fw24h", FROM),
    ep("intensity-fw48h", "intensity/{from}/fw48h", FROM),
    ep("intensity-pt24h", "intensity/{from}/pt24h", FROM),
    ep("intensity-between", "intensity/{from}/{to}", FROM_TO),
    // Statistics
    ep("intensity-stats", "intensity/stats/{from}/{to}", FROM_TO),
    ep("intensity-stats-block", "intensity/stats/{from}/{to}/{block}", &["from", "to", "block"]),
    // Generation mix
    ep("generation", "generation", &[]),
    ep("generation-pt24h", "generation/{from}/pt24h", FROM),
    ep("generation-range", "generation/{from}/{to}", FROM_TO),
    // Regional
    ep("regional", "regional", &[]),
    ep("regional-england", "regional/england", &[]),
    ep("regional-scotland", "regional/scotland", &[]),
    ep("regional-wales", "regional/wales", &[]),
    ep("regional-postcode", "regional/postcode/{postcode}", &["postcode"]),
    ep("regional-regionid", "regional/regionid/{regionid}", &["regionid"]),
    ep("regional-intensity-fw24h", "regional/intensity/{from}/fw24h", FROM),
    ep("regional-intensity-fw24h-postcode", "regional/intensity/{from}/fw24h/postcode/{postcode}", FROM_POSTCODE),
    ep("regional-intensity-fw24h-regionid", "regional/intensity/{from}/fw24h/regionid/{regionid}", FROM_REGIONID),
    ep("regional-intensity-fw48h", "regional/intensity/{from}/fw48h", FROM),
    ep("regional-intensity-fw48h-postcode", "regional/intensity/{from}/fw48h/postcode/{postcode}", FROM_POSTCODE),
    ep("regional-intensity-fw48h-regionid", "regional/intensity/{from}/fw48h/regionid/{regionid}", FROM_REGIONID),
    ep("regional-intensity-pt24h", "regional/intensity/{from}/pt24h", FROM),
    ep("regional-intensity-pt24h-postcode", "regional/intensity/{from}/pt24h/postcode/{postcode}", FROM_POSTCODE),
    ep("regional-intensity-pt24h-regionid", "regional/intensity/{from}/pt24h/regionid/{regionid}", FROM_REGIONID),
    ep("regional-intensity-range", "regional/intensity/{from}/{to}", FROM_TO),
    ep("regional-intensity-range-postcode", "regional/intensity/{from}/{to}/postcode/{postcode}", FROM_TO_POSTCODE),
    ep("regional-intensity-range-regionid", "regional/intensity/{from}/{to}/regionid/{regionid}", FROM_TO_REGIONID),
];

/// Client for the national carbon-intensity API. No credential is needed.
#[derive(Debug, Clone)]
pub struct CarbonIntensityService {
    client: ApiClient,
}

/// Builder for [`CarbonIntensityService`].
#[derive(Debug, Default)]
pub struct CarbonIntensityServiceBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    retry_attempts: Option<u32>,
    backoff: Option<(Duration, Duration)>,
    span: Option<tracing::Span>,
}

impl CarbonIntensityServiceBuilder {
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

    /// Attempts per call including the first.
    #[must_use]
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    /// Bounds of the wait between attempts.
    #[must_use]
    pub fn backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff = Some((min, max));
        self
    }

    /// Parent span for the client's own span.
    #[must_use]
    pub fn span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Builds the client with the default retry predicate.
    pub fn build(self) -> Result<CarbonIntensityService, ConfigError> {
        let mut config = ClientConfig::builder(self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))
            .service_name("carbon-intensity");
        if let Some(timeout) = self.timeout {
            config = config.timeout(timeout);
        }
        if let Some(attempts) = self.retry_attempts {
            config = config.retry_attempts(attempts);
        }
        if let Some(span) = self.span {
            config = config.span(span);
        }
        let config = config.build()?;

        let mut policy = RetryPolicy::builder().max_attempts(config.retry_attempts());
        if let Some((min, max)) = self.backoff {
            policy = policy.wait(min, max);
        }

        let client = ApiClient::builder(config)
            .retry_policy(policy.build()?)
            .build()?;
        Ok(CarbonIntensityService { client })
    }
}

impl CarbonIntensityService {
    /// Client against the public API with default settings.
    pub fn new() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    /// Starts a builder with the default settings.
    pub fn builder() -> CarbonIntensityServiceBuilder {
        CarbonIntensityServiceBuilder::default()
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
        debug!("carbon-intensity: {} -> {}", endpoint_id, path);
        self.client.get_json(&path, query).await
    }

    async fn call(&self, endpoint_id: &str, params: Params) -> Result<Value, ApiError> {
        self.fetch_as(endpoint_id, params).await
    }

    // National intensity

    /// National intensity for the current half hour.
    pub async fn get_current_intensity(&self) -> Result<Value, ApiError> {
        self.call("intensity", Params::new()).await
    }

    /// National intensity for today.
    pub async fn get_intensity_today(&self) -> Result<Value, ApiError> {
        self.call("intensity-today", Params::new()).await
    }

    /// National intensity for every half hour of `date`.
    pub async fn get_intensity_date(&self, date: NaiveDate) -> Result<Value, ApiError> {
        self.call("intensity-date", Params::new().set("date", date)).await
    }

    /// `period` is the half-hour settlement period, 1 to 48.
    pub async fn get_intensity_date_period(
        &self,
        date: NaiveDate,
        period: u8,
    ) -> Result<Value, ApiError> {
        let params = Params::new().set("date", date).set("period", period);
        self.call("intensity-date-period", params).await
    }

    /// Carbon intensity factor per fuel type.
    pub async fn get_intensity_factors(&self) -> Result<Value, ApiError> {
        self.call("intensity-factors", Params::new()).await
    }

    /// National intensity for the half hour starting at `from`.
    pub async fn get_intensity_from<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
    ) -> Result<Value, ApiError> {
        self.call("intensity-from", from_params(from)).await
    }

    /// National intensity forecast for 24 hours from `from`.
    pub async fn get_intensity_fw24h<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
    ) -> Result<Value, ApiError> {
        self.call("intensity-fw24h", from_params(from)).await
    }

    /// National intensity forecast for 48 hours from `from`.
    pub async fn get_intensity_fw48h<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
    ) -> Result<Value, ApiError> {
        self.call("intensity-fw48h", from_params(from)).await
    }

    /// National intensity for the 24 hours before `from`.
    pub async fn get_intensity_pt24h<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
    ) -> Result<Value, ApiError> {
        self.call("intensity-pt24h", from_params(from)).await
    }

    /// National intensity between `from` and `to`.
    pub async fn get_intensity_between<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        to: DateTime<Tz>,
    ) -> Result<Value, ApiError> {
        self.call("intensity-between", range_params(from, to)).await
    }

    // Statistics

    /// Intensity statistics (max, mean, min) between `from` and `to`.
    pub async fn get_statistics<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        to: DateTime<Tz>,
    ) -> Result<Value, ApiError> {
        self.call("intensity-stats", range_params(from, to)).await
    }

    /// `block` is the block length in hours, 1 to 24.
    pub async fn get_statistics_block<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        to: DateTime<Tz>,
        block: u8,
    ) -> Result<Value, ApiError> {
        let params = range_params(from, to).set("block", block);
        self.call("intensity-stats-block", params).await
    }

    // Generation mix

    /// Current national generation mix.
    pub async fn get_current_generation(&self) -> Result<Value, ApiError> {
        self.call("generation", Params::new()).await
    }

    /// Generation mix for the 24 hours before `from`.
    pub async fn get_generation_pt24h<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
    ) -> Result<Value, ApiError> {
        self.call("generation-pt24h", from_params(from)).await
    }

    /// Generation mix between `from` and `to`.
    pub async fn get_generation_range<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        to: DateTime<Tz>,
    ) -> Result<Value, ApiError> {
        self.call("generation-range", range_params(from, to)).await
    }

    // Regional

    /// Current intensity and mix for every region.
    pub async fn get_regional_current(&self) -> Result<Value, ApiError> {
        self.call("regional", Params::new()).await
    }

    /// Current regional data for England.
    pub async fn get_regional_england(&self) -> Result<Value, ApiError> {
        self.call("regional-england", Params::new()).await
    }

    /// Current regional data for Scotland.
    pub async fn get_regional_scotland(&self) -> Result<Value, ApiError> {
        self.call("regional-scotland", Params::new()).await
    }

    /// Current regional data for Wales.
    pub async fn get_regional_wales(&self) -> Result<Value, ApiError> {
        self.call("regional-wales", Params::new()).await
    }

    /// `postcode` is the outward part only, e.g. `RG10`.
    pub async fn get_regional_postcode(&self, postcode: &str) -> Result<Value, ApiError> {
        self.call("regional-postcode", Params::new().set("postcode", postcode))
            .await
    }

    /// Current data for one region id (1 to 17).
    pub async fn get_regional_regionid(&self, regionid: u32) -> Result<Value, ApiError> {
        self.call("regional-regionid", Params::new().set("regionid", regionid))
            .await
    }

    /// Regional forecast or history for a window: `fw24h`, `fw48h` or `pt24h`.
    pub async fn get_regional_intensity_window<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        window: Window,
        area: Area<'_>,
    ) -> Result<Value, ApiError> {
        let base = format!("regional-intensity-{}", window.as_str());
        let (id, params) = area.apply(base, from_params(from));
        self.call(&id, params).await
    }

    /// All regions, 24 hours forward from `from`.
    pub async fn get_regional_intensity_fw24h<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
    ) -> Result<Value, ApiError> {
        self.get_regional_intensity_window(from, Window::Fw24h, Area::All)
            .await
    }

    /// One outward postcode, 24 hours forward from `from`.
    pub async fn get_regional_intensity_fw24h_postcode<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        postcode: &str,
    ) -> Result<Value, ApiError> {
        self.get_regional_intensity_window(from, Window::Fw24h, Area::Postcode(postcode))
            .await
    }

    /// One region, 24 hours forward from `from`.
    pub async fn get_regional_intensity_fw24h_regionid<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        regionid: u32,
    ) -> Result<Value, ApiError> {
        self.get_regional_intensity_window(from, Window::Fw24h, Area::Region(regionid))
            .await
    }

    /// All regions, 48 hours forward from `from`.
    pub async fn get_regional_intensity_fw48h<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
    ) -> Result<Value, ApiError> {
        self.get_regional_intensity_window(from, Window::Fw48h, Area::All)
            .await
    }

    /// One outward postcode, 48 hours forward from `from`.
    pub async fn get_regional_intensity_fw48h_postcode<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        postcode: &str,
    ) -> Result<Value, ApiError> {
        self.get_regional_intensity_window(from, Window::Fw48h, Area::Postcode(postcode))
            .await
    }

    /// One region, 48 hours forward from `from`.
    pub async fn get_regional_intensity_fw48h_regionid<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        regionid: u32,
    ) -> Result<Value, ApiError> {
        self.get_regional_intensity_window(from, Window::Fw48h, Area::Region(regionid))
            .await
    }

    /// All regions, 24 hours back from `from`.
    pub async fn get_regional_intensity_pt24h<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
    ) -> Result<Value, ApiError> {
        self.get_regional_intensity_window(from, Window::Pt24h, Area::All)
            .await
    }

    /// One outward postcode, 24 hours back from `from`.
    pub async fn get_regional_intensity_pt24h_postcode<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        postcode: &str,
    ) -> Result<Value, ApiError> {
        self.get_regional_intensity_window(from, Window::Pt24h, Area::Postcode(postcode))
            .await
    }

    /// One region, 24 hours back from `from`.
    pub async fn get_regional_intensity_pt24h_regionid<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        regionid: u32,
    ) -> Result<Value, ApiError> {
        self.get_regional_intensity_window(from, Window::Pt24h, Area::Region(regionid))
            .await
    }

    /// All regions between `from` and `to`.
    pub async fn get_regional_intensity_range<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        to: DateTime<Tz>,
    ) -> Result<Value, ApiError> {
        self.call("regional-intensity-range", range_params(from, to))
            .await
    }

    /// One outward postcode between `from` and `to`.
    pub async fn get_regional_intensity_range_postcode<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        to: DateTime<Tz>,
        postcode: &str,
    ) -> Result<Value, ApiError> {
        let params = range_params(from, to).set("postcode", postcode);
        self.call("regional-intensity-range-postcode", params).await
    }

    /// One region between `from` and `to`.
    pub async fn get_regional_intensity_range_regionid<Tz: TimeZone>(
        &self,
        from: DateTime<Tz>,
        to: DateTime<Tz>,
        regionid: u32,
    ) -> Result<Value, ApiError> {
        let params = range_params(from, to).set("regionid", regionid);
        self.call("regional-intensity-range-regionid", params).await
    }

    // Typed shortcuts

    /// [`get_current_intensity`](Self::get_current_intensity), typed.
    pub async fn current_intensity(&self) -> Result<IntensityResponse, ApiError> {
        self.fetch_as("intensity", Params::new()).await
    }

    /// [`get_current_generation`](Self::get_current_generation), typed.
    pub async fn current_generation(&self) -> Result<GenerationResponse, ApiError> {
        self.fetch_as("generation", Params::new()).await
    }

    /// [`get_regional_current`](Self::get_regional_current), typed.
    pub async fn regional_current(&self) -> Result<RegionalResponse, ApiError> {
        self.fetch_as("regional", Params::new()).await
    }
}

#[async_trait]
impl Service for CarbonIntensityService {
    fn name(&self) -> &'static str {
        "carbon"
    }

    fn endpoints(&self) -> &'static [Endpoint] {
        ENDPOINTS
    }

    async fn fetch(&self, endpoint_id: &str, params: Params) -> Result<Value, ApiError> {
        self.call(endpoint_id, params).await
    }
}

/// Rolling window of the regional intensity endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Fw24h,
    Fw48h,
    Pt24h,
}

impl Window {
    /// Path segment for the window.
    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Fw24h => "fw24h",
            Window::Fw48h => "fw48h",
            Window::Pt24h => "pt24h",
        }
    }
}

/// Which part of GB a regional query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area<'a> {
    All,
    Postcode(&'a str),
    Region(u32),
}

impl Area<'_> {
    fn apply(self, id: String, params: Params) -> (String, Params) {
        match self {
            Area::All => (id, params),
            Area::Postcode(postcode) => (format!("{}-postcode", id), params.set("postcode", postcode)),
            Area::Region(regionid) => (format!("{}-regionid", id), params.set("regionid", regionid)),
        }
    }
}

fn from_params<Tz: TimeZone>(from: DateTime<Tz>) -> Params {
    Params::new().set("from", from)
}

fn range_params<Tz: TimeZone>(from: DateTime<Tz>, to: DateTime<Tz>) -> Params {
    Params::new().set("from", from).set("to", to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ErrorKind;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashSet;

    fn service(url: &str) -> CarbonIntensityService {
        CarbonIntensityService::builder()
            .base_url(url)
            .backoff(Duration::ZERO, Duration::ZERO)
            .build()
            .unwrap()
    }

    async fn dummy(server: &mut mockito::ServerGuard, path: &str) -> mockito::Mock {
        server
            .mock("GET", path)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": "dummy"}"#)
            .expect(1)
            .create_async()
            .await
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 10, 1, 12, 0, 0).unwrap()
    }

    fn next_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 10, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_endpoint_table() {
        assert_eq!(ENDPOINTS.len(), 33);
        let ids: HashSet<_> = ENDPOINTS.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), ENDPOINTS.len(), "endpoint ids must be unique");
        for endpoint in ENDPOINTS {
            assert!(!endpoint.path.starts_with('/'));
            for name in endpoint.path_params() {
                assert!(endpoint.required.contains(&name), "{}: {}", endpoint.id, name);
            }
        }
    }

    #[test]
    fn test_default_base_url() {
        let service = CarbonIntensityService::new().unwrap();
        assert_eq!(service.client().base_url(), DEFAULT_BASE_URL);
        assert_eq!(service.name(), "carbon");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let result = CarbonIntensityService::builder().retry_attempts(0).build();
        assert!(matches!(result, Err(ConfigError::ZeroAttempts)));
    }

    #[tokio::test]
    async fn test_get_current_intensity() {
        let mut server = mockito::Server::new_async().await;
        let mock = dummy(&mut server, "/intensity").await;

        let result = service(&server.url()).get_current_intensity().await.unwrap();

        mock.assert_async().await;
        assert_eq!(result, json!({"data": "dummy"}));
    }

    #[tokio::test]
    async fn test_get_intensity_date_period() {
        let mut server = mockito::Server::new_async().await;
        let mock = dummy(&mut server, "/intensity/date/2023-10-01/1").await;

        let date = NaiveDate::from_ymd_opt(2023, 10, 1).unwrap();
        let result = service(&server.url())
            .get_intensity_date_period(date, 1)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, json!({"data": "dummy"}));
    }

    #[tokio::test]
    async fn test_get_intensity_between() {
        let mut server = mockito::Server::new_async().await;
        let mock = dummy(&mut server, "/intensity/2023-10-01T12:00:00Z/2023-10-02T12:00:00Z").await;

        service(&server.url())
            .get_intensity_between(noon(), next_noon())
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_statistics_block() {
        let mut server = mockito::Server::new_async().await;
        let mock = dummy(
            &mut server,
            "/intensity/stats/2023-10-01T12:00:00Z/2023-10-02T12:00:00Z/24",
        )
        .await;

        service(&server.url())
            .get_statistics_block(noon(), next_noon(), 24)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_generation_pt24h() {
        let mut server = mockito::Server::new_async().await;
        let mock = dummy(&mut server, "/generation/2023-10-01T12:00:00Z/pt24h").await;

        service(&server.url())
            .get_generation_pt24h(noon())
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_regional_postcode() {
        let mut server = mockito::Server::new_async().await;
        let mock = dummy(&mut server, "/regional/postcode/RG10").await;

        service(&server.url())
            .get_regional_postcode("RG10")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_regional_windows() {
        let mut server = mockito::Server::new_async().await;
        let fw24 = dummy(&mut server, "/regional/intensity/2023-10-01T12:00:00Z/fw24h").await;
        let fw48 = dummy(
            &mut server,
            "/regional/intensity/2023-10-01T12:00:00Z/fw48h/postcode/RG10",
        )
        .await;
        let pt24 = dummy(
            &mut server,
            "/regional/intensity/2023-10-01T12:00:00Z/pt24h/regionid/13",
        )
        .await;

        let service = service(&server.url());
        service.get_regional_intensity_fw24h(noon()).await.unwrap();
        service
            .get_regional_intensity_fw48h_postcode(noon(), "RG10")
            .await
            .unwrap();
        service
            .get_regional_intensity_pt24h_regionid(noon(), 13)
            .await
            .unwrap();

        fw24.assert_async().await;
        fw48.assert_async().await;
        pt24.assert_async().await;
    }

    #[tokio::test]
    async fn test_regional_range_regionid() {
        let mut server = mockito::Server::new_async().await;
        let mock = dummy(
            &mut server,
            "/regional/intensity/2023-10-01T12:00:00Z/2023-10-02T12:00:00Z/regionid/3",
        )
        .await;

        service(&server.url())
            .get_regional_intensity_range_regionid(noon(), next_noon(), 3)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_by_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = dummy(&mut server, "/intensity/factors").await;

        let result = service(&server.url())
            .fetch("intensity-factors", Params::new())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, json!({"data": "dummy"}));
    }

    #[tokio::test]
    async fn test_unknown_endpoint_sends_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let service = service(&server.url());
        let err = service.fetch("intensity-yesterday", Params::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api);

        let err = service.fetch("intensity-date", Params::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_current_intensity_typed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/intensity")
            .with_status(200)
            .with_body(
                r#"{"data":[{"from":"2023-10-01T12:00Z","to":"2023-10-01T12:30Z",
                "intensity":{"forecast":180,"actual":175,"index":"moderate"}}]}"#,
            )
            .create_async()
            .await;

        let result = service(&server.url()).current_intensity().await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.data[0].intensity.actual, Some(175));
    }

    #[tokio::test]
    async fn test_current_generation_schema_mismatch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/generation")
            .with_status(200)
            .with_body(r#"{"data": "dummy"}"#)
            .expect(1)
            .create_async()
            .await;

        let err = service(&server.url()).current_generation().await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn test_server_error_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/regional")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let service = CarbonIntensityService::builder()
            .base_url(server.url())
            .retry_attempts(2)
            .backoff(Duration::ZERO, Duration::ZERO)
            .build()
            .unwrap();
        let err = service.get_regional_current().await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    }
}
