//! Octopus Energy API client: products, tariff prices and grid supply points.
//!
//! The public price endpoints need no credential.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::http::{ApiClient, ApiError, ClientConfig, ConfigError, Params, RetryPolicy};

use super::types::{GridSupplyPoint, Page, UnitRate};
use super::{Endpoint, Service, find_endpoint};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.octopus.energy/v1/";

/// The Agile product the price history is collected for.
pub const AGILE_PRODUCT: &str = "AGILE-FLEX-22-11-25";

/// GSP group letters, in region order (1 = `A` ... 14 = `P`).
pub const GSP_GROUPS: [&str; 14] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "J", "K", "L", "M", "N", "P",
];

const PERIOD: &[&str] = &["period_from", "period_to", "page_size", "page"];

/// Every Octopus endpoint, keyed by a stable id. Paths keep the upstream's
/// trailing `/`.
pub static ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        id: "products",
        path: "products/",
        required: &[],
        optional: &[
            "is_variable",
            "is_green",
            "is_tracker",
            "is_prepay",
            "is_business",
            "available_at",
            "page",
        ],
        accepts_format: false,
    },
    Endpoint {
        id: "product",
        path: "products/{product_code}/",
        required: &["product_code"],
        optional: &["tariffs_active_at"],
        accepts_format: false,
    },
    Endpoint {
        id: "standard-unit-rates",
        path: "products/{product_code}/electricity-tariffs/{tariff_code}/standard-unit-rates/",
        required: &["product_code", "tariff_code"],
        optional: PERIOD,
        accepts_format: false,
    },
    Endpoint {
        id: "standing-charges",
        path: "products/{product_code}/electricity-tariffs/{tariff_code}/standing-charges/",
        required: &["product_code", "tariff_code"],
        optional: PERIOD,
        accepts_format: false,
    },
    Endpoint {
        id: "grid-supply-points",
        path: "industry/grid-supply-points/",
        required: &[],
        optional: &["postcode"],
        accepts_format: false,
    },
];

/// GSP group letter for a 1-based region number.
pub fn gsp_group(region: u32) -> Option<&'static str> {
    let index = usize::try_from(region.checked_sub(1)?).ok()?;
    GSP_GROUPS.get(index).copied()
}

/// Single-rate electricity tariff code of `product` in GSP group `gsp`.
pub fn tariff_code(product: &str, gsp: &str) -> String {
    format!("E-1R-{}-{}", product, gsp)
}

/// Client for the Octopus Energy API.
#[derive(Debug, Clone)]
pub struct OctopusService {
    client: ApiClient,
}

/// Builder for [`OctopusService`].
#[derive(Debug, Default)]
pub struct OctopusServiceBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    retry_attempts: Option<u32>,
    backoff: Option<(Duration, Duration)>,
    span: Option<tracing::Span>,
}

impl OctopusServiceBuilder {
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

    /// Attempts per request, including the first.
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

    /// Parent span for every request.
    #[must_use]
    pub fn span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Builds the client with the default retry predicate.
    pub fn build(self) -> Result<OctopusService, ConfigError> {
        let mut config = ClientConfig::builder(self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))
            .service_name("octopus");
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
        Ok(OctopusService { client })
    }
}

impl OctopusService {
    /// Client against the public API with default settings.
    pub fn new() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    /// Starts a builder with every setting at its default.
    pub fn builder() -> OctopusServiceBuilder {
        OctopusServiceBuilder::default()
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
        debug!("octopus: {} -> {}", endpoint_id, path);
        self.client.get_json(&path, query).await
    }

    /// First page of the product catalogue.
    pub async fn get_products(&self) -> Result<Value, ApiError> {
        self.fetch_as("products", Params::new()).await
    }

    /// One product with its tariffs per GSP group.
    pub async fn get_product(&self, product_code: &str) -> Result<Value, ApiError> {
        self.fetch_as("product", Params::new().set("product_code", product_code))
            .await
    }

    /// Unit rates of an electricity tariff, optionally limited to
    /// `[period_from, period_to)`.
    pub async fn get_standard_unit_rates<Tz: TimeZone>(
        &self,
        product_code: &str,
        tariff_code: &str,
        period_from: Option<DateTime<Tz>>,
        period_to: Option<DateTime<Tz>>,
    ) -> Result<Value, ApiError> {
        let params = tariff_params(product_code, tariff_code, period_from, period_to);
        self.fetch_as("standard-unit-rates", params).await
    }

    /// [`get_standard_unit_rates`](Self::get_standard_unit_rates), typed.
    pub async fn standard_unit_rates<Tz: TimeZone>(
        &self,
        product_code: &str,
        tariff_code: &str,
        period_from: Option<DateTime<Tz>>,
        period_to: Option<DateTime<Tz>>,
    ) -> Result<Page<UnitRate>, ApiError> {
        let params = tariff_params(product_code, tariff_code, period_from, period_to);
        self.fetch_as("standard-unit-rates", params).await
    }

    /// Standing charges of an electricity tariff.
    pub async fn get_standing_charges<Tz: TimeZone>(
        &self,
        product_code: &str,
        tariff_code: &str,
        period_from: Option<DateTime<Tz>>,
        period_to: Option<DateTime<Tz>>,
    ) -> Result<Value, ApiError> {
        let params = tariff_params(product_code, tariff_code, period_from, period_to);
        self.fetch_as("standing-charges", params).await
    }

    /// All GSP groups, or the ones covering `postcode`.
    pub async fn get_grid_supply_points(&self, postcode: Option<&str>) -> Result<Value, ApiError> {
        self.fetch_as("grid-supply-points", Params::new().opt("postcode", postcode))
            .await
    }

    /// GSP group id (e.g. `_C`) for a postcode; `None` when the upstream
    /// knows no group for it.
    pub async fn grid_supply_point_for_postcode(
        &self,
        postcode: &str,
    ) -> Result<Option<String>, ApiError> {
        let page: Page<GridSupplyPoint> = self
            .fetch_as("grid-supply-points", Params::new().set("postcode", postcode))
            .await?;
        Ok(page.results.into_iter().next().map(|gsp| gsp.group_id))
    }
}

#[async_trait]
impl Service for OctopusService {
    fn name(&self) -> &'static str {
        "octopus"
    }

    fn endpoints(&self) -> &'static [Endpoint] {
        ENDPOINTS
    }

    async fn fetch(&self, endpoint_id: &str, params: Params) -> Result<Value, ApiError> {
        self.fetch_as(endpoint_id, params).await
    }
}

fn tariff_params<Tz: TimeZone>(
    product_code: &str,
    tariff_code: &str,
    period_from: Option<DateTime<Tz>>,
    period_to: Option<DateTime<Tz>>,
) -> Params {
    Params::new()
        .set("product_code", product_code)
        .set("tariff_code", tariff_code)
        .opt("period_from", period_from)
        .opt("period_to", period_to)
}
