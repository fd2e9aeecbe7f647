//! Typed response models for the carbon-intensity and Octopus payloads.
//!
//! Only the fields callers persist are modelled; unknown fields are ignored.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp format of the carbon-intensity payloads: UTC, minute precision.
pub const MINUTE_FORMAT: &str = "%Y-%m-%dT%H:%MZ";

/// `data` is an object on some endpoints and a list on others.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Flattens either shape into a list.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// Qualitative band reported next to the numeric intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum IntensityIndex {
    #[serde(rename = "very low")]
    VeryLow,
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "moderate")]
    Moderate,
    #[serde(rename = "high")]
    High,
    #[serde(rename = "very high")]
    VeryHigh,
}

/// gCO2/kWh figures for one half-hour window.
///
/// Fields the upstream leaves out stay `None`; picking a fallback is up to
/// the caller.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Intensity {
    pub forecast: Option<i32>,
    #[serde(default)]
    pub actual: Option<i32>,
    #[serde(default)]
    pub index: Option<IntensityIndex>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IntensityPeriod {
    #[serde(with = "minute_utc")]
    pub from: DateTime<Utc>,
    #[serde(with = "minute_utc")]
    pub to: DateTime<Utc>,
    pub intensity: Intensity,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IntensityResponse {
    pub data: Vec<IntensityPeriod>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FuelShare {
    pub fuel: String,
    pub perc: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GenerationMix {
    #[serde(with = "minute_utc")]
    pub from: DateTime<Utc>,
    #[serde(with = "minute_utc")]
    pub to: DateTime<Utc>,
    pub generationmix: Vec<FuelShare>,
}

impl GenerationMix {
    /// Percentage for `fuel`, if reported.
    pub fn share_of(&self, fuel: &str) -> Option<f64> {
        self.generationmix
            .iter()
            .find(|f| f.fuel == fuel)
            .map(|f| f.perc)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GenerationResponse {
    pub data: OneOrMany<GenerationMix>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Region {
    pub regionid: u32,
    #[serde(default)]
    pub dnoregion: Option<String>,
    #[serde(default)]
    pub shortname: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    pub intensity: Intensity,
    #[serde(default)]
    pub generationmix: Vec<FuelShare>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RegionalPeriod {
    #[serde(with = "minute_utc")]
    pub from: DateTime<Utc>,
    #[serde(with = "minute_utc")]
    pub to: DateTime<Utc>,
    pub regions: Vec<Region>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RegionalResponse {
    pub data: OneOrMany<RegionalPeriod>,
}

/// One page of an Octopus list endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Price of one tariff interval, in pence per kWh.
///
/// Timestamps are kept as sent; `valid_to` is null for open-ended rates.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UnitRate {
    pub value_exc_vat: f64,
    #[serde(default)]
    pub value_inc_vat: Option<f64>,
    pub valid_from: String,
    #[serde(default)]
    pub valid_to: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GridSupplyPoint {
    /// GSP group id, e.g. `_C`.
    pub group_id: String,
}

/// `YYYY-MM-DDThh:mmZ`, the upstream's timestamp format.
mod minute_utc {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::MINUTE_FORMAT;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(MINUTE_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

/// Parses the minute-precision form, falling back to RFC 3339.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, MINUTE_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
}
