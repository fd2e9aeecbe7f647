use anyhow::{Context, Result, bail};
use chrono::{Datelike, Months, NaiveDate, NaiveTime, TimeDelta};
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::http::{DATE_FORMAT, Params};
use crate::service::Service;
use crate::service::octopus::{GSP_GROUPS, tariff_code};
use crate::service::types::{Page, UnitRate};

use super::write_json;

/// Name of the file holding every GSP group's prices.
pub const COMBINED_FILE: &str = "energy_prices_all_gsps.json";

/// Month (`YYYY-MM`) -> prices collected for that month.
pub type GspPrices = BTreeMap<String, MonthPrices>;

/// Half-hourly prices of one month, by day, with their mean.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthPrices {
    pub days: BTreeMap<String, Vec<DayRate>>,
    /// Mean `value_exc_vat` over every collected interval, rounded to two
    /// decimals. `None` when nothing was collected.
    pub average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayRate {
    pub valid_from: String,
    pub valid_to: Option<String>,
    pub value_exc_vat: f64,
}

impl From<UnitRate> for DayRate {
    fn from(rate: UnitRate) -> Self {
        DayRate {
            valid_from: rate.valid_from,
            valid_to: rate.valid_to,
            value_exc_vat: rate.value_exc_vat,
        }
    }
}

/// What to collect.
#[derive(Debug, Clone)]
pub struct PriceJob {
    pub product: String,
    /// GSP group letters, see [`GSP_GROUPS`].
    pub gsps: Vec<String>,
    pub start_month: NaiveDate,
    /// Last month collected, inclusive.
    pub end_month: NaiveDate,
    pub pause: Duration,
}

/// File the prices of one GSP group are written to.
pub fn gsp_file_name(gsp: &str) -> String {
    format!("energy_prices_gsp_{}.json", gsp)
}

/// Collects the unit rates of `job.product` for every GSP group, one day per
/// request, and writes one JSON file per group plus [`COMBINED_FILE`] into
/// `output_dir`.
///
/// Days that fail are logged and skipped. Each group's file is written as
/// soon as the group is done.
#[tracing::instrument(skip(service))]
pub async fn energy_prices(
    service: &dyn Service,
    job: &PriceJob,
    output_dir: &Path,
) -> Result<BTreeMap<String, GspPrices>> {
    for gsp in &job.gsps {
        if !GSP_GROUPS.contains(&gsp.as_str()) {
            bail!(
                "Unknown GSP group {:?}: expected one of {}",
                gsp,
                GSP_GROUPS.join(", ")
            );
        }
    }
    let start_month = job.start_month.with_day(1).unwrap_or(job.start_month);
    let end_month = job.end_month.with_day(1).unwrap_or(job.end_month);
    if start_month > end_month {
        bail!(
            "Start month {} is after end month {}",
            start_month.format("%Y-%m"),
            end_month.format("%Y-%m")
        );
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {:?}", output_dir))?;

    let mut all = BTreeMap::new();
    for gsp in &job.gsps {
        info!("Processing GSP {}...", gsp);
        let prices = gsp_prices(service, job, gsp, start_month, end_month).await?;
        write_file(&prices, output_dir.join(gsp_file_name(gsp)))?;
        all.insert(gsp.clone(), prices);
    }

    write_file(&all, output_dir.join(COMBINED_FILE))?;
    Ok(all)
}

async fn gsp_prices(
    service: &dyn Service,
    job: &PriceJob,
    gsp: &str,
    start_month: NaiveDate,
    end_month: NaiveDate,
) -> Result<GspPrices> {
    let tariff = tariff_code(&job.product, gsp);
    let mut result = GspPrices::new();
    let mut month = start_month;

    while month <= end_month {
        let next_month = month
            .checked_add_months(Months::new(1))
            .context("Date out of range")?;
        let mut prices = MonthPrices::default();
        let mut values = Vec::new();

        for day in month.iter_days().take_while(|day| *day < next_month) {
            let date_key = day.format(DATE_FORMAT).to_string();
            let period_from = day.and_time(NaiveTime::MIN).and_utc();
            let params = Params::new()
                .set("product_code", job.product.as_str())
                .set("tariff_code", &tariff)
                .set("period_from", period_from)
                .set("period_to", period_from + TimeDelta::days(1));

            match fetch_day(service, params).await {
                Ok(rates) if !rates.is_empty() => {
                    values.extend(rates.iter().map(|rate| rate.value_exc_vat));
                    prices.days.insert(date_key, rates);
                }
                Ok(_) => {}
                Err(e) => warn!("Error fetching {} for GSP {}: {:#}", date_key, gsp, e),
            }

            if !job.pause.is_zero() {
                tokio::time::sleep(job.pause).await;
            }
        }

        if !values.is_empty() {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            prices.average = Some(round2(mean));
        }
        result.insert(month.format("%Y-%m").to_string(), prices);
        month = next_month;
    }

    Ok(result)
}

async fn fetch_day(service: &dyn Service, params: Params) -> Result<Vec<DayRate>> {
    let value = service.fetch("standard-unit-rates", params).await?;
    let page: Page<UnitRate> =
        serde_json::from_value(value).context("Unexpected unit rate payload")?;
    Ok(page.results.into_iter().map(DayRate::from).collect())
}

fn write_file<T: Serialize>(value: &T, path: PathBuf) -> Result<()> {
    write_json(value, Some(&path), &mut std::io::sink())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
