use anyhow::{Context, Result, bail};
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use log::{info, warn};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::http::Params;
use crate::service::Service;
use crate::service::types::RegionalResponse;

/// Month (`YYYY-MM`) -> region id -> fuel -> mean share in percent.
pub type MonthlyAverages = BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>;

/// Longest range requested in one call, in days.
const CHUNK_DAYS: i64 = 14;

#[derive(Default)]
struct Accumulator {
    sums: BTreeMap<String, f64>,
    count: u32,
}

/// Parses `YYYY-MM` into the first day of that month.
pub fn parse_month(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
        .with_context(|| format!("Invalid month {:?}: expected YYYY-MM", raw))
}

/// Splits `[start, end]` into consecutive windows of at most [`CHUNK_DAYS`]
/// days, each ending at 23:59:59 unless it hits `end`.
fn chunks(start: NaiveDateTime, end: NaiveDateTime) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    let mut windows = Vec::new();
    let mut chunk_start = start;
    while chunk_start <= end {
        let chunk_end = (chunk_start.date() + TimeDelta::days(CHUNK_DAYS - 1))
            .and_time(last_second)
            .min(end);
        windows.push((chunk_start, chunk_end));
        chunk_start = chunk_end + TimeDelta::seconds(1);
    }
    windows
}

/// Collects the regional generation mix month by month, from `start_month`
/// up to and including `until`, and averages it per region and fuel.
///
/// Windows that fail are logged and skipped. `pause` is slept between calls.
#[tracing::instrument(skip(service))]
pub async fn generation_averages(
    service: &dyn Service,
    start_month: NaiveDate,
    until: NaiveDate,
    pause: Duration,
) -> Result<MonthlyAverages> {
    let start_month = start_month.with_day(1).unwrap_or(start_month);
    if start_month > until {
        bail!("Start month {} is after {}", start_month.format("%Y-%m"), until);
    }

    let mut totals: BTreeMap<(String, u32), Accumulator> = BTreeMap::new();
    let mut month = start_month;

    loop {
        let is_last = month.year() == until.year() && month.month() == until.month();
        let month_end = if is_last {
            until
        } else {
            month
                .checked_add_months(Months::new(1))
                .and_then(|next| next.pred_opt())
                .context("Date out of range")?
        };
        let month_key = month.format("%Y-%m").to_string();
        info!("Processing {}...", month_key);

        let end = month_end
            .and_hms_opt(23, 59, 59)
            .context("Date out of range")?;
        for (from, to) in chunks(month.and_time(NaiveTime::MIN), end) {
            let params = Params::new()
                .set("from", from.and_utc())
                .set("to", to.and_utc());

            let value = match service.fetch("regional-intensity-range", params).await {
                Ok(value) => value,
                Err(e) => {
                    warn!("Error fetching {} to {}: {}", from, to, e);
                    continue;
                }
            };
            let response: RegionalResponse = match serde_json::from_value(value) {
                Ok(response) => response,
                Err(e) => {
                    warn!("Unexpected payload for {} to {}: {}", from, to, e);
                    continue;
                }
            };

            for interval in response.data.into_vec() {
                for region in interval.regions {
                    let acc = totals
                        .entry((month_key.clone(), region.regionid))
                        .or_default();
                    for share in region.generationmix {
                        *acc.sums.entry(share.fuel).or_insert(0.0) += share.perc;
                    }
                    acc.count += 1;
                }
            }

            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        if is_last {
            break;
        }
        month = month
            .checked_add_months(Months::new(1))
            .context("Date out of range")?;
    }

    let mut result = MonthlyAverages::new();
    for ((month_key, region_id), acc) in totals {
        if acc.count == 0 {
            continue;
        }
        let fuels = acc
            .sums
            .into_iter()
            .map(|(fuel, total)| (fuel, round1(total / f64::from(acc.count))))
            .collect();
        result
            .entry(month_key)
            .or_default()
            .insert(region_id.to_string(), fuels);
    }
    Ok(result)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
