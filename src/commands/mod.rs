use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::http::Params;

mod averages;
mod endpoints;
mod fetch;
mod prices;

pub use averages::{MonthlyAverages, generation_averages, parse_month};
pub use endpoints::endpoints;
pub use fetch::fetch;
pub use prices::{
    COMBINED_FILE, DayRate, GspPrices, MonthPrices, PriceJob, energy_prices, gsp_file_name,
};

/// Parses `KEY=VALUE` pairs from the command line into query parameters.
///
/// Values are passed through verbatim; the first `=` separates key from value.
pub fn parse_params(raw: &[String]) -> Result<Params> {
    let mut params = Params::new();
    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Invalid parameter {:?}: expected KEY=VALUE", pair))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Invalid parameter {:?}: empty key", pair);
        }
        params.insert(key, Some(value.into()));
    }
    Ok(params)
}

/// Pretty-prints `value` to `output`, or to `stdout` when no path is given.
pub fn write_json<T: Serialize, W: Write>(
    value: &T,
    output: Option<&Path>,
    stdout: &mut W,
) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize response")?;
    match output {
        Some(path) => {
            debug!("Writing response to {:?}", path);
            std::fs::write(path, format!("{}\n", rendered))
                .with_context(|| format!("Failed to write {:?}", path))?;
        }
        None => {
            writeln!(stdout, "{}", rendered).context("Failed to write to stdout")?;
        }
    }
    Ok(())
}
