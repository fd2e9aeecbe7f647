use anyhow::{Context, Result};
use std::io::Write;

use crate::service::Endpoint;

/// List the endpoints of a descriptor table, one per line: id, path, required
/// query parameters, then optional ones in brackets.
pub fn endpoints<W: Write>(table: &[Endpoint], out: &mut W) -> Result<()> {
    let width = table.iter().map(|e| e.id.len()).max().unwrap_or(0);

    for endpoint in table {
        let mut line = format!("{:width$}  {}", endpoint.id, endpoint.path, width = width);
        let query: Vec<&str> = endpoint
            .required
            .iter()
            .copied()
            .filter(|name| !endpoint.path_params().contains(name))
            .collect();
        if !query.is_empty() {
            line.push_str(&format!("  {}", query.join(" ")));
        }
        if !endpoint.optional.is_empty() {
            line.push_str(&format!("  [{}]", endpoint.optional.join(" ")));
        }
        writeln!(out, "{}", line.trim_end()).context("Failed to write to stdout")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    static TABLE: &[Endpoint] = &[
        Endpoint {
            id: "intensity-date",
            path: "intensity/date/{date}",
            required: &["date"],
            optional: &[],
            accepts_format: false,
        },
        Endpoint {
            id: "cdn",
            path: "CDN",
            required: &[],
            optional: &[],
            accepts_format: true,
        },
        Endpoint {
            id: "demand-outturn",
            path: "demand/outturn",
            required: &["settlementDateFrom", "settlementDateTo"],
            optional: &["settlementPeriod"],
            accepts_format: true,
        },
    ];

    #[test]
    fn test_endpoints_listing() {
        let mut out = Vec::new();
        endpoints(TABLE, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "intensity-date  intensity/date/{date}");
        assert_eq!(lines[1], "cdn             CDN");
        assert_eq!(
            lines[2],
            "demand-outturn  demand/outturn  settlementDateFrom settlementDateTo  [settlementPeriod]"
        );
    }

    #[test]
    fn test_every_service_table_lists() {
        for table in [
            crate::service::carbon::ENDPOINTS,
            crate::service::bmrs::ENDPOINTS,
            crate::service::octopus::ENDPOINTS,
        ] {
            let mut out = Vec::new();
            endpoints(table, &mut out).unwrap();
            assert_eq!(String::from_utf8(out).unwrap().lines().count(), table.len());
        }
    }
}
