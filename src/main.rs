use anyhow::{Context, Result};
use clap::Parser;
use gridclient::commands;
use gridclient::service::octopus::AGILE_PRODUCT;
use gridclient::service::{BmrsService, CarbonIntensityService, OctopusService};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// gridclient - GB energy data client
///
/// Fetch data from the carbon-intensity API, the BMRS (Elexon) dataset API and
/// the Octopus Energy tariff API.
///
/// The BMRS API needs a key, read from --api-key or the BMRS_API_KEY
/// environment variable.
///
/// Examples:
///   gridclient carbon intensity
///   gridclient carbon intensity-date -p date=2023-10-01
///   gridclient bmrs demand-outturn -p settlementDateFrom=2024-01-01 -p settlementDateTo=2024-01-07
///   gridclient endpoints bmrs
///   gridclient energy-prices --gsp C --start 2024-01 --end 2024-03
#[derive(Parser, Debug)]
#[command(author, version = env!("GRIDCLIENT_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Per-attempt timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Attempts per request, including the first one
    #[arg(long, value_name = "N", global = true)]
    pub retries: Option<u32>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Fetch an endpoint of the carbon-intensity API
    Carbon(CarbonArgs),

    /// Fetch an endpoint of the BMRS dataset API
    Bmrs(BmrsArgs),

    /// Fetch an endpoint of the Octopus Energy API
    Octopus(OctopusArgs),

    /// List the endpoints of a service
    Endpoints(EndpointsArgs),

    /// Average the regional generation mix per month
    GenerationAverages(AveragesArgs),

    /// Collect daily unit rates per GSP group into JSON files
    EnergyPrices(PricesArgs),
}

#[derive(clap::Args, Debug)]
pub struct RequestArgs {
    /// Endpoint id, see `gridclient endpoints`
    #[arg(value_name = "ENDPOINT")]
    pub endpoint: String,

    /// Parameter as KEY=VALUE (repeatable)
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Write the response to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct CarbonArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// API root URL
    #[arg(long = "base-url", env = "CARBON_INTENSITY_URL", value_name = "URL")]
    pub base_url: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct BmrsArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// API root URL
    #[arg(long = "base-url", env = "BMRS_URL", value_name = "URL")]
    pub base_url: Option<String>,

    /// BMRS API key
    #[arg(
        long = "api-key",
        env = "BMRS_API_KEY",
        value_name = "KEY",
        hide_env_values = true
    )]
    pub api_key: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct OctopusArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// API root URL
    #[arg(long = "base-url", env = "OCTOPUS_URL", value_name = "URL")]
    pub base_url: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ServiceName {
    Carbon,
    Bmrs,
    Octopus,
}

#[derive(clap::Args, Debug)]
pub struct EndpointsArgs {
    #[arg(value_enum)]
    service: ServiceName,
}

#[derive(clap::Args, Debug)]
pub struct AveragesArgs {
    /// First month to collect, YYYY-MM
    #[arg(long = "start", value_name = "YYYY-MM", default_value = "2022-11")]
    pub start: String,

    /// Last day to collect, YYYY-MM-DD (defaults to today)
    #[arg(long, value_name = "DATE")]
    pub until: Option<chrono::NaiveDate>,

    /// Output JSON file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "monthly_generation_averages.json"
    )]
    pub output: PathBuf,

    /// Seconds to wait between requests
    #[arg(long, value_name = "SECS", default_value_t = 1)]
    pub pause: u64,

    /// API root URL
    #[arg(long = "base-url", env = "CARBON_INTENSITY_URL", value_name = "URL")]
    pub base_url: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct PricesArgs {
    /// Directory the JSON files are written to
    #[arg(long = "output-dir", value_name = "DIR", default_value = "energy_data")]
    pub output_dir: PathBuf,

    /// First month to collect, YYYY-MM
    #[arg(long, value_name = "YYYY-MM", default_value = "2022-11")]
    pub start: String,

    /// Last month to collect, YYYY-MM
    #[arg(long, value_name = "YYYY-MM", default_value = "2025-01")]
    pub end: String,

    /// Product code
    #[arg(long, value_name = "CODE", default_value = AGILE_PRODUCT)]
    pub product: String,

    /// GSP group letter (repeatable, defaults to every group)
    #[arg(long = "gsp", value_name = "LETTER")]
    pub gsps: Vec<String>,

    /// Seconds to wait between requests
    #[arg(long, value_name = "SECS", default_value_t = 0)]
    pub pause: u64,

    /// API root URL
    #[arg(long = "base-url", env = "OCTOPUS_URL", value_name = "URL")]
    pub base_url: Option<String>,
}

impl PricesArgs {
    fn job(&self) -> Result<commands::PriceJob> {
        let gsps = if self.gsps.is_empty() {
            gridclient::service::octopus::GSP_GROUPS
                .iter()
                .map(|g| g.to_string())
                .collect()
        } else {
            self.gsps.iter().map(|g| g.trim().to_uppercase()).collect()
        };
        Ok(commands::PriceJob {
            product: self.product.clone(),
            gsps,
            start_month: commands::parse_month(&self.start)?,
            end_month: commands::parse_month(&self.end)?,
            pause: Duration::from_secs(self.pause),
        })
    }
}

fn carbon_service(
    cli_timeout: Option<u64>,
    retries: Option<u32>,
    base_url: Option<String>,
) -> Result<CarbonIntensityService> {
    let mut builder = CarbonIntensityService::builder();
    if let Some(url) = base_url {
        builder = builder.base_url(url);
    }
    if let Some(secs) = cli_timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(n) = retries {
        builder = builder.retry_attempts(n);
    }
    builder.build().context("Invalid carbon-intensity configuration")
}

fn bmrs_service(
    cli_timeout: Option<u64>,
    retries: Option<u32>,
    base_url: Option<String>,
    api_key: Option<String>,
) -> Result<BmrsService> {
    let mut builder = BmrsService::builder(api_key.unwrap_or_default());
    if let Some(url) = base_url {
        builder = builder.base_url(url);
    }
    if let Some(secs) = cli_timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(n) = retries {
        builder = builder.retry_attempts(n);
    }
    builder.build().context("Invalid BMRS configuration")
}

fn octopus_service(
    cli_timeout: Option<u64>,
    retries: Option<u32>,
    base_url: Option<String>,
) -> Result<OctopusService> {
    let mut builder = OctopusService::builder();
    if let Some(url) = base_url {
        builder = builder.base_url(url);
    }
    if let Some(secs) = cli_timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(n) = retries {
        builder = builder.retry_attempts(n);
    }
    builder.build().context("Invalid Octopus configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Carbon(args) => {
            let service = carbon_service(cli.timeout, cli.retries, args.base_url)?;
            let req = args.request;
            let output = req.output.as_deref();
            commands::fetch(&service, &req.endpoint, &req.params, output, &mut stdout).await?
        }
        Commands::Bmrs(args) => {
            let service = bmrs_service(cli.timeout, cli.retries, args.base_url, args.api_key)?;
            let req = args.request;
            let output = req.output.as_deref();
            commands::fetch(&service, &req.endpoint, &req.params, output, &mut stdout).await?
        }
        Commands::Octopus(args) => {
            let service = octopus_service(cli.timeout, cli.retries, args.base_url)?;
            let req = args.request;
            let output = req.output.as_deref();
            commands::fetch(&service, &req.endpoint, &req.params, output, &mut stdout).await?
        }
        Commands::Endpoints(args) => {
            let table = match args.service {
                ServiceName::Carbon => gridclient::service::carbon::ENDPOINTS,
                ServiceName::Bmrs => gridclient::service::bmrs::ENDPOINTS,
                ServiceName::Octopus => gridclient::service::octopus::ENDPOINTS,
            };
            commands::endpoints(table, &mut stdout)?
        }
        Commands::GenerationAverages(args) => {
            let service = carbon_service(cli.timeout, cli.retries, args.base_url)?;
            let start = commands::parse_month(&args.start)?;
            let until = args
                .until
                .unwrap_or_else(|| chrono::Local::now().date_naive());
            let averages = commands::generation_averages(
                &service,
                start,
                until,
                Duration::from_secs(args.pause),
            )
            .await?;
            commands::write_json(&averages, Some(&args.output), &mut stdout)?;
            writeln!(stdout, "Saved monthly averages to {}", args.output.display())?;
        }
        Commands::EnergyPrices(args) => {
            let job = args.job()?;
            let service = octopus_service(cli.timeout, cli.retries, args.base_url.clone())?;
            commands::energy_prices(&service, &job, &args.output_dir).await?;
            writeln!(
                stdout,
                "Saved prices for {} GSP groups to {}",
                job.gsps.len(),
                args.output_dir.display()
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_carbon_parsing() {
        let cli = Cli::try_parse_from([
            "gridclient",
            "carbon",
            "intensity-date",
            "-p",
            "date=2023-10-01",
        ])
        .unwrap();
        match cli.command {
            Commands::Carbon(args) => {
                assert_eq!(args.request.endpoint, "intensity-date");
                assert_eq!(args.request.params, vec!["date=2023-10-01"]);
                assert_eq!(args.request.output, None);
            }
            _ => panic!("Expected Carbon command"),
        }
        assert_eq!(cli.timeout, None);
    }

    #[test]
    fn test_cli_bmrs_parsing() {
        let cli = Cli::try_parse_from([
            "gridclient",
            "--retries",
            "2",
            "bmrs",
            "cdn",
            "--api-key",
            "secret",
            "--base-url",
            "http://localhost:1234",
            "-o",
            "/tmp/out.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Bmrs(args) => {
                assert_eq!(args.request.endpoint, "cdn");
                assert_eq!(args.api_key.as_deref(), Some("secret"));
                assert_eq!(args.base_url.as_deref(), Some("http://localhost:1234"));
                assert_eq!(args.request.output, Some(PathBuf::from("/tmp/out.json")));
            }
            _ => panic!("Expected Bmrs command"),
        }
        assert_eq!(cli.retries, Some(2));
    }

    #[test]
    fn test_cli_global_timeout_after_subcommand() {
        let cli = Cli::try_parse_from(["gridclient", "carbon", "intensity", "--timeout", "5"])
            .unwrap();
        assert_eq!(cli.timeout, Some(5));
    }

    #[test]
    fn test_cli_endpoints_parsing() {
        let cli = Cli::try_parse_from(["gridclient", "endpoints", "bmrs"]).unwrap();
        match cli.command {
            Commands::Endpoints(args) => assert_eq!(args.service, ServiceName::Bmrs),
            _ => panic!("Expected Endpoints command"),
        }
        let cli = Cli::try_parse_from(["gridclient", "endpoints", "octopus"]).unwrap();
        match cli.command {
            Commands::Endpoints(args) => assert_eq!(args.service, ServiceName::Octopus),
            _ => panic!("Expected Endpoints command"),
        }
        assert!(Cli::try_parse_from(["gridclient", "endpoints", "elexon"]).is_err());
    }

    #[test]
    fn test_cli_generation_averages_defaults() {
        let cli = Cli::try_parse_from(["gridclient", "generation-averages"]).unwrap();
        match cli.command {
            Commands::GenerationAverages(args) => {
                assert_eq!(args.start, "2022-11");
                assert_eq!(args.until, None);
                assert_eq!(args.pause, 1);
                assert_eq!(
                    args.output,
                    PathBuf::from("monthly_generation_averages.json")
                );
            }
            _ => panic!("Expected GenerationAverages command"),
        }
    }

    #[test]
    fn test_cli_octopus_parsing() {
        let cli = Cli::try_parse_from([
            "gridclient",
            "octopus",
            "grid-supply-points",
            "-p",
            "postcode=SW1A1AA",
        ])
        .unwrap();
        match cli.command {
            Commands::Octopus(args) => {
                assert_eq!(args.request.endpoint, "grid-supply-points");
                assert_eq!(args.request.params, vec!["postcode=SW1A1AA"]);
            }
            _ => panic!("Expected Octopus command"),
        }
    }

    #[test]
    fn test_cli_energy_prices_defaults() {
        let cli = Cli::try_parse_from(["gridclient", "energy-prices"]).unwrap();
        match cli.command {
            Commands::EnergyPrices(args) => {
                assert_eq!(args.output_dir, PathBuf::from("energy_data"));
                assert_eq!(args.product, AGILE_PRODUCT);
                assert_eq!(args.pause, 0);
                let job = args.job().unwrap();
                assert_eq!(job.gsps.len(), 14);
                assert_eq!(job.start_month.to_string(), "2022-11-01");
                assert_eq!(job.end_month.to_string(), "2025-01-01");
            }
            _ => panic!("Expected EnergyPrices command"),
        }
    }

    #[test]
    fn test_cli_energy_prices_selected_gsps() {
        let cli = Cli::try_parse_from([
            "gridclient",
            "energy-prices",
            "--gsp",
            "c",
            "--gsp",
            " P ",
            "--end",
            "2023-13",
        ])
        .unwrap();
        match cli.command {
            Commands::EnergyPrices(args) => {
                assert_eq!(args.gsps, vec!["c", " P "]);
                assert!(args.job().is_err());
                let args = PricesArgs {
                    end: "2023-12".to_string(),
                    ..args
                };
                assert_eq!(args.job().unwrap().gsps, vec!["C", "P"]);
            }
            _ => panic!("Expected EnergyPrices command"),
        }
    }

    #[test]
    fn test_cli_missing_endpoint_fails() {
        assert!(Cli::try_parse_from(["gridclient", "carbon"]).is_err());
        assert!(Cli::try_parse_from(["gridclient"]).is_err());
    }

    #[test]
    fn test_bmrs_service_requires_key() {
        let err = bmrs_service(None, None, None, None).unwrap_err();
        assert!(format!("{:#}", err).contains("BMRS API key is required"));
    }
}
