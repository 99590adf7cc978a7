//! `altsvc-fetch`: request a URL repeatedly through the Alt-Svc routing
//! transport and report which path served each request.
//!
//! ```text
//! altsvc-fetch https://localhost:8443/ --count 3 \
//!     --ca-file ca.pem --server-name example.com \
//!     --alt-server-name example.com --allow-localhost
//! ```

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use http::{Request, Uri};
use serde::Serialize;
use url::Url;

use altsvc_transport::config::{load_config, validate_config, ConfigError, FetchConfig};
use altsvc_transport::observability::{logging, metrics};
use altsvc_transport::{HttpsTransport, Origin, RoutingTransport};

#[derive(Parser)]
#[command(name = "altsvc-fetch")]
#[command(about = "Fetch a URL through the Alt-Svc routing transport", long_about = None)]
struct Cli {
    /// URL to request.
    url: Url,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of requests to send.
    #[arg(short = 'n', long, default_value_t = 2)]
    count: u32,

    /// Pause between requests in milliseconds.
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,

    /// TLS server name verified for every request.
    #[arg(long)]
    server_name: Option<String>,

    /// TLS server name verified only when routing to an alternate.
    #[arg(long)]
    alt_server_name: Option<String>,

    /// Trust loopback alternates.
    #[arg(long)]
    allow_localhost: bool,

    /// Extra trusted root certificates (PEM). May be repeated.
    #[arg(long)]
    ca_file: Vec<PathBuf>,

    /// Print one JSON object per request.
    #[arg(long)]
    json: bool,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    metrics_address: Option<String>,
}

/// What happened to one request.
#[derive(Serialize)]
struct FetchReport {
    attempt: u32,
    route: &'static str,
    status: Option<u16>,
    body: Option<String>,
    error: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut FetchConfig) {
        if let Some(name) = &self.server_name {
            config.transport.server_name = Some(name.clone());
        }
        if let Some(name) = &self.alt_server_name {
            config.alt_svc.alternative_server_name = Some(name.clone());
        }
        if self.allow_localhost {
            config.alt_svc.localhost_allowed = true;
        }
        config.transport.extra_root_certs.extend(self.ca_file.iter().cloned());
        if let Some(address) = &self.metrics_address {
            config.observability.metrics_enabled = true;
            config.observability.metrics_address = address.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => FetchConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability.log_level)?;
    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let origin = Origin::from_url(&cli.url).ok_or("URL has no host")?;
    let uri: Uri = cli.url.as_str().parse()?;

    let base = HttpsTransport::new(&config.transport)?;
    let transport = RoutingTransport::new(base, config.alt_svc.clone())?;

    tracing::info!(
        origin = %origin,
        count = cli.count,
        localhost_allowed = config.alt_svc.localhost_allowed,
        "Fetching"
    );

    for attempt in 1..=cli.count {
        if attempt > 1 && cli.interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(cli.interval_ms)).await;
        }

        let request = Request::get(uri.clone()).body(Bytes::new())?;
        let outcome = transport.route(request).await;
        let route = outcome.label();
        let report = match outcome.into_result() {
            Ok(response) => FetchReport {
                attempt,
                route,
                status: Some(response.status().as_u16()),
                body: Some(String::from_utf8_lossy(response.body()).into_owned()),
                error: None,
            },
            Err(error) => FetchReport {
                attempt,
                route,
                status: None,
                body: None,
                error: Some(error.to_string()),
            },
        };
        print_report(&report, cli.json)?;
    }

    tracing::info!(cached_origins = transport.cache().len(), "Done");
    Ok(())
}

fn print_report(report: &FetchReport, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }
    match (&report.status, &report.error) {
        (Some(status), _) => println!(
            "#{} [{}] {} {}",
            report.attempt,
            report.route,
            status,
            report.body.as_deref().unwrap_or_default()
        ),
        (None, Some(error)) => println!("#{} [{}] error: {}", report.attempt, report.route, error),
        (None, None) => println!("#{} [{}]", report.attempt, report.route),
    }
    Ok(())
}
