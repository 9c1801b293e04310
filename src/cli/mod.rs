//! CLI command implementations

pub mod endpoints;
pub mod error;
pub mod fetch;

pub use endpoints::EndpointsCommand;
pub use error::CliError;
pub use fetch::FetchArgs;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::orchestrator::config::{DEFAULT_LIMIT, MAX_CONCURRENCY};

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Reference data harvester CLI
#[derive(Parser, Debug)]
#[command(name = "refdata-harvester")]
#[command(about = "Fetch paginated reference data into a period-keyed cache", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// API base URL (default: the catalog's base URL)
    #[arg(long, global = true, env = "REFDATA_BASE_URL")]
    pub base_url: Option<String>,

    /// Result cache directory
    #[arg(long, global = true, env = "REFDATA_CACHE_DIR", default_value = "data/cache")]
    pub cache_dir: PathBuf,

    /// Requests allowed in flight at once, also the wave size (max: 32)
    ///
    /// The upstream API accepts five requests per second; raise this only for
    /// accounts with a higher quota.
    #[arg(long, global = true, default_value_t = DEFAULT_LIMIT, value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Holiday calendar, whitespace-separated YYYY-MM-DD dates
    #[arg(long, global = true)]
    pub holidays: Option<PathBuf>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List catalog endpoints
    Endpoints(EndpointsCommand),

    /// Load endpoints for the current reporting period
    Fetch(FetchArgs),
}
