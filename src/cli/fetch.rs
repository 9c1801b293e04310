//! Fetch command implementation

use chrono::{Local, NaiveDate};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use super::{Cli, CliError};
use crate::cache::{JsonFileCache, ResultCache};
use crate::catalog::Catalog;
use crate::fetcher::http::{build_http_client, HttpTransport};
use crate::fetcher::token::{Credentials, HttpAuthenticator, TokenManager};
use crate::loader::{LoadSource, PeriodLoader};
use crate::metrics;
use crate::orchestrator::{FetchConfig, RateLimiter, RequestOrchestrator};
use crate::period::{HolidayCalendar, ReportPeriod};

/// Fetch command arguments
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Catalog endpoints to load, in order (id sources must come first)
    #[arg(required = true, num_args = 1..)]
    pub names: Vec<String>,

    /// API login
    #[arg(long, env = "REFDATA_LOGIN")]
    pub login: Option<String>,

    /// API password
    #[arg(long, env = "REFDATA_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Run as if today were this date (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

impl FetchArgs {
    /// Load every requested endpoint for the current period
    ///
    /// Endpoints are loaded one after another. The first failure ends the run; endpoints
    /// after it are not attempted.
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let catalog = Catalog::load().map_err(|e| CliError::CatalogError(e.clone()))?;

        // Reject unknown names before any network traffic
        for name in &self.names {
            if catalog.spec(name).is_none() {
                return Err(CliError::InvalidArgument(format!(
                    "unknown endpoint {name}; run `refdata-harvester endpoints` for the list"
                )));
            }
        }

        let credentials = match (&self.login, &self.password) {
            (Some(login), Some(password)) => Credentials::new(login.clone(), password.clone()),
            _ => {
                return Err(CliError::ConfigurationError(
                    "credentials required: --login/--password or REFDATA_LOGIN/REFDATA_PASSWORD"
                        .to_string(),
                ))
            }
        };

        let calendar = match &cli.holidays {
            Some(path) => HolidayCalendar::from_file(path)?,
            None => HolidayCalendar::new(),
        };
        let today = self.date.unwrap_or_else(|| Local::now().date_naive());
        let period = ReportPeriod::for_today(today, &calendar)?;

        if let Some(addr) = cli.metrics_addr {
            metrics::init_metrics(addr)?;
        }

        let base_url = cli
            .base_url
            .clone()
            .unwrap_or_else(|| catalog.default_base_url().to_string());

        info!(
            period = %period,
            report_date = %period.report_date(),
            work_date = %period.work_date(),
            base_url = %base_url,
            endpoints = self.names.len(),
            "fetch run started"
        );

        let loader = build_loader(cli, catalog, &base_url, credentials, period)?;

        for name in &self.names {
            let endpoint = catalog.endpoint(name, &period, &base_url)?;
            let loaded = loader.load_endpoint(&endpoint).await.map_err(|e| {
                error!(endpoint = %name, error = %e, "endpoint failed, aborting run");
                CliError::EndpointFailed {
                    endpoint: name.clone(),
                    source: e,
                }
            })?;
            let source = match loaded.source {
                LoadSource::Cache => "cache",
                LoadSource::Network => "network",
            };
            println!("{name}\t{period}\t{}\t{source}", loaded.rows.len());
        }

        info!(endpoints = self.names.len(), "fetch run finished");
        Ok(())
    }
}

/// Wire client, token manager, orchestrator and cache together
fn build_loader(
    cli: &Cli,
    catalog: &Catalog,
    base_url: &str,
    credentials: Credentials,
    period: ReportPeriod,
) -> Result<PeriodLoader, CliError> {
    let client = build_http_client()?;
    let authenticator = HttpAuthenticator::new(client.clone(), catalog.login_url(base_url), credentials);
    let tokens = Arc::new(TokenManager::new(Arc::new(authenticator)));

    let transport = HttpTransport::new(client);
    let limiter = RateLimiter::new(cli.concurrency);
    let orchestrator = Arc::new(RequestOrchestrator::new(
        Arc::new(transport),
        tokens,
        limiter,
        FetchConfig::default(),
    ));

    let cache: Arc<dyn ResultCache> = Arc::new(JsonFileCache::new(&cli.cache_dir));
    Ok(PeriodLoader::new(orchestrator, cache, period))
}
