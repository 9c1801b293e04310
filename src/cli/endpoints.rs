//! CLI command for listing catalog endpoints

use anyhow::{Context, Result};
use clap::Args;

use crate::catalog::{Catalog, IdSource};

/// Endpoints subcommand
#[derive(Debug, Args)]
pub struct EndpointsCommand {
    /// Output format
    #[arg(long, default_value = "human")]
    format: OutputFormat,
}

/// Output format for the endpoints command
#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

impl EndpointsCommand {
    /// Print every catalog endpoint
    pub fn execute(&self) -> Result<()> {
        let catalog = Catalog::load().map_err(|e| anyhow::anyhow!(e.clone()))?;

        match self.format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(catalog.entries())
                        .context("Failed to serialize catalog to JSON")?
                );
            }
            OutputFormat::Human => {
                println!("{} endpoints:\n", catalog.entries().len());
                for entry in catalog.entries() {
                    let ids = match &entry.ids {
                        Some(IdSource::Cached { entity, column }) => format!("ids from {entity}.{column}"),
                        Some(IdSource::Fixed { values }) => format!("{} fixed ids", values.len()),
                        None => String::new(),
                    };
                    println!(
                        "{:<24} | {:<14} | {:<40} | {}",
                        entry.name,
                        entry.pagination.label(),
                        entry.path,
                        ids
                    );
                }
            }
        }

        Ok(())
    }
}
