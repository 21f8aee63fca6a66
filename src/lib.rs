pub mod cli;
pub mod core;
pub mod job;
pub mod prices;
pub mod providers;
pub mod resolver;
pub mod warehouse;

use crate::core::config::{AppConfig, access_token_from_env, project_id_from_env};
use crate::warehouse::BigQueryWarehouse;
use anyhow::Result;
use tracing::{debug, info};

pub enum AppCommand {
    /// Refresh the FX rate table.
    Sync { dry_run: bool },
    /// Show the filtered pricing slice.
    Prices { limit: usize },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let project_id = project_id_from_env()?;
    run_with(command, &config, &project_id, access_token_from_env()).await
}

/// Runs `command` against an already resolved config and project.
pub async fn run_with(
    command: AppCommand,
    config: &AppConfig,
    project_id: &str,
    access_token: Option<String>,
) -> Result<()> {
    info!("fxsync starting...");

    let bigquery = config.warehouse.bigquery.clone().unwrap_or_default();
    let warehouse = BigQueryWarehouse::new(&bigquery, project_id, access_token)?;

    match command {
        AppCommand::Sync { dry_run } => {
            cli::sync::run(config, project_id, &warehouse, dry_run).await
        }
        AppCommand::Prices { limit } => cli::prices::run(config, &warehouse, limit).await,
    }
}
