use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fxsync::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for fxsync::AppCommand {
    fn from(cmd: Commands) -> fxsync::AppCommand {
        match cmd {
            Commands::Sync { dry_run } => fxsync::AppCommand::Sync { dry_run },
            Commands::Prices { limit } => fxsync::AppCommand::Prices { limit },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch FX rates for every (date, currency) pair and overwrite the rate table
    Sync {
        /// Resolve and print the rates without writing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Load and preview the filtered pricing dataset
    Prices {
        /// Number of rows to preview
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => fxsync::cli::setup::setup(),
        Some(cmd) => fxsync::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
