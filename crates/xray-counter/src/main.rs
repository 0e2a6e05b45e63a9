//! Xray test counter CLI.
//!
//! Reads `config.json` and the input table from a component data directory,
//! fetches test counts from Xray Cloud and writes the enriched table.

mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use xray_counter::component;
use xray_counter::datadir::{DataDir, DATA_DIR_ENV, DEFAULT_DATA_DIR};
use xray_counter::{AuthError, ComponentConfig, ConfigError, Configuration, RunError, TableError};

/// Enrich table rows with Xray Cloud test counts.
#[derive(Parser)]
#[command(name = "xray-counter")]
#[command(about = "Enrich table rows with Xray Cloud test counts")]
#[command(version)]
struct Cli {
    /// Component data directory (config.json, in/tables, out/tables)
    #[arg(long, env = DATA_DIR_ENV, default_value = DEFAULT_DATA_DIR, global = true)]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process the input table (default)
    Run,
    /// Validate configuration and credentials without touching tables
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let data_dir = DataDir::new(&cli.data_dir);

    let loaded = data_dir.load_config().and_then(|component| {
        let config = component.configuration()?;
        Ok((component, config))
    });

    let verbose = cli.verbose || loaded.as_ref().is_ok_and(|(_, config)| config.debug);
    logging::init(verbose);

    let (component, config) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(error = %e, "Configuration error");
            return ExitCode::from(1);
        }
    };

    info!(data_dir = %data_dir.root().display(), "Component starting");
    config.log_summary();

    match execute(cli.command.unwrap_or(Commands::Run), &data_dir, &component, &config).await {
        Ok(()) => {
            info!("Job completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = exit_code(&e);
            error!("Job failed: {e:#}");
            ExitCode::from(code)
        }
    }
}

async fn execute(
    command: Commands,
    data_dir: &DataDir,
    component: &ComponentConfig,
    config: &Configuration,
) -> Result<()> {
    match command {
        Commands::Run => {
            let summary = component::run(data_dir, component, config).await?;
            info!(
                rows = summary.rows,
                counted = summary.counted,
                failed = summary.failed,
                skipped = summary.skipped,
                "Component finished"
            );
        }
        Commands::Check => {
            component::connect(config).await?;
            info!("Configuration and credentials are valid");
        }
    }
    Ok(())
}

/// 1 for user-facing failures (config, credentials, tables), 2 otherwise.
fn exit_code(err: &anyhow::Error) -> u8 {
    let user_error = err.chain().any(|cause| {
        cause.is::<ConfigError>()
            || cause.is::<AuthError>()
            || cause.is::<TableError>()
            || cause.is::<RunError>()
    });
    if user_error {
        1
    } else {
        2
    }
}
