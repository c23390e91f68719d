//! burnin-ingest - Station file intake and database loader
//!
//! Subcommands:
//! - `ingest`: load everything queued in `to_process/` once
//! - `watch`: poll station folders, queue new files, ingest them
//! - `copy-filtered`: one-shot back-fill of station files newer than a cutoff

use anyhow::{Context, Result};
use burnin_common::config::{BurninConfig, SourceDirectory};
use burnin_common::db::init_database;
use burnin_ingest::{FilteredCopier, Ingester, Watchdog};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "burnin-ingest", version, about = "Burn-in test file intake")]
struct Cli {
    /// Config file (overrides BURNIN_CONFIG and the default locations)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest queued files once
    Ingest,
    /// Watch station folders
    Watch {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Copy station files newer than a cutoff date into the intake folders
    CopyFiltered {
        /// Only results strictly after this date (YYYY-MM-DD)
        #[arg(long)]
        cutoff: Option<NaiveDate>,
        /// Results folder to copy from (instead of the configured stations)
        #[arg(long, requires = "data_dir")]
        results_dir: Option<PathBuf>,
        /// Telemetry folder paired with --results-dir
        #[arg(long, requires = "results_dir")]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = BurninConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    burnin_common::logging::init(&config.settings.log_level, config.log_file_path().as_deref())?;

    info!(
        "Starting burnin-ingest v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let dirs = config.intake_dirs();
    dirs.ensure_exist()?;
    info!("Main directory: {}", config.paths.main_dir.display());

    match cli.command {
        Command::Ingest => {
            let ingester = open_ingester(&config).await?;
            ingester.run().await?;
        }
        Command::Watch { once } => {
            info!(
                "Monitoring {} source director(ies), interval {}s",
                config.paths.source_directories.len(),
                config.settings.check_interval
            );
            for source in &config.paths.source_directories {
                info!(
                    "  {}: results={}, data={}",
                    source.name,
                    source.results_dir.display(),
                    source.data_dir.display()
                );
            }

            let ingester = open_ingester(&config).await?;
            let watchdog = Watchdog::new(
                config.paths.source_directories.clone(),
                dirs,
                ingester,
                Duration::from_secs(config.settings.check_interval.max(1)),
            );
            if once {
                watchdog.run_cycle().await?;
            } else {
                watchdog.run().await?;
            }
        }
        Command::CopyFiltered {
            cutoff,
            results_dir,
            data_dir,
        } => {
            let sources = match (results_dir, data_dir) {
                (Some(results_dir), Some(data_dir)) => vec![SourceDirectory {
                    name: "cli".to_string(),
                    results_dir,
                    data_dir,
                }],
                _ => config.paths.source_directories.clone(),
            };
            let cutoff = cutoff.unwrap_or(config.copy_filter.cutoff_date);
            FilteredCopier::new(dirs, cutoff).run(&sources)?;
        }
    }

    Ok(())
}

async fn open_ingester(config: &BurninConfig) -> Result<Ingester> {
    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());
    let db = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    info!("✓ Database ready");
    Ok(Ingester::new(db, config.intake_dirs(), config.settings.batch_size))
}
