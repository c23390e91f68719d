//! burnin-dash - Burn-in monitoring dashboard API
//!
//! Subcommands:
//! - `serve`: run the HTTP API
//! - `issue-session`: mint a session cookie value (SSO gateway / local use)

use anyhow::{bail, Context, Result};
use burnin_common::auth::{
    expiry_after_hours, issue_token, load_session_secret, now_unix, SessionClaims, SESSION_COOKIE,
};
use burnin_common::config::BurninConfig;
use burnin_common::db::init_database;
use burnin_dash::{build_router, AppState};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "burnin-dash", version, about = "Burn-in monitoring dashboard")]
struct Cli {
    /// Config file (overrides BURNIN_CONFIG and the default locations)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Listen address (overrides [server].bind)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print a signed session cookie value
    IssueSession {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        /// Hours until the session expires
        #[arg(long, default_value_t = 12)]
        ttl_hours: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = BurninConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    burnin_common::logging::init(&config.settings.log_level, config.log_file_path().as_deref())?;

    // Log build identification immediately after tracing init
    info!(
        "Starting burnin-dash v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());

    let pool = match init_database(&db_path).await {
        Ok(pool) => {
            info!("✓ Connected to database");
            pool
        }
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return Err(e.into());
        }
    };

    let session_secret = load_session_secret(&pool)
        .await
        .context("Failed to load session secret")?;

    match cli.command {
        Command::Serve { bind } => {
            if session_secret == 0 {
                info!("Session checking disabled (session_shared_secret = 0)");
            } else {
                info!("✓ Loaded session secret");
            }

            let state = AppState::new(pool, session_secret);
            let app = build_router(state);

            let bind = bind.unwrap_or(config.server.bind);
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("Failed to bind {}", bind))?;
            info!("burnin-dash listening on http://{}", bind);
            info!("Health check: http://{}/health", bind);

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Shutdown requested");
                })
                .await?;
        }
        Command::IssueSession {
            email,
            name,
            ttl_hours,
        } => {
            if session_secret == 0 {
                bail!("Session checking is disabled (session_shared_secret = 0); no cookie needed");
            }
            if ttl_hours <= 0 {
                bail!("--ttl-hours must be positive");
            }

            let exp = expiry_after_hours(now_unix(), ttl_hours)
                .with_context(|| format!("--ttl-hours {} is too large", ttl_hours))?;
            let claims = SessionClaims { email, name, exp };
            let token = issue_token(&claims, session_secret)?;
            info!(email = %claims.email, exp = claims.exp, "Issued session");
            println!("{}={}", SESSION_COOKIE, token);
        }
    }

    Ok(())
}
