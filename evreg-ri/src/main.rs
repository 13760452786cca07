//! evreg-ri - Referral Ingest service
//!
//! Serves the admin API (`serve`, the default) or runs a single ingestion
//! pass over a CSV directory (`ingest`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use evreg_ri::config::{CliOverrides, ServiceConfig};
use evreg_ri::AppState;

/// Command-line arguments for evreg-ri
#[derive(Parser, Debug)]
#[command(name = "evreg-ri")]
#[command(about = "Referral ingest service for event registration")]
#[command(version)]
struct Args {
    /// Bootstrap TOML configuration file
    #[arg(long, env = "EVREG_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database and CSV directory
    #[arg(short, long, env = "EVREG_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// SQLite database file
    #[arg(long)]
    database: Option<PathBuf>,

    /// Directory scanned for referral CSV files
    #[arg(long, env = "EVREG_CSV_DIR")]
    csv_dir: Option<PathBuf>,

    /// Host to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "EVREG_PORT")]
    port: Option<u16>,

    /// Per-user upload storage quota in bytes
    #[arg(long, env = "EVREG_USER_STORAGE_LIMIT")]
    user_storage_limit: Option<i64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Ingest every CSV file in a directory once and print the summary
    Ingest {
        /// Directory to ingest (defaults to the configured CSV directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = evreg_common::config::load_toml_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    let overrides = CliOverrides {
        root_folder: args.root_folder.clone(),
        database: args.database.clone(),
        host: args.host.clone(),
        port: args.port,
        csv_dir: args.csv_dir.clone(),
        user_storage_limit: args.user_storage_limit,
    };
    let config = ServiceConfig::resolve(&overrides, &toml_config);

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("evreg_ri={0},evreg_common={0},tower_http=info", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting evreg-ri (Referral Ingest) version {}", env!("CARGO_PKG_VERSION"));
    info!("Root folder: {}", config.root_folder.display());

    evreg_common::config::ensure_directory_exists(&config.root_folder)
        .context("Failed to initialize root folder")?;

    info!("Database: {}", config.database_path.display());
    let db_pool = evreg_common::db::init_database(&config.database_path)
        .await
        .context("Failed to open database")?;
    info!("Database connection established");

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(db_pool, config).await,
        Command::Ingest { dir } => {
            let dir = dir.unwrap_or_else(|| config.csv_dir.clone());
            run_ingest(db_pool, dir).await
        }
    }
}

async fn serve(db_pool: sqlx::SqlitePool, config: ServiceConfig) -> Result<()> {
    let shared_secret = evreg_common::api::auth::load_shared_secret(&db_pool)
        .await
        .context("Failed to load API shared secret")?;
    if shared_secret == 0 {
        info!("API authentication disabled (shared secret is 0)");
    }

    evreg_common::config::ensure_directory_exists(&config.csv_dir)
        .context("Failed to create CSV directory")?;
    info!("CSV directory: {}", config.csv_dir.display());

    match config.user_storage_limit {
        Some(limit) => info!("User storage limit: {} bytes", limit),
        None => info!("User storage limit: unlimited"),
    }

    let state = AppState::new(db_pool, config.csv_dir.clone(), shared_secret)
        .with_storage_limit(config.user_storage_limit);
    let app = evreg_ri::build_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;
    info!("Listening on http://{}", address);
    info!("Health check: http://{}/health", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn run_ingest(db_pool: sqlx::SqlitePool, dir: PathBuf) -> Result<()> {
    let reconciler = evreg_ri::build_reconciler(&db_pool);
    let summary = reconciler
        .ingest_directory(&dir)
        .await
        .with_context(|| format!("Failed to enumerate {}", dir.display()))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
