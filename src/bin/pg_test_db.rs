//! # pg-test-db
//!
//! Command-line front end: bring a test database up and keep it alive until
//! Ctrl-C, or print the effective configuration.

use anyhow::Context;
use clap::{Parser, Subcommand};
use pg_test_container::logging::{init_structured_logging, log_error};
use pg_test_container::{ConfigLoader, TestDatabase, TestDatabaseConfig};
use std::path::PathBuf;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "pg-test-db")]
#[command(about = "Provision ephemeral PostgreSQL containers for integration tests")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON); defaults to $PG_TEST_CONFIG
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a database, print its connection string and wait for Ctrl-C
    Up {
        /// Append a per-session suffix to the container and volume names
        #[arg(long)]
        unique: bool,

        /// Override the number of readiness attempts
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Print the effective configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() {
    init_structured_logging();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Up {
            unique,
            max_attempts,
        } => up(&cli, *unique, *max_attempts).await,
        Commands::Config => show_config(&cli),
    };

    if let Err(e) = result {
        log_error("pg-test-db", "main", &format!("{e:#}"), None);
        eprintln!("❌ {e:#}");
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<TestDatabaseConfig> {
    let mut loader = ConfigLoader::from_env();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    loader.load().context("failed to load configuration")
}

fn show_config(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let rendered = serde_json::to_string_pretty(&config.sanitized())?;
    println!("{rendered}");
    Ok(())
}

async fn up(cli: &Cli, unique: bool, max_attempts: Option<u32>) -> anyhow::Result<()> {
    let mut config = load_config(cli)?;
    if unique {
        config.container.unique_name = true;
    }
    if let Some(max_attempts) = max_attempts {
        config.readiness.max_attempts = max_attempts;
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut db = TestDatabase::start_cancellable(&config, cancel.clone())
        .await
        .context("failed to provision test database")?;

    println!("{}", db.connection_string());
    if db.is_external() {
        info!("Database supplied externally, nothing to keep alive");
        return Ok(());
    }

    info!("Press Ctrl-C to stop and remove the container");
    cancel.cancelled().await;

    if let Err(e) = db.dispose().await {
        warn!(error = %e, "Container teardown failed");
        return Err(e).context("failed to dispose test database");
    }
    println!("🧹 Container removed");
    Ok(())
}
