//! ideaflow-sync - mirror the hosted pipeline tables into the local database
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/ideaflow/data.db (~/.local/share/ideaflow/data.db)
//! - Logs: $XDG_STATE_HOME/ideaflow/ideaflow.log (~/.local/state/ideaflow/ideaflow.log)
//! - Config: $XDG_CONFIG_HOME/ideaflow/config.toml (~/.config/ideaflow/config.toml)

use anyhow::{Context, Result};
use clap::Parser;
use ideaflow_core::backend::{sync_mirror, BackendClient};
use ideaflow_core::{Config, Database};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ideaflow-sync")]
#[command(about = "Mirror the hosted pipeline tables into the local database")]
#[command(version)]
struct Args {
    /// Only check that the backend is reachable with the configured credentials
    #[arg(long)]
    check: bool,

    /// Show local row counts without contacting the backend
    #[arg(long)]
    status: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        ideaflow_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("ideaflow-sync starting");

    let db_path = Config::database_path();
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    println!("Database: {}", db_path.display());

    if args.status {
        let counts = db.counts().context("failed to count mirrored rows")?;
        println!("  Users:      {}", counts.users);
        println!("  Ideas:      {}", counts.ideas);
        println!("  PRDs:       {}", counts.prds);
        println!("  Prototypes: {}", counts.prototypes);
        return Ok(());
    }

    if !config.backend.is_ready() {
        anyhow::bail!(
            "backend is not configured: set backend.url and backend.anon_key in {}",
            Config::config_path().display()
        );
    }
    let client =
        BackendClient::new(config.backend.clone()).context("invalid backend configuration")?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;

    if args.check {
        let reachable = runtime.block_on(client.health_check())?;
        if !reachable {
            anyhow::bail!("backend at {} is not reachable", client.base_url());
        }
        println!("Backend OK: {}", client.base_url());
        return Ok(());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("invalid spinner template")?,
    );
    spinner.set_message(format!("Syncing from {}...", client.base_url()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = runtime.block_on(sync_mirror(&client, &db));
    spinner.finish_and_clear();
    let summary = result.context("sync failed")?;

    println!("Sync complete: {} rows", summary.total_rows());
    println!("  Users:      {}", summary.users);
    println!("  Ideas:      {}", summary.ideas);
    println!("  PRDs:       {}", summary.prds);
    println!("  Prototypes: {}", summary.prototypes);
    if summary.snapshots_cleared > 0 {
        println!("  Cleared {} cached analytics snapshot(s)", summary.snapshots_cleared);
    }

    Ok(())
}
