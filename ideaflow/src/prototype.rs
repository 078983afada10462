//! ideaflow-prototype - generate prototypes from PRDs
//!
//! Starts a generation, polls it to completion and mirrors the result into
//! the local database. In-flight generations are persisted per idea, so an
//! interrupted run (Ctrl+C, crash) can be continued with `resume`.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use ideaflow_core::backend::BackendClient;
use ideaflow_core::format::format_relative_time;
use ideaflow_core::generation::{
    CancellationToken, GenerationPhase, GenerationWorkflow, ReadyPrototype, StateStore,
};
use ideaflow_core::{Config, Database, Error};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ideaflow-prototype")]
#[command(about = "Generate prototypes from PRDs")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a prototype for an idea from one of its PRDs
    Generate {
        /// PRD used as the generation prompt
        #[arg(long)]
        prd: String,

        /// Idea the prototype belongs to
        #[arg(long)]
        idea: String,

        /// Retry this many times after a failure or timeout
        #[arg(long, default_value = "0")]
        retries: u32,
    },

    /// Continue polling generations interrupted by an earlier run
    Resume {
        /// Only resume this idea (default: all pending)
        #[arg(long)]
        idea: Option<String>,
    },

    /// List persisted in-flight generations
    Pending,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        ideaflow_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let store = Arc::new(
        StateStore::open(Config::generation_state_path())
            .context("failed to open generation state")?,
    );

    match args.command {
        Command::Pending => print_pending(&store),
        Command::Generate { prd, idea, retries } => {
            let (runtime, mut workflow, cancel) = connect(&config, store)?;
            runtime.block_on(generate(&mut workflow, &prd, &idea, retries, &cancel))
        }
        Command::Resume { idea } => {
            let (runtime, mut workflow, cancel) = connect(&config, store)?;
            runtime.block_on(resume(&mut workflow, idea, &cancel))
        }
    }
}

/// Build the workflow against the configured backend, with the local mirror
/// registered for ready/invalidate hooks and Ctrl+C wired to cancellation.
fn connect(
    config: &Config,
    store: Arc<StateStore>,
) -> Result<(
    tokio::runtime::Runtime,
    GenerationWorkflow<BackendClient>,
    CancellationToken,
)> {
    if !config.backend.is_ready() {
        anyhow::bail!(
            "backend is not configured: set backend.url and backend.anon_key in {}",
            Config::config_path().display()
        );
    }
    let client =
        BackendClient::new(config.backend.clone()).context("invalid backend configuration")?;

    let db = Arc::new(Database::open(&Config::database_path()).context("failed to open database")?);
    db.migrate().context("failed to run database migrations")?;

    // Ctrl+C stops polling but keeps the persisted state
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nStopping... run 'ideaflow-prototype resume' to continue.");
        handler_token.cancel();
    })
    .context("failed to set Ctrl+C handler")?;

    let workflow =
        GenerationWorkflow::new(client, store, config.generation.clone()).with_hooks(db);

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    Ok((runtime, workflow, cancel))
}

fn spinner(message: String) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .context("invalid spinner template")?,
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

fn print_ready(ready: &ReadyPrototype) {
    println!("Prototype ready: {}", ready.prototype_id);
    println!("  Idea: {}", ready.idea_id);
    println!("  PRD:  {}", ready.prd_id);
    if let Some(url) = &ready.url {
        println!("  URL:  {}", url);
    }
}

async fn generate(
    workflow: &mut GenerationWorkflow<BackendClient>,
    prd: &str,
    idea: &str,
    retries: u32,
    cancel: &CancellationToken,
) -> Result<()> {
    let progress = spinner(format!("Generating prototype for idea {}", idea))?;
    let mut result = workflow.generate(prd, idea, cancel).await;

    let mut attempt = 0;
    while attempt < retries
        && result.is_err()
        && matches!(
            workflow.phase(),
            GenerationPhase::Failed | GenerationPhase::TimedOut
        )
        && !matches!(result, Err(Error::Auth(_) | Error::AlreadyGenerating(_)))
    {
        attempt += 1;
        if let Err(e) = &result {
            progress.println(format!("Attempt failed: {}. Retrying ({}/{})", e, attempt, retries));
        }
        result = workflow.retry(cancel).await;
    }
    progress.finish_and_clear();

    match result {
        Ok(ready) => {
            print_ready(&ready);
            Ok(())
        }
        Err(Error::Cancelled) => {
            println!("Polling stopped. Generation state for idea {} was kept.", idea);
            Ok(())
        }
        Err(e) => Err(e).context("prototype generation failed"),
    }
}

async fn resume(
    workflow: &mut GenerationWorkflow<BackendClient>,
    idea: Option<String>,
    cancel: &CancellationToken,
) -> Result<()> {
    let ideas: Vec<String> = match idea {
        Some(idea) => vec![idea],
        None => workflow
            .pending()
            .context("failed to read generation state")?
            .into_iter()
            .map(|state| state.idea_id)
            .collect(),
    };

    if ideas.is_empty() {
        println!("No pending generations.");
        return Ok(());
    }

    let mut failures = 0;
    for idea in &ideas {
        if cancel.is_cancelled() {
            break;
        }
        let progress = spinner(format!("Resuming generation for idea {}", idea))?;
        let result = workflow.resume(idea, cancel).await;
        progress.finish_and_clear();

        match result {
            Ok(Some(ready)) => print_ready(&ready),
            Ok(None) => println!(
                "Nothing to resume for idea {} (not pending or still starting)",
                idea
            ),
            Err(Error::Cancelled) => {
                println!("Polling stopped. Generation state for idea {} was kept.", idea);
                break;
            }
            Err(e) => {
                failures += 1;
                eprintln!("Idea {}: {}", idea, e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} generation(s) failed", failures);
    }
    Ok(())
}

fn print_pending(store: &StateStore) -> Result<()> {
    let mut states = store.list().context("failed to read generation state")?;
    if states.is_empty() {
        println!("No pending generations.");
        return Ok(());
    }
    states.sort_by_key(|s| s.start_time);

    let now = Utc::now();
    println!("Pending generations ({}):", states.len());
    for state in &states {
        println!(
            "  idea {}  prd {}  prototype {}  started {}",
            state.idea_id,
            state.prd_id,
            state.prototype_id.as_deref().unwrap_or("(not accepted)"),
            format_relative_time(state.start_time, now)
        );
    }
    Ok(())
}
