//! ideaflow-analyze - pipeline analytics for a date range
//!
//! Reads the local mirror (see `ideaflow-sync`) and prints conversion rates,
//! time-to-decision metrics, the pipeline breakdown and user activity.

mod render;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, ValueEnum};
use ideaflow_core::analytics::{cached_analytics, DateRangePreset, ReportOrigin};
use ideaflow_core::{Config, Database};

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "ideaflow-analyze")]
#[command(about = "Show innovation pipeline analytics")]
#[command(version)]
struct Args {
    /// Named range: last7days, last30days, last90days or alltime
    #[arg(short, long, default_value = "last30days", conflicts_with_all = ["from", "to"])]
    range: DateRangePreset,

    /// Start of a custom range (YYYY-MM-DD, inclusive)
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,

    /// End of a custom range (YYYY-MM-DD, inclusive)
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Ignore cached snapshots and recompute
    #[arg(long)]
    refresh: bool,
}

/// Custom bounds cover whole days; a range ending today stops at `now`.
fn custom_preset(from: NaiveDate, to: NaiveDate, now: DateTime<Utc>) -> DateRangePreset {
    let start = from.and_time(chrono::NaiveTime::MIN).and_utc();
    let end_of_day = to
        .succ_opt()
        .map(|next| {
            next.and_time(chrono::NaiveTime::MIN).and_utc() - chrono::Duration::milliseconds(1)
        })
        .unwrap_or(now);
    DateRangePreset::Custom {
        start,
        end: end_of_day.min(now),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        ideaflow_core::logging::init(&config.logging).context("failed to initialize logging")?;

    // Open database
    let db_path = Config::database_path();
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let now = Utc::now();
    let preset = match (args.from, args.to) {
        (Some(from), Some(to)) => custom_preset(from, to, now),
        _ => args.range,
    };

    let (report, origin) = cached_analytics(&db, preset, &config.analytics, now, args.refresh)
        .context("failed to compute analytics")?;

    tracing::info!(
        range = %report.data.range,
        cached = matches!(origin, ReportOrigin::Snapshot { .. }),
        degraded = report.errors.len(),
        "Analytics computed"
    );

    match args.format {
        OutputFormat::Json => {
            let json = render::json_report(&report, origin);
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            print!("{}", render::text_report(&report, origin, now));
            if report.data.total_ideas.count == 0 && report.is_complete() {
                println!();
                println!(
                    "No ideas in this range. Run 'ideaflow-sync' to refresh the local mirror."
                );
            }
        }
    }

    Ok(())
}
