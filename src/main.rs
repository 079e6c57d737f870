use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

mod config;
mod dates;
mod db;
mod dismissals;
mod documents;
mod models;
mod nudges;
mod report;
mod telemetry;

use config::AppConfig;
use dismissals::DismissedSet;
use models::{Application, Nudge};

#[derive(Parser)]
#[command(name = "study-abroad-nudges")]
#[command(about = "Deadline and document nudges for study-abroad applications", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SourceArgs {
    /// Read applications from a CSV export instead of Postgres
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Only include applications for this student
    #[arg(long)]
    student: Option<String>,
    /// Evaluate as of this RFC 3339 timestamp (defaults to now)
    #[arg(long, value_parser = parse_now)]
    now: Option<DateTime<Utc>>,
    /// JSON file holding dismissed fingerprints
    #[arg(long, default_value = ".nudges-dismissed.json")]
    state: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import applications and their documents from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print the current nudges
    Generate {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Emit JSON instead of text lines
        #[arg(long)]
        json: bool,
    },
    /// Hide nudges by fingerprint until their content changes
    Dismiss {
        #[arg(long, default_value = ".nudges-dismissed.json")]
        state: PathBuf,
        #[arg(required = true)]
        fingerprints: Vec<String>,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value = "nudges.md")]
        out: PathBuf,
    },
}

fn parse_now(raw: &str) -> Result<DateTime<Utc>, String> {
    dates::parse_date_or_null(Some(raw))
        .ok_or_else(|| format!("failed to parse '{raw}' as an RFC 3339 timestamp or YYYY-MM-DD"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.log_level)?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let imported = db::import_csv(&pool, &csv).await?;
            println!("Imported {imported} applications from {}.", csv.display());
        }
        Commands::Generate {
            source,
            limit,
            json,
        } => {
            let outcome = evaluate(&source, &config).await?;

            if json {
                let visible: Vec<&Nudge> = outcome.visible.iter().take(limit).collect();
                println!("{}", serde_json::to_string_pretty(&visible)?);
                return Ok(());
            }

            if outcome.visible.is_empty() {
                println!("No nudges for these applications.");
                return Ok(());
            }

            println!(
                "Nudges ({} shown of {}, {} dismissed):",
                outcome.visible.len().min(limit),
                outcome.visible.len(),
                outcome.hidden
            );
            for nudge in outcome.visible.iter().take(limit) {
                println!("- {}", report::format_line(nudge));
                println!("  fingerprint: {}", nudge.fingerprint);
            }
        }
        Commands::Dismiss {
            state,
            fingerprints,
        } => {
            let mut dismissed = DismissedSet::load(&state)?;
            let mut added = 0usize;
            for fingerprint in &fingerprints {
                if dismissed.dismiss(fingerprint) {
                    added += 1;
                }
            }
            dismissed.save(&state)?;
            println!(
                "Dismissed {added} nudge(s); {} fingerprint(s) stored in {}.",
                dismissed.len(),
                state.display()
            );
        }
        Commands::Report { source, out } => {
            let outcome = evaluate(&source, &config).await?;
            let report = report::build_report(
                source.student.as_deref(),
                outcome.now,
                &outcome.visible,
                outcome.hidden,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

struct Outcome {
    now: DateTime<Utc>,
    visible: Vec<Nudge>,
    hidden: usize,
}

/// One refresh cycle: load, generate, prune stale dismissals, filter.
async fn evaluate(source: &SourceArgs, config: &AppConfig) -> anyhow::Result<Outcome> {
    let now = source.now.unwrap_or_else(Utc::now);
    let (applications, documents) = match &source.csv {
        Some(path) => load_from_csv(path, source.student.as_deref())?,
        None => {
            let pool = connect().await?;
            let applications = db::fetch_applications(&pool, source.student.as_deref()).await?;
            let ids: Vec<_> = applications.iter().map(|app| app.id).collect();
            let documents = db::fetch_documents(&pool, &ids).await?;
            (applications, documents)
        }
    };

    let live = nudges::generate(&applications, &documents, now, &config.nudges);

    let mut dismissed = DismissedSet::load(&source.state)?;
    // A student-scoped run cannot tell which other fingerprints are still live.
    let pruned = if source.student.is_none() && !dismissed.is_empty() {
        dismissed.prune(&live)
    } else {
        0
    };
    if pruned > 0 {
        dismissed.save(&source.state)?;
    }
    let visible = dismissed.visible(&live);

    info!(
        applications = applications.len(),
        generated = live.len(),
        visible = visible.len(),
        pruned,
        "nudges evaluated"
    );

    Ok(Outcome {
        now,
        hidden: live.len() - visible.len(),
        visible,
    })
}

fn load_from_csv(
    path: &Path,
    student: Option<&str>,
) -> anyhow::Result<(Vec<Application>, db::DocumentIndex)> {
    let (mut applications, documents) = db::load_csv(path)?;
    if let Some(student) = student {
        applications.retain(|app| db::matches_student(&app.student_email, student));
    }
    Ok((applications, documents))
}
