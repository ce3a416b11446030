//! Collections CLI: rank an accounts-receivable export and draft follow-ups.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;

use collections_engine::models::{ActionPayload, IngestResponse};
use collections_engine::{get_drafts, ingest, log_action, AppState, LogActionPayload, Settings};

#[derive(Parser)]
#[command(
    name = "collections",
    about = "Prioritize overdue invoices and draft follow-up messages",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Score as of this date (YYYY-MM-DD) instead of today
    #[arg(long, global = true, value_parser = parse_now)]
    now: Option<DateTime<Utc>>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a CSV, JSON, spreadsheet or PDF file and print the ranked queue
    Ingest { file: PathBuf },

    /// Ingest a file, then draft follow-ups for one invoice
    Drafts { file: PathBuf, invoice_key: String },

    /// Ingest a file, log an action against one invoice and print the updated queue
    Action {
        file: PathBuf,
        invoice_key: String,
        /// copied, sent, paid, promise_to_pay, promise_broken or note
        action_type: String,
        #[arg(long)]
        notes: Option<String>,
    },
}

fn parse_now(raw: &str) -> Result<DateTime<Utc>, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(12, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("expected YYYY-MM-DD, got {}", raw))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ingest_file(state: &AppState, path: &Path, now: DateTime<Utc>) -> Result<IngestResponse> {
    let bytes = std::fs::read(path).with_context(|| format!("Reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("Invalid file name: {}", path.display()))?;
    Ok(ingest(state, &bytes, file_name, None, now)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let state = AppState::from_settings(&Settings::from_env())?;
    let now = cli.now.unwrap_or_else(Utc::now);

    match cli.command {
        Commands::Ingest { file } => {
            print_json(&ingest_file(&state, &file, now)?)?;
        }
        Commands::Drafts { file, invoice_key } => {
            let queue_id = ingest_file(&state, &file, now)?.queue_id;
            print_json(&get_drafts(&state, &queue_id, &invoice_key, now).await?)?;
        }
        Commands::Action {
            file,
            invoice_key,
            action_type,
            notes,
        } => {
            let queue_id = ingest_file(&state, &file, now)?.queue_id;
            let payload = LogActionPayload {
                queue_id,
                invoice_key,
                action_type,
                details: ActionPayload {
                    notes,
                    ..Default::default()
                },
            };
            print_json(&log_action(&state, payload, now)?)?;
        }
    }

    Ok(())
}
