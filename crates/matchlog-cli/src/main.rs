use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use matchlog_adapters::{SnapshotFile, SnapshotKind};
use matchlog_core::LogStamp;
use matchlog_sync::{Reconciler, RunSummary, SyncConfig};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "matchlog")]
#[command(about = "Halftime alert ledger: merge scraped match snapshots into CSV tables")]
struct Cli {
    /// Print the run summary as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Log low-scoring halftime events from a live snapshot.
    Live {
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Add today's fixtures and odds.
    Today {
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Replace the results table.
    Results {
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Fill tournament and odds on logged alerts.
    Backfill,
    /// Attach final scores and append to the final database.
    Finalize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let reconciler = Reconciler::new(SyncConfig::from_env());

    let summary = match cli.command {
        Commands::Live { snapshot } => reconciler.record_live(
            &SnapshotFile::new(SnapshotKind::Live, snapshot),
            &LogStamp::now(),
        )?,
        Commands::Today { snapshot } => reconciler.record_today(
            &SnapshotFile::new(SnapshotKind::Today, snapshot),
            &LogStamp::now(),
        )?,
        Commands::Results { snapshot } => {
            reconciler.record_results(&SnapshotFile::new(SnapshotKind::Results, snapshot))?
        }
        Commands::Backfill => reconciler.backfill_tournament_and_odds()?,
        Commands::Finalize => reconciler.finalize_scores()?,
    };

    print_summary(&summary, cli.json)
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!(
            "{} complete: run_id={} table={} rows_in={} appended={} duplicates={} filled={} saved={} diagnostics={}",
            summary.pipeline,
            summary.run_id,
            summary.table,
            summary.rows_in,
            summary.appended,
            summary.duplicates,
            summary.filled,
            summary.saved,
            summary.diagnostics
        );
    }
    Ok(())
}
