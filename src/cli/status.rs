//! Status subcommand: checkpoint progress and stored record counts

use crate::output::csv::{stored_counts, StoredCounts};
use crate::resume::{CheckpointStatus, CheckpointStore, CollectionCheckpoint, FileCheckpointStore};
use clap::Parser;
use serde::Serialize;
use serde_json::json;

use super::{Cli, CliError, OutputFormat};

/// Status command
#[derive(Parser, Debug)]
pub struct StatusCommand {
    /// Only show collections that are not done
    #[arg(long, default_value_t = false)]
    pub unfinished: bool,
}

/// Checkpoint counts by status
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusTotals {
    /// Never started
    pub pending: usize,
    /// Started, not finished
    pub in_progress: usize,
    /// Finished
    pub done: usize,
}

impl StatusTotals {
    fn from_checkpoints(checkpoints: &[CollectionCheckpoint]) -> Self {
        let mut totals = Self::default();
        for checkpoint in checkpoints {
            match checkpoint.status() {
                CheckpointStatus::Pending => totals.pending += 1,
                CheckpointStatus::InProgress => totals.in_progress += 1,
                CheckpointStatus::Done => totals.done += 1,
            }
        }
        totals
    }
}

impl StatusCommand {
    /// Execute the status command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let checkpoints = if cli.state_dir.is_dir() {
            FileCheckpointStore::new(&cli.state_dir)?.list_checkpoints()?
        } else {
            Vec::new()
        };
        let totals = StatusTotals::from_checkpoints(&checkpoints);
        let records = stored_counts(&cli.records_dir)?;

        let shown: Vec<&CollectionCheckpoint> = checkpoints
            .iter()
            .filter(|cp| !self.unfinished || cp.status() != CheckpointStatus::Done)
            .collect();

        match cli.output_format {
            OutputFormat::Json => {
                let output = json!({
                    "state_dir": cli.state_dir.display().to_string(),
                    "totals": totals,
                    "records": records,
                    "checkpoints": shown,
                });
                println!("{}", serde_json::to_string(&output)?);
            }
            OutputFormat::Human => output_human(cli, &shown, &totals, records),
        }
        Ok(())
    }
}

fn output_human(
    cli: &Cli,
    checkpoints: &[&CollectionCheckpoint],
    totals: &StatusTotals,
    records: StoredCounts,
) {
    if checkpoints.is_empty() {
        println!("No checkpoints found in {}", cli.state_dir.display());
    }
    for checkpoint in checkpoints {
        let total = checkpoint
            .total_pages()
            .map_or_else(|| "?".to_string(), |t| t.to_string());
        let capped = if checkpoint.is_capped() { " (capped)" } else { "" };
        println!(
            "  collection {}: {} page {}/{}{}",
            checkpoint.collection_id(),
            checkpoint.status(),
            checkpoint.last_page_scraped(),
            total,
            capped
        );
    }

    println!("\nCheckpoints:");
    println!("  Pending: {}", totals.pending);
    println!("  In progress: {}", totals.in_progress);
    println!("  Done: {}", totals.done);
    println!("Records ({}):", cli.records_dir.display());
    println!("  Listings: {}", records.listings);
    println!("  Collection links: {}", records.links);
}
