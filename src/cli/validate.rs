//! Validation subcommand

use super::{Cli, CliError};
use crate::collection::CollectionCatalog;
use crate::resume::FileCheckpointStore;
use clap::Parser;
use std::path::{Path, PathBuf};

/// Validate command for checking checkpoints and the catalogue
#[derive(Parser, Debug)]
pub struct ValidateCommand {
    /// What to validate
    #[command(subcommand)]
    pub target: ValidateTarget,
}

/// Target type for validation
#[derive(clap::Subcommand, Debug)]
pub enum ValidateTarget {
    /// Validate every checkpoint file in the state directory
    Checkpoints,
    /// Validate a collection catalogue file
    Catalogue {
        /// Catalogue file
        #[arg(long, env = "CATALOGUE", default_value = "collections.json")]
        path: PathBuf,
    },
}

impl ValidateCommand {
    /// Execute the validation command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        match &self.target {
            ValidateTarget::Checkpoints => self.validate_checkpoints(&cli.state_dir),
            ValidateTarget::Catalogue { path } => self.validate_catalogue(path),
        }
    }

    /// Validate a collection catalogue
    fn validate_catalogue(&self, path: &Path) -> Result<(), CliError> {
        match CollectionCatalog::load(path) {
            Ok(catalogue) => {
                println!("Valid catalogue: {}", path.display());
                println!("  Collections: {}", catalogue.collections().len());
                Ok(())
            }
            Err(e) => {
                eprintln!("Invalid catalogue: {e}");
                Err(e.into())
            }
        }
    }

    /// Validate checkpoint files
    fn validate_checkpoints(&self, state_dir: &Path) -> Result<(), CliError> {
        if !state_dir.exists() {
            println!("No crawl state found at {}", state_dir.display());
            return Ok(());
        }

        if !state_dir.is_dir() {
            return Err(CliError::InvalidArgument(format!(
                "{} is not a directory",
                state_dir.display()
            )));
        }

        let files = FileCheckpointStore::new(state_dir)?.checkpoint_files()?;
        if files.is_empty() {
            println!("State directory exists but contains no checkpoint files");
            return Ok(());
        }

        println!("Found {} checkpoint file(s)", files.len());

        let mut valid_count = 0;
        let mut invalid_count = 0;

        for path in files {
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            match FileCheckpointStore::read_file(&path) {
                Ok(checkpoint) => {
                    println!(
                        "  - {} ({}, page {})",
                        filename,
                        checkpoint.status(),
                        checkpoint.last_page_scraped()
                    );
                    valid_count += 1;
                }
                Err(e) => {
                    println!("  - {filename} (invalid: {e})");
                    invalid_count += 1;
                }
            }
        }

        println!("\nSummary:");
        println!("  Valid files: {valid_count}");
        if invalid_count > 0 {
            println!("  Invalid files: {invalid_count}");
            return Err(CliError::InvalidArgument(format!(
                "Found {invalid_count} invalid checkpoint file(s)"
            )));
        }

        Ok(())
    }
}
