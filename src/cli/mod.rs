//! CLI command implementations

pub mod crawl;
pub mod error;
pub mod status;
pub mod validate;

pub use crawl::CrawlArgs;
pub use error::CliError;
pub use status::StatusCommand;
pub use validate::ValidateCommand;

use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default checkpoint directory
pub const DEFAULT_STATE_DIR: &str = ".crawl-state";

/// Default record store directory
pub const DEFAULT_RECORDS_DIR: &str = "records";

/// Catalogue Crawler CLI
#[derive(Parser, Debug)]
#[command(name = "catalogue-crawler")]
#[command(about = "Resumable, rate-limited crawler for paginated catalogues", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, value_enum, default_value = "human")]
    pub output_format: OutputFormat,

    /// Checkpoint directory, one JSON file per collection
    #[arg(long, global = true, env = "STATE_DIR", default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,

    /// Directory holding listings.csv and collection_links.csv
    #[arg(long, global = true, env = "RECORDS_DIR", default_value = DEFAULT_RECORDS_DIR)]
    pub records_dir: PathBuf,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl selected collections of the catalogue
    Crawl(CrawlArgs),

    /// Show checkpoint progress and stored record counts
    Status(StatusCommand),

    /// Validate checkpoint files and the catalogue
    Validate(ValidateCommand),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}
