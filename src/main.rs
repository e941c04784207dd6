//! Main entry point for the catalogue-crawler CLI

use catalogue_crawler::cli::{Cli, Commands};
use catalogue_crawler::metrics;
use catalogue_crawler::shutdown::ShutdownCoordinator;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
///
/// Logs go to stderr; stdout carries command output only.
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("catalogue_crawler=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    // A missing .env file is not an error
    let dotenv = dotenvy::dotenv();

    init_tracing();
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = metrics::init_metrics(addr).await {
            warn!(error = %e, "Metrics exporter not started");
        }
    }

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received - finishing current batch and saving progress...");
                shutdown.request_shutdown();
            }
        }
    });

    let result = match cli.command {
        Commands::Crawl(ref args) => args
            .execute(&cli, shutdown.clone())
            .await
            .map(|report| !report.has_failures())
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Status(ref cmd) => cmd
            .execute(&cli)
            .await
            .map(|()| true)
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Validate(ref cmd) => cmd
            .execute(&cli)
            .await
            .map(|()| true)
            .map_err(|e| anyhow::anyhow!(e)),
    };

    match result {
        Ok(true) => {}
        Ok(false) => {
            error!("Crawl finished with failed collections; re-run to retry them");
            std::process::exit(1);
        }
        Err(e) => {
            error!("Command failed: {}", e);
            std::process::exit(1);
        }
    }
}
