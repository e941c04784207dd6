//! CLI error types and conversions

use crate::collection::CatalogError;
use crate::downloader::CrawlError;
use crate::fetcher::listing_parser::ParserError;
use crate::fetcher::FetchError;
use crate::output::OutputError;
use crate::resume::ResumeError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Crawl error
    #[error("crawl error: {0}")]
    CrawlError(#[from] CrawlError),

    /// Fetch layer error
    #[error("fetch error: {0}")]
    FetchError(#[from] FetchError),

    /// Resume state error
    #[error("resume error: {0}")]
    ResumeError(#[from] ResumeError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Catalogue error
    #[error("catalogue error: {0}")]
    CatalogError(#[from] CatalogError),

    /// Listing parser setup error
    #[error("parser error: {0}")]
    ParserError(#[from] ParserError),

    /// Report serialization error
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
