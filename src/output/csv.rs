//! CSV record store
//!
//! Two append-only files in one directory:
//! - `listings.csv`: one row per distinct listing URL
//! - `collection_links.csv`: one row per (collection, URL) pair
//!
//! Known keys are loaded on open, so appending is an idempotent upsert across
//! restarts. Every persist call flushes and fsyncs both files before returning.

use super::{OutputError, OutputResult, PersistOutcome, RecordSink};
use crate::ListingRecord;
use csv::{ReaderBuilder, Writer, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Listings file name
pub const LISTINGS_FILE: &str = "listings.csv";
/// Collection link file name
pub const LINKS_FILE: &str = "collection_links.csv";

#[derive(Debug, Serialize, Deserialize)]
struct ListingRow {
    url: String,
    name: String,
    categories: String,
    first_collection_id: u64,
    discovered_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct LinkRow {
    collection_id: u64,
    url: String,
    linked_at: i64,
}

struct Inner {
    listings: Writer<File>,
    links: Writer<File>,
    known_urls: HashSet<String>,
    known_links: HashSet<(u64, String)>,
}

/// Append-only CSV store with URL-keyed upsert
pub struct CsvRecordStore {
    dir: PathBuf,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for CsvRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvRecordStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

fn load_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> OutputResult<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| OutputError::CsvError(format!("Failed to open {}: {e}", path.display())))?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| OutputError::CsvError(format!("Failed to read {}: {e}", path.display())))
}

fn open_appender(path: &Path, header: &[&str]) -> OutputResult<Writer<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| OutputError::IoError(format!("Failed to open {}: {e}", path.display())))?;
    let is_empty = file
        .metadata()
        .map_err(|e| OutputError::IoError(e.to_string()))?
        .len()
        == 0;

    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    if is_empty {
        writer
            .write_record(header)
            .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;
        writer
            .flush()
            .map_err(|e| OutputError::FlushError(e.to_string()))?;
    }
    Ok(writer)
}

fn sync(writer: &mut Writer<File>) -> OutputResult<()> {
    writer
        .flush()
        .map_err(|e| OutputError::FlushError(e.to_string()))?;
    writer
        .get_ref()
        .sync_data()
        .map_err(|e| OutputError::FlushError(e.to_string()))
}

impl CsvRecordStore {
    /// Open (or create) a store in `dir`
    pub fn open(dir: impl AsRef<Path>) -> OutputResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;

        let listings_path = dir.join(LISTINGS_FILE);
        let links_path = dir.join(LINKS_FILE);

        let known_urls: HashSet<String> = load_rows::<ListingRow>(&listings_path)?
            .into_iter()
            .map(|row| row.url)
            .collect();
        let known_links: HashSet<(u64, String)> = load_rows::<LinkRow>(&links_path)?
            .into_iter()
            .map(|row| (row.collection_id, row.url))
            .collect();

        info!(
            path = %dir.display(),
            listings = known_urls.len(),
            links = known_links.len(),
            "CSV record store opened"
        );

        let listings = open_appender(
            &listings_path,
            &["url", "name", "categories", "first_collection_id", "discovered_at"],
        )?;
        let links = open_appender(&links_path, &["collection_id", "url", "linked_at"])?;

        Ok(Self {
            dir,
            inner: Mutex::new(Inner {
                listings,
                links,
                known_urls,
                known_links,
            }),
        })
    }

    /// Store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Distinct listings stored
    pub fn listing_count(&self) -> usize {
        self.lock().known_urls.len()
    }

    /// Distinct (collection, listing) links stored
    pub fn link_count(&self) -> usize {
        self.lock().known_links.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Row counts of a store directory without opening it for writing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoredCounts {
    /// Distinct listings
    pub listings: usize,
    /// Collection links
    pub links: usize,
}

/// Count stored rows in `dir`; missing files count as empty
pub fn stored_counts(dir: &Path) -> OutputResult<StoredCounts> {
    Ok(StoredCounts {
        listings: load_rows::<ListingRow>(&dir.join(LISTINGS_FILE))?.len(),
        links: load_rows::<LinkRow>(&dir.join(LINKS_FILE))?.len(),
    })
}

impl RecordSink for CsvRecordStore {
    fn persist_records(
        &self,
        records: &[ListingRecord],
        collection_id: u64,
    ) -> OutputResult<PersistOutcome> {
        let mut inner = self.lock();
        let now = chrono::Utc::now().timestamp_millis();

        let mut outcome = PersistOutcome::default();
        let mut new_urls: Vec<&ListingRecord> = Vec::new();
        let mut new_links: Vec<&str> = Vec::new();
        let mut page_urls: HashSet<&str> = HashSet::new();

        for record in records {
            let first_on_page = page_urls.insert(record.url.as_str());
            if first_on_page && !inner.known_urls.contains(&record.url) {
                new_urls.push(record);
                outcome.new_count += 1;
            } else {
                outcome.duplicate_count += 1;
            }
            if first_on_page && !inner.known_links.contains(&(collection_id, record.url.clone())) {
                new_links.push(record.url.as_str());
            }
        }

        for record in &new_urls {
            inner
                .listings
                .serialize(ListingRow {
                    url: record.url.clone(),
                    name: record.name.clone(),
                    categories: record.categories.clone(),
                    first_collection_id: collection_id,
                    discovered_at: now,
                })
                .map_err(|e| OutputError::CsvError(format!("Failed to write listing: {e}")))?;
        }
        sync(&mut inner.listings)?;
        // Listing keys become known once their rows are durable, even if the links fail next
        for record in new_urls {
            inner.known_urls.insert(record.url.clone());
        }

        for url in &new_links {
            inner
                .links
                .serialize(LinkRow {
                    collection_id,
                    url: url.to_string(),
                    linked_at: now,
                })
                .map_err(|e| OutputError::CsvError(format!("Failed to write link: {e}")))?;
        }
        sync(&mut inner.links)?;
        for url in new_links {
            inner.known_links.insert((collection_id, url.to_string()));
        }

        debug!(
            collection_id,
            new = outcome.new_count,
            duplicates = outcome.duplicate_count,
            "Records persisted"
        );
        Ok(outcome)
    }
}
