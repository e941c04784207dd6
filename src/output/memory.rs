//! In-memory record sink

use super::{OutputError, OutputResult, PersistOutcome, RecordSink};
use crate::ListingRecord;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<String, ListingRecord>,
    links: BTreeSet<(u64, String)>,
    calls: usize,
    fail_on_call: Option<usize>,
}

/// Record sink backed by a map, used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    inner: Mutex<Inner>,
}

impl MemoryRecordSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `call`-th persist call from now (1-based)
    pub fn fail_on_call(&self, call: usize) {
        let mut inner = self.lock();
        inner.fail_on_call = Some(inner.calls + call);
    }

    /// Distinct records stored
    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Record stored under `url`
    pub fn get(&self, url: &str) -> Option<ListingRecord> {
        self.lock().records.get(url).cloned()
    }

    /// URLs linked to `collection_id`, sorted
    pub fn urls_for(&self, collection_id: u64) -> Vec<String> {
        self.lock()
            .links
            .iter()
            .filter(|(id, _)| *id == collection_id)
            .map(|(_, url)| url.clone())
            .collect()
    }

    /// Persist calls made so far, including failed ones
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RecordSink for MemoryRecordSink {
    fn persist_records(
        &self,
        records: &[ListingRecord],
        collection_id: u64,
    ) -> OutputResult<PersistOutcome> {
        let mut inner = self.lock();
        inner.calls += 1;
        if inner.fail_on_call == Some(inner.calls) {
            return Err(OutputError::IoError("injected sink failure".to_string()));
        }

        let mut outcome = PersistOutcome::default();
        for record in records {
            if inner.records.contains_key(&record.url) {
                outcome.duplicate_count += 1;
            } else {
                inner.records.insert(record.url.clone(), record.clone());
                outcome.new_count += 1;
            }
            inner.links.insert((collection_id, record.url.clone()));
        }
        Ok(outcome)
    }
}
