//! Integration tests for checkpointed pagination and resume

use crate::common::{listing_url, orchestrator, ScriptedFetcher};
use catalogue_crawler::collection::Collection;
use catalogue_crawler::downloader::{CrawlError, RunStop};
use catalogue_crawler::fetcher::tier::TierKind;
use catalogue_crawler::output::MemoryRecordSink;
use catalogue_crawler::resume::{
    CheckpointStatus, CheckpointStore, CollectionCheckpoint, MemoryCheckpointStore,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const ID: u64 = 42;

fn collection() -> Collection {
    Collection::new(ID, "Cardiology")
}

fn setup(total: u32) -> (Arc<ScriptedFetcher>, Arc<MemoryRecordSink>, Arc<MemoryCheckpointStore>) {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.set_total(ID, total);
    (
        fetcher,
        Arc::new(MemoryRecordSink::new()),
        Arc::new(MemoryCheckpointStore::new()),
    )
}

fn checkpoint_from(value: serde_json::Value) -> CollectionCheckpoint {
    serde_json::from_value(value).unwrap()
}

fn assert_pages_persisted(sink: &MemoryRecordSink, pages: std::ops::RangeInclusive<u32>) {
    for page in pages {
        assert!(
            sink.get(&listing_url(ID, page, 1)).is_some(),
            "page {page} should be persisted"
        );
    }
}

#[tokio::test]
async fn test_fresh_run_fetches_page_one_alone() {
    let (fetcher, sink, store) = setup(7);
    let summary = orchestrator(fetcher.clone(), sink.clone(), store.clone(), 3)
        .run(&collection(), None)
        .await
        .unwrap();

    assert_eq!(summary.stop, RunStop::Completed);
    assert_eq!(summary.pages_committed, 7);
    assert_eq!(summary.new_records, 14);
    // Page 1, then batches of three
    assert_eq!(fetcher.pages_requested(ID), vec![1, 2, 3, 4, 5, 6, 7]);

    let checkpoint = store.load_checkpoint(ID).unwrap().unwrap();
    assert_eq!(checkpoint.status(), CheckpointStatus::Done);
    assert_eq!(checkpoint.last_page_scraped(), 7);
    assert_eq!(checkpoint.total_pages(), Some(7));
    assert_pages_persisted(&sink, 1..=7);
}

#[tokio::test]
async fn test_ordered_batch_failure_commits_only_the_prefix() {
    let (fetcher, sink, store) = setup(10);
    store.insert(checkpoint_from(json!({
        "collection_id": ID,
        "last_page_scraped": 4,
        "total_pages": 10,
        "status": "in_progress",
        "created_at": 0,
        "updated_at": 0,
    })));
    fetcher.fail_page(ID, 6);

    let summary = orchestrator(fetcher.clone(), sink.clone(), store.clone(), 4)
        .run(&collection(), None)
        .await
        .unwrap();

    // The whole batch went out
    assert_eq!(fetcher.pages_requested(ID), vec![5, 6, 7, 8]);
    assert_eq!(
        summary.stop,
        RunStop::FetchFailed {
            page: 6,
            error: "HTTP 403 on unlocker tier".to_string()
        }
    );
    assert_eq!(summary.pages_committed, 1);

    let checkpoint = store.load_checkpoint(ID).unwrap().unwrap();
    assert_eq!(checkpoint.last_page_scraped(), 5);
    assert_eq!(checkpoint.status(), CheckpointStatus::InProgress);

    assert!(sink.get(&listing_url(ID, 5, 1)).is_some());
    for page in [6, 7, 8] {
        assert!(sink.get(&listing_url(ID, page, 1)).is_none(), "page {page} leaked");
    }
    assert_eq!(sink.calls(), 1);
}

#[tokio::test]
async fn test_failed_page_is_retried_on_next_run() {
    let (fetcher, sink, store) = setup(6);
    fetcher.fail_page(ID, 4);
    let orch = orchestrator(fetcher.clone(), sink.clone(), store.clone(), 2);

    let first = orch.run(&collection(), None).await.unwrap();
    assert!(first.stop.is_failure());
    assert_eq!(first.last_page, 3);

    fetcher.heal_page(ID, 4);
    let second = orch.run(&collection(), None).await.unwrap();
    assert_eq!(second.stop, RunStop::Completed);
    assert_eq!(second.pages_committed, 3);
    assert_eq!(second.duplicate_records, 0);
    assert_pages_persisted(&sink, 1..=6);
}

#[tokio::test]
async fn test_cap_then_uncap() {
    let (fetcher, sink, store) = setup(10);
    let orch = orchestrator(fetcher.clone(), sink.clone(), store.clone(), 5);

    let capped = orch.run(&collection(), Some(3)).await.unwrap();
    assert_eq!(capped.stop, RunStop::PageCap { max_pages: 3 });
    let checkpoint = store.load_checkpoint(ID).unwrap().unwrap();
    assert_eq!(checkpoint.status(), CheckpointStatus::InProgress);
    assert_eq!(checkpoint.last_page_scraped(), 3);
    assert_eq!(checkpoint.total_pages(), Some(10));

    let requests_before = fetcher.request_count();
    let uncapped = orch.run(&collection(), None).await.unwrap();
    assert_eq!(uncapped.stop, RunStop::Completed);
    assert_eq!(uncapped.pages_committed, 7);

    let resumed: Vec<u32> = fetcher.pages_requested(ID)[requests_before..].to_vec();
    assert_eq!(resumed, vec![4, 5, 6, 7, 8, 9, 10]);

    let checkpoint = store.load_checkpoint(ID).unwrap().unwrap();
    assert_eq!(checkpoint.status(), CheckpointStatus::Done);
    assert_eq!(checkpoint.last_page_scraped(), 10);
}

#[tokio::test]
async fn test_idempotent_resume_of_done_collection() {
    let (fetcher, sink, store) = setup(4);
    let orch = orchestrator(fetcher.clone(), sink.clone(), store.clone(), 2);
    orch.run(&collection(), None).await.unwrap();

    let requests = fetcher.request_count();
    let calls = sink.calls();
    let records = sink.record_count();
    let saved = store.load_checkpoint(ID).unwrap().unwrap();

    let again = orch.run(&collection(), None).await.unwrap();
    assert_eq!(again.stop, RunStop::AlreadyComplete);
    assert_eq!(again.pages_committed, 0);
    assert_eq!(fetcher.request_count(), requests);
    assert_eq!(sink.calls(), calls);
    assert_eq!(sink.record_count(), records);
    assert_eq!(store.load_checkpoint(ID).unwrap().unwrap(), saved);
}

#[tokio::test]
async fn test_capped_done_checkpoint_is_reopened() {
    let (fetcher, sink, store) = setup(8);
    store.insert(checkpoint_from(json!({
        "collection_id": ID,
        "last_page_scraped": 3,
        "total_pages": 8,
        "status": "done",
        "created_at": 0,
        "updated_at": 0,
    })));

    let summary = orchestrator(fetcher.clone(), sink, store.clone(), 5)
        .run(&collection(), None)
        .await
        .unwrap();

    assert_eq!(summary.stop, RunStop::Completed);
    assert_eq!(fetcher.pages_requested(ID), vec![4, 5, 6, 7, 8]);
    let checkpoint = store.load_checkpoint(ID).unwrap().unwrap();
    assert!(checkpoint.is_finished());
}

#[tokio::test]
async fn test_lost_total_is_relearned_without_advancing() {
    let (fetcher, sink, store) = setup(5);
    store.insert(checkpoint_from(json!({
        "collection_id": ID,
        "last_page_scraped": 2,
        "status": "in_progress",
        "created_at": 0,
        "updated_at": 0,
    })));

    let summary = orchestrator(fetcher.clone(), sink.clone(), store.clone(), 5)
        .run(&collection(), None)
        .await
        .unwrap();

    assert_eq!(fetcher.pages_requested(ID), vec![1, 3, 4, 5]);
    assert_eq!(summary.pages_committed, 3);
    assert!(sink.get(&listing_url(ID, 1, 1)).is_none());
    assert_eq!(
        store.load_checkpoint(ID).unwrap().unwrap().total_pages(),
        Some(5)
    );
}

#[tokio::test]
async fn test_total_pages_never_shrinks() {
    let (fetcher, sink, store) = setup(6);
    let orch = orchestrator(fetcher.clone(), sink, store.clone(), 2);
    orch.run(&collection(), Some(2)).await.unwrap();

    // The site now reports fewer pages than before
    fetcher.set_total(ID, 4);
    orch.run(&collection(), Some(3)).await.unwrap();

    let checkpoint = store.load_checkpoint(ID).unwrap().unwrap();
    assert_eq!(checkpoint.total_pages(), Some(6));
    assert_eq!(checkpoint.last_page_scraped(), 3);
    assert_eq!(checkpoint.status(), CheckpointStatus::InProgress);
}

#[tokio::test]
async fn test_total_pages_comes_from_page_one_only() {
    let (fetcher, sink, store) = setup(3);
    let orch = orchestrator(fetcher.clone(), sink, store.clone(), 2);
    orch.run(&collection(), Some(1)).await.unwrap();

    // Later pages now advertise more pages than page 1 did
    fetcher.set_total(ID, 8);
    let summary = orch.run(&collection(), None).await.unwrap();

    assert_eq!(summary.stop, RunStop::Completed);
    assert_eq!(summary.last_page, 3);
    assert_eq!(summary.total_pages, Some(3));
    assert!(!fetcher.pages_requested(ID).contains(&4));
    let checkpoint = store.load_checkpoint(ID).unwrap().unwrap();
    assert_eq!(checkpoint.total_pages(), Some(3));
    assert!(checkpoint.is_finished());
}

#[tokio::test]
async fn test_crash_between_records_and_checkpoint() {
    let (fetcher, sink, store) = setup(6);
    let orch = orchestrator(fetcher.clone(), sink.clone(), store.clone(), 3);

    // pending + page 1 + page 2 are saved; page 3's checkpoint write fails
    store.fail_after_saves(3);
    let err = orch.run(&collection(), None).await.unwrap_err();
    let CrawlError::Collection { summary, source } = err else {
        panic!("expected a collection failure");
    };
    assert!(matches!(*source, CrawlError::Resume(_)));
    assert_eq!(summary.pages_committed, 2);
    assert_eq!(summary.last_page, 2);
    assert!(matches!(summary.stop, RunStop::StoreFailed { .. }));

    let checkpoint = store.load_checkpoint(ID).unwrap().unwrap();
    assert_eq!(checkpoint.last_page_scraped(), 2);
    // Page 3's records reached the sink before the failed checkpoint write
    assert!(sink.get(&listing_url(ID, 3, 1)).is_some());
    assert!(sink.get(&listing_url(ID, 4, 1)).is_none());

    store.clear_failures();
    let resumed = orch.run(&collection(), None).await.unwrap();
    assert_eq!(resumed.stop, RunStop::Completed);
    assert_eq!(resumed.pages_committed, 4);
    // Re-delivered page 3 is absorbed by the idempotent sink
    assert_eq!(resumed.duplicate_records, 2);
    assert_eq!(resumed.new_records, 6);
    assert_eq!(sink.record_count(), 12);
    assert_pages_persisted(&sink, 1..=6);
}

#[tokio::test]
async fn test_checkpoint_monotonic_across_interrupted_runs() {
    let (fetcher, sink, store) = setup(9);
    let orch = orchestrator(fetcher.clone(), sink.clone(), store.clone(), 2);

    let mut last_seen = 0;
    for (cap, fail) in [(Some(2), None), (None, Some(5)), (Some(4), None), (None, None)] {
        if let Some(page) = fail {
            fetcher.fail_page(ID, page);
        }
        orch.run(&collection(), cap).await.unwrap();
        if let Some(page) = fail {
            fetcher.heal_page(ID, page);
        }

        let last = store.load_checkpoint(ID).unwrap().unwrap().last_page_scraped();
        assert!(last >= last_seen, "checkpoint went from {last_seen} back to {last}");
        if last > 0 {
            assert_pages_persisted(&sink, 1..=last);
        }
        last_seen = last;
    }
    assert_eq!(last_seen, 9);
}

#[tokio::test]
async fn test_sink_failure_does_not_advance_checkpoint() {
    let (fetcher, sink, store) = setup(4);
    sink.fail_on_call(2);

    let err = orchestrator(fetcher, sink.clone(), store.clone(), 2)
        .run(&collection(), None)
        .await
        .unwrap_err();
    let CrawlError::Collection { summary, source } = err else {
        panic!("expected a collection failure");
    };
    assert!(matches!(*source, CrawlError::Output(_)));
    assert_eq!(summary.pages_committed, 1);
    assert_eq!(summary.new_records, 2);
    assert!(summary.yielded_records());
    assert_eq!(
        store.load_checkpoint(ID).unwrap().unwrap().last_page_scraped(),
        1
    );
}

#[tokio::test]
async fn test_empty_collection_completes() {
    let (fetcher, sink, store) = setup(0);
    let summary = orchestrator(fetcher, sink.clone(), store.clone(), 2)
        .run(&collection(), None)
        .await
        .unwrap();

    assert_eq!(summary.stop, RunStop::Completed);
    assert!(!summary.yielded_records());
    assert_eq!(sink.record_count(), 0);
    assert!(store.load_checkpoint(ID).unwrap().unwrap().is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_gate_bounds_in_flight_fetches() {
    let fetcher = Arc::new(ScriptedFetcher::new().with_delay(Duration::from_millis(100)));
    fetcher.set_total(ID, 12);
    let summary = orchestrator(
        fetcher.clone(),
        Arc::new(MemoryRecordSink::new()),
        Arc::new(MemoryCheckpointStore::new()),
        2,
    )
    .with_batch_size(6)
    .run(&collection(), None)
    .await
    .unwrap();

    assert_eq!(summary.stop, RunStop::Completed);
    assert_eq!(fetcher.peak_in_flight(), 2);
}

#[tokio::test]
async fn test_min_tier_is_forwarded() {
    let (fetcher, sink, store) = setup(3);
    orchestrator(fetcher.clone(), sink, store, 3)
        .with_min_tier(Some(TierKind::Residential))
        .run(&collection(), None)
        .await
        .unwrap();

    let tiers = fetcher.min_tiers();
    assert_eq!(tiers.len(), 3);
    assert!(tiers.iter().all(|t| *t == Some(TierKind::Residential)));
}
