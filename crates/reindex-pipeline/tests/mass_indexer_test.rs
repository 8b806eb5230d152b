//! Mass indexer runs against the in-memory store and sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use reindex_pipeline::memory::{MemoryIndexSink, MemoryRecordStore};
use reindex_pipeline::{
    IndexSink, JsonDocumentMapper, MassIndexer, ProgressListener, ProgressSnapshot, ReindexConfig,
    ReindexError, RunOutcome, TypeProgress,
};
use reindex_types::{Record, RecordId, RecordType, WriteOperation};

fn store_with(types: &[(&str, usize)]) -> Arc<MemoryRecordStore> {
    let store = MemoryRecordStore::new();
    for (ty, count) in types {
        for i in 0..*count {
            store.insert(Record::new(
                RecordType::new(*ty),
                format!("{:05}", i),
                json!({ "name": format!("{} {}", ty, i), "n": i }),
            ));
        }
    }
    Arc::new(store)
}

fn indexer(
    config: ReindexConfig,
    store: &Arc<MemoryRecordStore>,
    sink: &Arc<MemoryIndexSink>,
) -> MassIndexer {
    MassIndexer::new(
        config,
        store.clone(),
        Arc::new(JsonDocumentMapper::new()),
        sink.clone(),
    )
}

#[derive(Default)]
struct CountingListener {
    submitted: AtomicU64,
    finished: AtomicU64,
}

impl ProgressListener for CountingListener {
    fn on_operations_submitted(&self, _: &RecordType, delta: u64, _: &TypeProgress) {
        self.submitted.fetch_add(delta, Ordering::SeqCst);
    }

    fn on_finished(&self, _snapshot: &ProgressSnapshot) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_run_submits_every_record_once() {
    let store = store_with(&[("book", 100)]);
    let sink = Arc::new(MemoryIndexSink::new());
    let listener = Arc::new(CountingListener::default());
    let config = ReindexConfig::for_types(["book"])
        .with_ids_per_batch(10)
        .with_records_per_sub_batch(5)
        .with_threads_to_process(2);

    let handle = indexer(config, &store, &sink)
        .with_listener(listener.clone())
        .start()
        .unwrap();
    let summary = handle.wait().await.unwrap();

    let book = RecordType::new("book");
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(sink.submitted(), 100);
    assert_eq!(sink.document_count_of(&book), 100);
    assert_eq!(sink.submit_all_calls(), 20);
    assert_eq!(sink.flushes(), vec![vec![book.clone()]]);
    assert_eq!(sink.purged(), vec![book.clone()]);
    // Once after the purge, once at the end
    assert_eq!(sink.optimized(), vec![book.clone(), book.clone()]);
    assert_eq!(store.release_calls(), 1);

    let progress = summary.progress.get(&book).unwrap();
    assert_eq!(progress.total_estimate, 100);
    assert_eq!(progress.ids_scanned, 100);
    assert_eq!(progress.records_loaded, 100);
    assert_eq!(progress.operations_submitted, 100);
    assert_eq!(progress.batches_completed, 10);
    assert_eq!(listener.submitted.load(Ordering::SeqCst), 100);
    assert_eq!(listener.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_multiple_types_with_concurrent_scanners() {
    let store = store_with(&[("book", 37), ("author", 12), ("shelf", 0)]);
    let sink = Arc::new(MemoryIndexSink::new());
    let config = ReindexConfig::for_types(["book", "author", "shelf"])
        .with_ids_per_batch(5)
        .with_records_per_sub_batch(2)
        .with_threads_to_scan(2)
        .with_threads_to_process(3);

    let handle = indexer(config, &store, &sink).start().unwrap();
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(sink.document_count_of(&RecordType::new("book")), 37);
    assert_eq!(sink.document_count_of(&RecordType::new("author")), 12);
    assert_eq!(sink.document_count_of(&RecordType::new("shelf")), 0);
    assert_eq!(sink.flushes().len(), 1);
    assert_eq!(summary.progress.totals().operations_submitted, 49);
    assert_eq!(
        summary.progress.get(&RecordType::new("shelf")).unwrap().batches_completed,
        0
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_zero_records_completes_and_flushes() {
    let store = store_with(&[]);
    let sink = Arc::new(MemoryIndexSink::new());

    let handle = indexer(ReindexConfig::for_types(["book"]), &store, &sink)
        .start()
        .unwrap();
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(sink.submitted(), 0);
    assert_eq!(sink.flushes().len(), 1);
    assert_eq!(store.page_calls(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exact_multiple_of_page_size() {
    let store = store_with(&[("book", 30)]);
    let sink = Arc::new(MemoryIndexSink::new());
    let config = ReindexConfig::for_types(["book"]).with_ids_per_batch(10);

    let summary = indexer(config, &store, &sink)
        .start()
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(sink.document_count(), 30);
    assert_eq!(
        summary.progress.get(&RecordType::new("book")).unwrap().batches_completed,
        3
    );
    // Three full pages plus the empty one that ends the scan
    assert_eq!(store.page_calls(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_load_failure_fails_run_but_still_flushes() {
    let store = store_with(&[("book", 100)]);
    store.fail_load_on_call(3);
    let sink = Arc::new(MemoryIndexSink::new());
    let config = ReindexConfig::for_types(["book"])
        .with_ids_per_batch(10)
        .with_records_per_sub_batch(5)
        .with_threads_to_process(2);

    let handle = indexer(config, &store, &sink).start().unwrap();
    let result = handle.wait().await;

    assert!(matches!(result, Err(ReindexError::Source(_))));
    assert_eq!(sink.flushes().len(), 1);
    // Not every record made it, and a failed run is never optimized at the end
    assert!(sink.submitted() < 100);
    assert_eq!(sink.optimized().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sink_failure_is_returned_by_wait() {
    let store = store_with(&[("book", 20)]);
    let sink = Arc::new(MemoryIndexSink::new());
    sink.fail_submit_on_call(7);

    let result = indexer(ReindexConfig::for_types(["book"]), &store, &sink)
        .start()
        .unwrap()
        .wait()
        .await;

    match result {
        Err(ReindexError::Sink(msg)) => assert!(msg.contains("operation 7")),
        other => panic!("expected sink error, got {:?}", other.map(|s| s.outcome)),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_progress_counts_operations_the_sink_kept_before_failing() {
    let store = store_with(&[("book", 20)]);
    let sink = Arc::new(MemoryIndexSink::new());
    sink.fail_submit_on_call(4);
    let config = ReindexConfig::for_types(["book"])
        .with_ids_per_batch(10)
        .with_records_per_sub_batch(5)
        .with_threads_to_process(1);

    let handle = indexer(config, &store, &sink).start().unwrap();
    handle.finished().await;
    let progress = handle.progress();
    let result = handle.wait().await;

    assert!(matches!(result, Err(ReindexError::Sink(_))));
    let book = progress.get(&RecordType::new("book")).unwrap();
    assert!(sink.document_count() > 0);
    assert_eq!(book.operations_submitted, sink.document_count() as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restart_after_failure_matches_clean_run() {
    let store = store_with(&[("book", 97), ("author", 40)]);
    let config = ReindexConfig::for_types(["book", "author"])
        .with_ids_per_batch(10)
        .with_records_per_sub_batch(3)
        .with_threads_to_process(3);

    let clean = Arc::new(MemoryIndexSink::new());
    indexer(config.clone(), &store, &clean)
        .start()
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(clean.document_count(), 137);

    let restarted = Arc::new(MemoryIndexSink::new());
    store.fail_load_on_call(store.load_calls() + 5);
    let failed = indexer(config.clone(), &store, &restarted)
        .start()
        .unwrap()
        .wait()
        .await;
    assert!(matches!(failed, Err(ReindexError::Source(_))));
    assert!(restarted.document_count() < 137);

    let summary = indexer(config, &store, &restarted)
        .start()
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(restarted.documents(), clean.documents());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_mid_run_drains_and_reports_cancelled() {
    let store = store_with(&[("book", 2_000)]);
    store.set_load_delay(Duration::from_millis(10));
    let sink = Arc::new(MemoryIndexSink::new());
    let config = ReindexConfig::for_types(["book"])
        .with_ids_per_batch(10)
        .with_records_per_sub_batch(2)
        .with_threads_to_process(2);

    let handle = indexer(config, &store, &sink).start().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(handle.cancel().await);
    assert!(handle.is_finished());
    assert_eq!(handle.in_flight_batches(), 0);

    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::Cancelled);
    assert!(sink.submitted() < 2_000);
    assert_eq!(sink.flushes().len(), 1);
    // Cancelled runs skip the final optimize
    assert_eq!(sink.optimized().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_after_finish_is_noop() {
    let store = store_with(&[("book", 5)]);
    let sink = Arc::new(MemoryIndexSink::new());

    let handle = indexer(ReindexConfig::for_types(["book"]), &store, &sink)
        .start()
        .unwrap();
    assert!(handle.wait_timeout(Duration::from_secs(10)).await);

    assert!(!handle.cancel().await);
    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_gate_bounds_in_flight_batches() {
    let store = store_with(&[("book", 200)]);
    let sink = Arc::new(MemoryIndexSink::new());
    sink.pause();
    let config = ReindexConfig::for_types(["book"])
        .with_ids_per_batch(10)
        .with_threads_to_process(1)
        .with_gate_capacity(2)
        .with_purge_on_start(false);

    let handle = indexer(config, &store, &sink).start().unwrap();
    assert!(!handle.wait_timeout(Duration::from_millis(200)).await);

    assert_eq!(handle.in_flight_batches(), 2);
    // Two pages admitted, the third waits at the gate
    assert_eq!(store.page_calls(), 3);
    assert_eq!(handle.progress().get(&RecordType::new("book")).unwrap().ids_scanned, 20);

    sink.resume();
    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(sink.document_count(), 200);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_purge_keeps_existing_documents() {
    let store = store_with(&[("book", 3)]);
    let sink = Arc::new(MemoryIndexSink::new());
    sink.submit_all(vec![WriteOperation::new(
        RecordType::new("book"),
        RecordId::new("stale"),
        "",
        "{}",
    )])
    .unwrap();
    let config = ReindexConfig::for_types(["book"])
        .with_purge_on_start(false)
        .with_optimize_on_finish(false);

    indexer(config, &store, &sink)
        .start()
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert!(sink.purged().is_empty());
    assert!(sink.optimized().is_empty());
    assert_eq!(sink.document_count(), 4);
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let store = store_with(&[("book", 1)]);
    let sink = Arc::new(MemoryIndexSink::new());
    let indexer = indexer(ReindexConfig::for_types(["book"]), &store, &sink);

    let handle = indexer.start().unwrap();
    assert!(matches!(indexer.start(), Err(ReindexError::AlreadyStarted)));
    handle.wait().await.unwrap();
}

#[tokio::test]
async fn test_invalid_config_rejected_synchronously() {
    let store = store_with(&[("book", 1)]);
    let sink = Arc::new(MemoryIndexSink::new());

    let zero_batch = ReindexConfig::for_types(["book"]).with_ids_per_batch(0);
    assert!(matches!(
        indexer(zero_batch, &store, &sink).start(),
        Err(ReindexError::Config(_))
    ));

    let no_types = ReindexConfig::default();
    assert!(matches!(
        indexer(no_types, &store, &sink).start(),
        Err(ReindexError::Config(_))
    ));

    // A rejected config does not consume the indexer
    let zero_gate = ReindexConfig::for_types(["book"]).with_gate_capacity(0);
    let indexer = indexer(zero_gate, &store, &sink);
    assert!(indexer.start().is_err());
    assert_eq!(sink.flushes().len(), 0);
}

#[test]
fn test_start_outside_runtime_fails() {
    let store = store_with(&[("book", 1)]);
    let sink = Arc::new(MemoryIndexSink::new());

    let result = indexer(ReindexConfig::for_types(["book"]), &store, &sink).start();
    assert!(matches!(result, Err(ReindexError::Runtime(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_builder_registers_listener() {
    let store = store_with(&[("book", 8)]);
    let sink = Arc::new(MemoryIndexSink::new());
    let listener = Arc::new(CountingListener::default());

    let mapper = Arc::new(JsonDocumentMapper::new());
    let indexer = MassIndexer::builder(store.clone(), mapper, sink.clone())
        .record_types(["book"])
        .listener(listener.clone())
        .build();
    indexer.start().unwrap().wait().await.unwrap();

    assert_eq!(listener.submitted.load(Ordering::SeqCst), 8);
    assert_eq!(indexer.config().ids_per_batch, 100);
}
