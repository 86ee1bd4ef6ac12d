//! Sender lifecycle E2E tests.
//!
//! Close semantics, strict flush mode, hook failure containment and
//! throttling delays between requests.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::Instant;

use batcher_pipeline::mock::{MockIndexClient, MockResponse, RecordingHooks};
use batcher_pipeline::{
    ActionHooks, ActionKind, BufferedSender, FailureReason, FlushSummary, PipelineError,
    TrackedAction,
};
use batcher_types::SenderConfig;
use e2e_tests::{hotels, manual_config, Hotel, TestHarness};

/// Close flushes what is queued, then rejects further work.
#[tokio::test]
async fn test_close_drains_then_rejects() {
    let harness = TestHarness::manual(MockIndexClient::accepting());

    harness.sender.upload_documents(hotels(&["a", "b"])).unwrap();
    let summary = harness.sender.close().await.unwrap();
    assert_eq!(summary.succeeded, 2);
    assert!(harness.sender.is_closed());

    let result = harness.sender.upload_documents(hotels(&["c"]));
    assert!(matches!(result, Err(PipelineError::Closed)));
    assert!(matches!(
        harness.sender.flush().await,
        Err(PipelineError::Closed)
    ));
    assert_eq!(harness.hooks.added_keys(), vec!["a", "b"]);

    // Closing twice is harmless
    assert_eq!(harness.sender.close().await.unwrap(), FlushSummary::default());
    assert_eq!(harness.client.call_count(), 1);
}

/// Close waits for an in-flight flush instead of skipping it, and every
/// action is sent exactly once.
#[tokio::test(start_paused = true)]
async fn test_close_waits_for_running_flush() {
    let client = MockIndexClient::accepting().with_latency(Duration::from_secs(10));
    let config = SenderConfig::default()
        .with_batch_size(2)
        .with_auto_flush_interval(Duration::from_secs(60));
    let harness = TestHarness::new(client, config);

    harness
        .sender
        .upload_documents(hotels(&["a", "b", "c"]))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(harness.sender.is_flushing());

    let summary = harness.sender.close().await.unwrap();
    assert!(!harness.sender.is_flushing());

    assert_eq!(summary.succeeded, 1);
    assert_eq!(harness.client.calls(), vec![vec!["a", "b"], vec!["c"]]);
    assert_eq!(harness.client.peak_concurrency(), 1);
    for key in ["a", "b", "c"] {
        assert_eq!(harness.hooks.sent_count(key), 1);
    }
    assert_eq!(harness.sender.pending_count(), 0);
}

/// Strict mode surfaces terminal failures as an error after the flush.
#[tokio::test]
async fn test_strict_flush_fails_with_aggregate_error() {
    let config = manual_config().with_strict_flush(true);
    let harness = TestHarness::new(
        MockIndexClient::scripted(vec![MockResponse::Statuses(vec![201, 400, 201])]),
        config,
    );

    harness
        .sender
        .upload_documents(hotels(&["a", "b", "c"]))
        .unwrap();

    match harness.sender.flush().await {
        Err(PipelineError::FlushFailed { failures }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].key, "b");
            assert_eq!(failures[0].try_count, 1);
        }
        other => panic!("Expected FlushFailed, got {:?}", other),
    }
    assert_eq!(harness.hooks.succeeded_keys(), vec!["a", "c"]);
}

/// Without strict mode, failures are visible only through hooks and the
/// summary.
#[tokio::test]
async fn test_lenient_flush_returns_summary() {
    let harness = TestHarness::manual(MockIndexClient::scripted(vec![MockResponse::Statuses(
        vec![400],
    )]));

    harness.sender.upload_documents(hotels(&["a"])).unwrap();
    let summary = harness.sender.flush().await.unwrap();

    assert!(summary.has_failures());
    assert_eq!(summary.failed[0].key, "a");
}

struct PanickingHooks;

impl ActionHooks<Hotel> for PanickingHooks {
    fn on_added(&self, action: &TrackedAction<Hotel>) {
        panic!("on_added failed for {}", action.key());
    }

    fn on_succeeded(&self, action: &TrackedAction<Hotel>) {
        panic!("on_succeeded failed for {}", action.key());
    }
}

/// A panicking hook never stops the pipeline.
#[tokio::test]
async fn test_panicking_hooks_are_contained() {
    let client = Arc::new(MockIndexClient::accepting());
    let sender = BufferedSender::<Hotel>::builder(client.clone())
        .config(manual_config())
        .key_extractor(|hotel: &Hotel| hotel.hotel_id.clone())
        .hooks(Arc::new(PanickingHooks))
        .build()
        .unwrap();

    sender.upload_documents(hotels(&["a", "b"])).unwrap();
    let summary = sender.close().await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(client.call_count(), 1);
}

/// Throttled responses delay the next request; a clean response resets it.
#[tokio::test(start_paused = true)]
async fn test_throttling_delays_next_request() {
    let config = SenderConfig::default()
        .with_auto_flush(false)
        .with_throttling_delay(Duration::from_secs(1), Duration::from_secs(8));
    let harness = TestHarness::new(
        MockIndexClient::scripted(vec![
            MockResponse::Transport("service unavailable".to_string()),
            MockResponse::Statuses(vec![503]),
        ]),
        config,
    );

    harness.sender.upload_documents(hotels(&["a"])).unwrap();
    let start = Instant::now();
    let summary = harness.sender.flush().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(summary.requests, 3);
    assert_eq!(summary.succeeded, 1);
    assert!(
        elapsed >= Duration::from_secs(1) && elapsed <= Duration::from_secs(4),
        "unexpected throttling delay {:?}",
        elapsed
    );

    harness.sender.upload_documents(hotels(&["b"])).unwrap();
    let start = Instant::now();
    harness.sender.flush().await.unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);
}

/// Pending actions are visible in drain order with their kinds.
#[tokio::test]
async fn test_pending_actions_snapshot() {
    let harness = TestHarness::manual(MockIndexClient::accepting());

    harness.sender.upload_documents(hotels(&["a"])).unwrap();
    harness.sender.merge_or_upload_documents(hotels(&["b"])).unwrap();
    harness.sender.delete_documents(hotels(&["c"])).unwrap();

    let pending = harness.sender.pending_actions();
    let entries: Vec<(String, ActionKind, u32)> = pending
        .iter()
        .map(|a| (a.key().to_string(), a.action().kind, a.try_count()))
        .collect();
    assert_eq!(
        entries,
        vec![
            ("a".to_string(), ActionKind::Upload, 1),
            ("b".to_string(), ActionKind::MergeOrUpload, 1),
            ("c".to_string(), ActionKind::Delete, 1),
        ]
    );
}

/// An enqueue racing with close either lands before close or is rejected
/// and reported through on_error.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_enqueue_racing_close() {
    let client = Arc::new(MockIndexClient::accepting());
    let hooks = Arc::new(RecordingHooks::new());
    let sender = BufferedSender::<Hotel>::builder(client.clone())
        .config(manual_config())
        .key_extractor(|hotel: &Hotel| hotel.hotel_id.clone())
        .hooks(hooks.clone())
        .build()
        .unwrap();

    let producer = {
        let sender = sender.clone();
        tokio::spawn(async move {
            let mut accepted = 0;
            for i in 0..200 {
                match sender.upload_documents(vec![e2e_tests::hotel(&format!("r{i}"))]) {
                    Ok(()) => accepted += 1,
                    Err(PipelineError::Closed) => break,
                    Err(e) => panic!("unexpected error: {e}"),
                }
                tokio::task::yield_now().await;
            }
            accepted
        })
    };
    tokio::task::yield_now().await;
    let summary = sender.close().await.unwrap();
    let accepted = producer.await.unwrap();

    assert_eq!(summary.succeeded, accepted);
    assert_eq!(hooks.succeeded_keys().len(), accepted);
    for (_, _, reason) in hooks.errors() {
        assert_eq!(reason, FailureReason::SenderClosed);
    }
    assert_eq!(sender.pending_count(), 0);
}
