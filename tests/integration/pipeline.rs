//! End-to-end pipeline tests: submission through broker, workers, retry,
//! rotation and cancellation, observed only through the public API.

use super::test_utils::{build_processor, shared_pool, wait_until, ScriptedProvider, Step};
use scribe::broker::{ChannelBroker, JobBroker};
use scribe::dispatch::Dispatcher;
use scribe::job::{JobKind, JobStatus};
use scribe::store::{JobStore, MemoryJobStore, SledJobStore};
use scribe::worker::{WorkerConfig, WorkerPool};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        workers: 2,
        max_deliveries: 2,
        redelivery_delay_ms: 1,
        poll_interval_ms: 10,
    }
}

#[tokio::test]
async fn submitted_job_flows_through_broker_to_completion() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let broker = Arc::new(ChannelBroker::new());
    let provider = ScriptedProvider::new(vec![Step::Text(
        "Here you go: {\"title\": \"Widgets 101\", \"sections\": 3}".into(),
    )]);
    let processor = build_processor(store.clone(), provider, shared_pool(&["key-a"]));

    let pool = WorkerPool::new(broker.clone(), processor.clone(), worker_config());
    pool.start();

    let dispatcher = Dispatcher::new(store, processor, Some(broker));
    let submitted = dispatcher
        .submit(JobKind::Generate, json!({"topic": "widgets"}), None)
        .await
        .unwrap();
    assert_eq!(submitted.status, JobStatus::Pending);

    {
        let id = submitted.id;
        let dispatcher_ref = &dispatcher;
        wait_until(move || {
            dispatcher_ref
                .status(id)
                .unwrap()
                .map(|v| v.status.is_terminal())
                .unwrap_or(false)
        })
        .await;
    }
    pool.stop().await;

    let view = dispatcher.status(submitted.id).unwrap().unwrap();
    assert_eq!(view.status, JobStatus::Completed);
    // Prose wrapping was stripped by extraction before persisting.
    assert_eq!(
        view.result,
        Some(json!({"title": "Widgets 101", "sections": 3}))
    );
    assert!(view.completed_at.is_some());
}

#[tokio::test]
async fn closed_broker_falls_back_to_inline_and_terminates_before_returning() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let broker = Arc::new(ChannelBroker::new());
    broker.close().await;

    let provider = ScriptedProvider::new(vec![Step::Text("{\"ok\": true}".into())]);
    let processor = build_processor(store.clone(), provider, shared_pool(&["key-a"]));
    let dispatcher = Dispatcher::new(store, processor, Some(broker));

    let view = dispatcher
        .submit(JobKind::Analyze, json!({}), None)
        .await
        .unwrap();

    // No worker pool exists; the returned view is already terminal.
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.result, Some(json!({"ok": true})));
}

#[tokio::test]
async fn rejected_credentials_rotate_until_one_works() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let provider = ScriptedProvider::new(vec![
        Step::Reject("revoked".into()),
        Step::Reject("leaked".into()),
        Step::Text("{\"ok\": 1}".into()),
    ]);
    let creds = shared_pool(&["key-a", "key-b", "key-c"]);
    let processor = build_processor(store.clone(), provider.clone(), creds.clone());
    let dispatcher = Dispatcher::new(store, processor, None);

    let view = dispatcher
        .submit(JobKind::Generate, json!({}), None)
        .await
        .unwrap();

    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(provider.calls(), vec!["key-a", "key-b", "key-c"]);
    assert!(creds.is_quarantined("key-a"));
    assert!(creds.is_quarantined("key-b"));
    assert!(!creds.is_quarantined("key-c"));
}

#[tokio::test]
async fn persistent_status_message_exhausts_retries_and_fails_the_job() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    // Every response is a loading notice; the job can never produce data.
    let provider = ScriptedProvider::new(vec![Step::Text("Initialization in progress".into())]);
    let processor = build_processor(store.clone(), provider.clone(), shared_pool(&["key-a"]));
    let dispatcher = Dispatcher::new(store, processor, None);

    let view = dispatcher
        .submit(JobKind::Synthesize, json!({}), None)
        .await
        .unwrap();

    assert_eq!(view.status, JobStatus::Failed);
    // The persisted reason reads as a parse failure, not as the transient
    // wording the retry loop saw.
    let reason = view.error.unwrap();
    assert!(reason.contains("could not be parsed"), "{}", reason);
    assert!(reason.contains("Initialization in progress"), "{}", reason);
    // Two attempts per credential, two candidates (shared plus fallback).
    assert_eq!(provider.call_count(), 4);
}

#[tokio::test]
async fn unparseable_response_fails_with_parse_reason_and_no_rotation() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let provider = ScriptedProvider::new(vec![Step::Text(
        "I'm sorry, I can't produce that.".into(),
    )]);
    let processor = build_processor(store.clone(), provider.clone(), shared_pool(&["key-a", "key-b"]));
    let dispatcher = Dispatcher::new(store, processor, None);

    let view = dispatcher
        .submit(JobKind::Generate, json!({}), None)
        .await
        .unwrap();

    assert_eq!(view.status, JobStatus::Failed);
    assert!(view.error.unwrap().contains("could not be parsed"));
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn rate_limits_retry_on_the_same_credential_first() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let provider = ScriptedProvider::new(vec![
        Step::RateLimited("quota".into()),
        Step::Text("{\"done\": true}".into()),
    ]);
    let processor = build_processor(store.clone(), provider.clone(), shared_pool(&["key-a"]));
    let dispatcher = Dispatcher::new(store, processor, None);

    let view = dispatcher
        .submit(JobKind::Improve, json!({}), None)
        .await
        .unwrap();

    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(provider.calls(), vec!["key-a", "key-a"]);
}

#[tokio::test]
async fn cancelled_pending_job_is_skipped_by_workers() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let broker = Arc::new(ChannelBroker::new());
    let provider = ScriptedProvider::new(vec![Step::Text("{\"ok\": 1}".into())]);
    let processor = build_processor(store.clone(), provider.clone(), shared_pool(&["key-a"]));
    let dispatcher = Dispatcher::new(store.clone(), processor.clone(), Some(broker.clone()));

    // Cancel before any worker exists, then start the pool and let it drain
    // the stale delivery.
    let submitted = dispatcher
        .submit(JobKind::Generate, json!({}), None)
        .await
        .unwrap();
    let cancelled = dispatcher.cancel(submitted.id).unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    let pool = WorkerPool::new(broker.clone(), processor, worker_config());
    pool.start();
    {
        let pool_ref = &pool;
        wait_until(move || pool_ref.stats().cancelled == 1).await;
    }
    pool.stop().await;

    // The provider was never called and the terminal state is unchanged.
    assert_eq!(provider.call_count(), 0);
    let view = dispatcher.status(submitted.id).unwrap().unwrap();
    assert_eq!(view.status, JobStatus::Cancelled);
    assert!(view.result.is_none());
}

#[tokio::test]
async fn caller_credential_is_preferred_for_that_callers_jobs() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let provider = ScriptedProvider::new(vec![Step::Text("{\"ok\": 1}".into())]);

    let caller_source = scribe::credential::StaticCallerSource::default();
    caller_source.insert("alice", "key-alice");
    let creds = Arc::new(scribe::credential::CredentialPool::new(
        Arc::new(caller_source),
        Arc::new(scribe::credential::StaticSharedSource::new(vec![
            "key-pool".into()
        ])),
        "SCRIBE_ITEST_KEY_UNSET",
        std::time::Duration::from_secs(3600),
    ));
    let processor = build_processor(store.clone(), provider.clone(), creds);
    let dispatcher = Dispatcher::new(store, processor, None);

    dispatcher
        .submit(JobKind::Generate, json!({}), Some("alice".into()))
        .await
        .unwrap();

    assert_eq!(provider.calls(), vec!["key-alice"]);
}

#[tokio::test]
async fn jobs_survive_store_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("jobs");

    let submitted_id = {
        let store: Arc<dyn JobStore> = Arc::new(SledJobStore::open(&path).unwrap());
        let provider = ScriptedProvider::new(vec![Step::Text("{\"ok\": 1}".into())]);
        let processor = build_processor(store.clone(), provider, shared_pool(&["key-a"]));
        let dispatcher = Dispatcher::new(store, processor, None);

        let view = dispatcher
            .submit(JobKind::Generate, json!({"topic": "persistence"}), None)
            .await
            .unwrap();
        assert_eq!(view.status, JobStatus::Completed);
        view.id
    };

    let reopened = SledJobStore::open(&path).unwrap();
    let job = reopened.get(submitted_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result, Some(json!({"ok": 1})));
}
