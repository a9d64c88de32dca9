//! Integration tests for the batch runner.
//!
//! This test suite validates:
//! - Runner-001: Mixed corpus reaches the right terminal states end to end
//! - Runner-002: Event broadcasting works correctly
//! - Runner-003: A rerun skips terminal records and calls the judge zero times
//! - Runner-004: Per-record failures are terminal, not fatal to the run
//! - Runner-005: RETRY_ONCE reprocesses prior failures, SKIP leaves them
//! - Runner-006: Early shutdown plus resume covers the whole corpus with
//!   each record judged exactly once
//! - Runner-007: A failed checkpoint write aborts the run instead of
//!   continuing without resumability
//!
//! ISOLATION: Every test builds its own storage backend (in-memory or a
//! tempdir) and its own mock judge, so tests never share state.

use std::sync::Arc;

use toponym_core::{
    Corpus, CorpusEntry, Error, FailedRecordRetryPolicy, PipelineConfig, RecordStatus, Result,
};
use toponym_judge::{JudgeClassifier, MockJudgeBackend};
use toponym_pipeline::{BatchRunner, ClassificationPipeline, NarrationResolver, RunnerEvent};
use toponym_rules::default_rules;
use toponym_store::{
    CheckpointStore, FilesystemBackend, MemoryBackend, RecordStore, StorageBackend,
};

const NONE_VERDICT: &str = r#"{"label": "NONE", "evidence": ""}"#;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn corpus(entries: &[(&str, &str)]) -> Corpus {
    Corpus::from_entries(
        entries
            .iter()
            .enumerate()
            .map(|(i, (name, text))| CorpusEntry::new(i as u64, *name, *text)),
    )
    .expect("valid corpus")
}

fn test_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_max_judge_retries(2)
        .with_retry_backoff_base(0.0)
        .with_checkpoint_interval(2, 3600.0)
}

/// Wire a full runner stack over `backend`, returning the store for
/// post-run assertions.
fn runner_with(
    backend: Arc<dyn StorageBackend>,
    mock: &MockJudgeBackend,
    config: PipelineConfig,
) -> (BatchRunner, Arc<RecordStore>) {
    let store = Arc::new(RecordStore::new(backend.clone()));
    let judge = JudgeClassifier::new(Arc::new(mock.clone()))
        .with_max_retries(config.max_judge_retries)
        .with_backoff_base_secs(config.retry_backoff_base);
    let pipeline = Arc::new(ClassificationPipeline::new(
        default_rules().expect("default rules load"),
        NarrationResolver::new(config.lookback_window_size),
        judge,
        store.clone(),
        config.escalation_threshold,
    ));
    let runner = BatchRunner::new(
        pipeline,
        store.clone(),
        CheckpointStore::new(backend),
        config,
    );
    (runner, store)
}

/// Backend that refuses every checkpoint write while serving record state
/// normally.
struct CheckpointlessBackend {
    inner: MemoryBackend,
}

#[async_trait::async_trait]
impl StorageBackend for CheckpointlessBackend {
    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        if key.starts_with("checkpoint/") {
            return Err(Error::Store("simulated disk failure".into()));
        }
        self.inner.write(key, data).await
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.read(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.inner.rename(from, to).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }
}

fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<RunnerEvent>) -> Vec<RunnerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Runner-001 / Runner-002: end-to-end run and event stream
// ============================================================================

#[tokio::test]
async fn test_mixed_corpus_end_to_end() {
    let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let mock = MockJudgeBackend::new().with_default_response(NONE_VERDICT);
    let (runner, store) = runner_with(backend.clone(), &mock, test_config());
    let handle = runner.handle();
    let mut events = handle.events();

    let corpus = corpus(&[
        ("穀城縣", "有穀水出焉，因穀名之"),
        ("下邑", "相傳因堯山名之"),
        ("盧氏縣", "縣東南五十里"),
    ]);
    let summary = runner.run(&corpus).await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.strong, 1);
    assert_eq!(summary.weak, 1);
    assert_eq!(summary.none, 1);
    assert_eq!(summary.failed(), 0);
    assert_eq!(summary.skipped, 0);
    // Only the record without a confident rule match reaches the judge.
    assert_eq!(mock.call_count(), 1);

    let events = drain_events(&mut events);
    assert!(matches!(events.first(), Some(RunnerEvent::RunStarted { .. })));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, RunnerEvent::RecordClassified { .. }))
            .count(),
        3
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, RunnerEvent::CheckpointPersisted { .. })));
    assert!(matches!(events.last(), Some(RunnerEvent::RunCompleted { .. })));

    // A finished run leaves no active checkpoint behind.
    assert!(CheckpointStore::new(backend).load().await.unwrap().is_none());
    let classified = store.get("rec-000000").await.unwrap();
    assert_eq!(classified.status, RecordStatus::Classified);
}

// ============================================================================
// Runner-003: idempotent rerun
// ============================================================================

#[tokio::test]
async fn test_rerun_skips_terminal_records() {
    let dir = tempfile::tempdir().unwrap();
    let entries = [
        ("穀城縣", "有穀水出焉，因穀名之"),
        ("盧氏縣", "縣東南五十里"),
        ("宜陽縣", "在洛水之北"),
    ];

    let mock = MockJudgeBackend::new().with_default_response(NONE_VERDICT);
    let backend: Arc<dyn StorageBackend> = Arc::new(FilesystemBackend::new(dir.path()));
    let (runner, _) = runner_with(backend, &mock, test_config());
    let first = runner.run(&corpus(&entries)).await.unwrap();
    assert_eq!(first.classified(), 3);

    // Fresh process over the same state directory. The mock has no
    // responses, so any judge call would fail the record.
    let rerun_mock = MockJudgeBackend::new();
    let backend: Arc<dyn StorageBackend> = Arc::new(FilesystemBackend::new(dir.path()));
    let (runner, _) = runner_with(backend, &rerun_mock, test_config());
    let second = runner.run(&corpus(&entries)).await.unwrap();

    assert_eq!(second.skipped, 3);
    assert_eq!(second.strong, 1);
    assert_eq!(second.none, 2);
    assert_eq!(second.failed(), 0);
    assert_eq!(rerun_mock.call_count(), 0);
}

// ============================================================================
// Runner-004: per-record failure is terminal, not fatal
// ============================================================================

#[tokio::test]
async fn test_ungrounded_verdict_fails_record_only() {
    let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    // Evidence is not a verbatim substring of the record text.
    let mock = MockJudgeBackend::new()
        .with_response("當塗", r#"{"label": "STRONG", "evidence": "因塗山氏國為名"}"#)
        .with_default_response(NONE_VERDICT);
    let (runner, store) = runner_with(backend, &mock, test_config());
    let mut events = runner.handle().events();

    let summary = runner
        .run(&corpus(&[
            ("當塗縣", "縣北有山"),
            ("盧氏縣", "縣東南五十里"),
        ]))
        .await
        .unwrap();

    assert_eq!(summary.ungrounded_evidence, 1);
    assert_eq!(summary.none, 1);
    let failed = store.get("rec-000000").await.unwrap();
    assert_eq!(failed.status, RecordStatus::Failed);

    // The run still finishes: failure is a terminal record state.
    let events = drain_events(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, RunnerEvent::RecordFailed { .. })));
    assert!(matches!(events.last(), Some(RunnerEvent::RunCompleted { .. })));
}

// ============================================================================
// Runner-005: failed-record retry policies
// ============================================================================

async fn run_with_unavailable_judge(dir: &std::path::Path) {
    // Every call fails with a transient error until retries are exhausted.
    let mock = MockJudgeBackend::new()
        .with_default_response(NONE_VERDICT)
        .fail_times(u32::MAX);
    let backend: Arc<dyn StorageBackend> = Arc::new(FilesystemBackend::new(dir));
    let (runner, _) = runner_with(backend, &mock, test_config());
    let summary = runner
        .run(&corpus(&[
            ("穀城縣", "有穀水出焉，因穀名之"),
            ("盧氏縣", "縣東南五十里"),
        ]))
        .await
        .unwrap();
    assert_eq!(summary.judge_unavailable, 1);
    assert_eq!(summary.strong, 1);
}

#[tokio::test]
async fn test_retry_once_reprocesses_prior_failure() {
    let dir = tempfile::tempdir().unwrap();
    run_with_unavailable_judge(dir.path()).await;

    let mock = MockJudgeBackend::new().with_default_response(NONE_VERDICT);
    let backend: Arc<dyn StorageBackend> = Arc::new(FilesystemBackend::new(dir.path()));
    let config = test_config()
        .with_failed_record_retry_policy(FailedRecordRetryPolicy::RetryOnce);
    let (runner, store) = runner_with(backend, &mock, config);
    let summary = runner
        .run(&corpus(&[
            ("穀城縣", "有穀水出焉，因穀名之"),
            ("盧氏縣", "縣東南五十里"),
        ]))
        .await
        .unwrap();

    assert_eq!(mock.call_count(), 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.none, 1);
    assert_eq!(summary.judge_unavailable, 0);
    let retried = store.get("rec-000001").await.unwrap();
    assert_eq!(retried.status, RecordStatus::Classified);
}

#[tokio::test]
async fn test_skip_policy_leaves_prior_failure() {
    let dir = tempfile::tempdir().unwrap();
    run_with_unavailable_judge(dir.path()).await;

    let mock = MockJudgeBackend::new().with_default_response(NONE_VERDICT);
    let backend: Arc<dyn StorageBackend> = Arc::new(FilesystemBackend::new(dir.path()));
    let config = test_config().with_failed_record_retry_policy(FailedRecordRetryPolicy::Skip);
    let (runner, store) = runner_with(backend, &mock, config);
    let summary = runner
        .run(&corpus(&[
            ("穀城縣", "有穀水出焉，因穀名之"),
            ("盧氏縣", "縣東南五十里"),
        ]))
        .await
        .unwrap();

    assert_eq!(mock.call_count(), 0);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.judge_unavailable, 1);
    let failed = store.get("rec-000001").await.unwrap();
    assert_eq!(failed.status, RecordStatus::Failed);
}

// ============================================================================
// Runner-007: checkpoint write failure is fatal
// ============================================================================

#[tokio::test]
async fn test_checkpoint_write_failure_aborts_run() {
    let backend: Arc<dyn StorageBackend> = Arc::new(CheckpointlessBackend {
        inner: MemoryBackend::new(),
    });
    let mock = MockJudgeBackend::new().with_default_response(NONE_VERDICT);
    let config = test_config().with_checkpoint_interval(1, 3600.0);
    let (runner, store) = runner_with(backend, &mock, config);

    let err = runner
        .run(&corpus(&[
            ("盧氏縣", "縣東南五十里"),
            ("宜陽縣", "在洛水之北"),
            ("新安縣", "周畿內地"),
        ]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CheckpointWrite(_)));

    // The first failed persist stops dispatch; later records stay pending.
    assert_eq!(mock.call_count(), 1);
    assert_eq!(
        store.get("rec-000001").await.unwrap().status,
        RecordStatus::Pending
    );
    assert_eq!(
        store.get("rec-000002").await.unwrap().status,
        RecordStatus::Pending
    );
}

// ============================================================================
// Runner-006: shutdown and resume
// ============================================================================

#[tokio::test]
async fn test_shutdown_and_resume_covers_corpus_once() {
    let dir = tempfile::tempdir().unwrap();
    let entries: Vec<(String, String)> = (0..12)
        .map(|i| (format!("縣{i}"), format!("縣東南{i}十里")))
        .collect();
    let entry_refs: Vec<(&str, &str)> = entries
        .iter()
        .map(|(n, t)| (n.as_str(), t.as_str()))
        .collect();
    let corpus = corpus(&entry_refs);

    let first_mock = MockJudgeBackend::new().with_default_response(NONE_VERDICT);
    let backend: Arc<dyn StorageBackend> = Arc::new(FilesystemBackend::new(dir.path()));
    let config = test_config().with_parallelism(2).with_checkpoint_interval(1, 3600.0);
    let (runner, _) = runner_with(backend, &first_mock, config.clone());

    // Request shutdown before the run starts: the runner drains whatever it
    // already dispatched and flushes the checkpoint.
    let handle = runner.handle();
    handle.shutdown().await.unwrap();
    let first = runner.run(&corpus).await.unwrap();

    let second_mock = MockJudgeBackend::new().with_default_response(NONE_VERDICT);
    let backend: Arc<dyn StorageBackend> = Arc::new(FilesystemBackend::new(dir.path()));
    let (runner, store) = runner_with(backend, &second_mock, config);
    let second = runner.run(&corpus).await.unwrap();

    // Both runs together cover the corpus, and no record is judged twice.
    assert_eq!(second.none, 12);
    assert_eq!(second.failed(), 0);
    assert_eq!(second.skipped, first.classified());
    assert_eq!(first_mock.call_count() + second_mock.call_count(), 12);

    for record in corpus.records() {
        let stored = store.get(&record.id).await.unwrap();
        assert_eq!(stored.status, RecordStatus::Classified);
    }
}
