//! Batch runner: drives the classification pipeline over a corpus with
//! checkpointed, resume-safe execution.
//!
//! Records are dispatched in ascending entry order. A bounded worker pool
//! may process independent records concurrently, but a record is not
//! dispatched until every record in its look-back window is finalized: the
//! sliding-window ordering barrier that keeps narration resolution reading
//! only finalized predecessors. The checkpoint watermark advances only over
//! a contiguous prefix of finalized records, so a crash never causes a
//! record to be skipped on resume.
//!
//! Cancellation is cooperative: no new records are dispatched, in-flight
//! judge calls finish on their own deadline, and the checkpoint is flushed
//! before exit.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

use toponym_core::{
    defaults, CheckpointState, Corpus, Error, FailedRecordRetryPolicy, FailureReason, Label,
    PipelineConfig, Record, Result, RunSummary,
};
use toponym_store::{CheckpointStore, RecordStore};

use crate::pipeline::{ClassificationPipeline, ProcessOutcome};

/// Event emitted by the batch runner.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    /// A run started (fresh or resumed).
    RunStarted { run_id: Uuid, resume_index: u64 },
    /// A record reached CLASSIFIED.
    RecordClassified { record_id: String, label: Label },
    /// A record reached FAILED.
    RecordFailed {
        record_id: String,
        reason: FailureReason,
    },
    /// The checkpoint was persisted.
    CheckpointPersisted {
        last_completed_entry_index: Option<u64>,
    },
    /// The run stopped before the end of the corpus.
    RunCancelled { run_id: Uuid },
    /// The run reached the final entry with zero pending records.
    RunCompleted { run_id: Uuid },
}

/// Handle for controlling a running batch.
pub struct RunnerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<RunnerEvent>,
}

impl RunnerHandle {
    /// Request cooperative shutdown.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("runner already stopped".into()))
    }

    /// Get a receiver for runner events.
    pub fn events(&self) -> broadcast::Receiver<RunnerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Drives the pipeline over the full corpus with checkpointing and resume.
pub struct BatchRunner {
    pipeline: Arc<ClassificationPipeline>,
    store: Arc<RecordStore>,
    checkpoints: CheckpointStore,
    config: PipelineConfig,
    event_tx: broadcast::Sender<RunnerEvent>,
    // Held so the shutdown channel stays open even with no outstanding
    // handle.
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl BatchRunner {
    pub fn new(
        pipeline: Arc<ClassificationPipeline>,
        store: Arc<RecordStore>,
        checkpoints: CheckpointStore,
        config: PipelineConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Self {
            pipeline,
            store,
            checkpoints,
            config,
            event_tx,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Obtain a control handle. Must be taken before [`run`](Self::run).
    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            shutdown_tx: self.shutdown_tx.clone(),
            event_rx: self.event_tx.subscribe(),
        }
    }

    fn emit(&self, event: RunnerEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Run the batch over `corpus`, resuming from any persisted checkpoint.
    pub async fn run(mut self, corpus: &Corpus) -> Result<RunSummary> {
        self.config.validate()?;
        let records = corpus.records();
        self.store.load(records).await?;

        let mut state = match self.checkpoints.load().await? {
            Some(state) => state,
            None => CheckpointState::new(Uuid::new_v4()),
        };
        let resume_index = state.resume_index();
        info!(
            run_id = %state.run_id,
            resume_index,
            record_count = records.len(),
            "Batch run starting"
        );
        self.emit(RunnerEvent::RunStarted {
            run_id: state.run_id,
            resume_index,
        });

        // Prior-run failures: reset for one more attempt under RETRY_ONCE.
        // The store is authoritative here, not the checkpoint's failed set:
        // a run that ends with failures still completes and archives its
        // checkpoint. Reset records get exactly one attempt this run, since
        // their next outcome is terminal again.
        if self.config.failed_record_retry_policy == FailedRecordRetryPolicy::RetryOnce {
            for failed in self.store.list_failed().await {
                info!(record_id = %failed.id, "Retrying record failed in prior run");
                self.store.reset(&failed.id).await?;
            }
        }

        // Work list and finalization map. Terminal records (from a prior
        // run) are skipped; everything else is processed in entry order.
        let mut terminal: Vec<bool> = Vec::with_capacity(records.len());
        let mut work: VecDeque<usize> = VecDeque::new();
        let mut skipped = 0usize;
        for (pos, record) in records.iter().enumerate() {
            let is_terminal = self.store.get(&record.id).await?.status.is_terminal();
            terminal.push(is_terminal);
            if is_terminal {
                skipped += 1;
            } else {
                work.push_back(pos);
            }
        }
        let mut frontier = terminal.iter().take_while(|t| **t).count();

        let window_size = self.config.lookback_window_size;
        let parallelism = self.config.parallelism;
        let persist_every = Duration::from_secs_f64(self.config.checkpoint_interval_seconds);
        let mut records_since_persist = 0usize;
        let mut last_persist = Instant::now();
        let mut cancelled = false;
        let mut fatal: Option<Error> = None;

        let mut join_set: JoinSet<(usize, Result<ProcessOutcome>)> = JoinSet::new();

        loop {
            // Dispatch in entry order, bounded by the pool size and the
            // sliding-window barrier.
            while !cancelled && fatal.is_none() && join_set.len() < parallelism {
                let Some(&pos) = work.front() else { break };
                let start = pos.saturating_sub(window_size);
                if !terminal[start..pos].iter().all(|t| *t) {
                    break;
                }
                work.pop_front();
                let record = records[pos].clone();
                let window: Vec<Record> = records[start..pos].to_vec();
                let pipeline = Arc::clone(&self.pipeline);
                join_set.spawn(async move { (pos, pipeline.process(&record, &window).await) });
            }

            if join_set.is_empty() {
                if cancelled || fatal.is_some() || work.is_empty() {
                    break;
                }
                fatal = Some(Error::Internal(
                    "ordering barrier stalled with no records in flight".into(),
                ));
                break;
            }

            tokio::select! {
                _ = self.shutdown_rx.recv(), if !cancelled => {
                    info!(run_id = %state.run_id, "Cancellation requested; draining in-flight records");
                    cancelled = true;
                }
                joined = join_set.join_next() => {
                    let Some(joined) = joined else { continue };
                    let (pos, result) = match joined {
                        Ok(completed) => completed,
                        Err(e) => {
                            fatal = Some(Error::Internal(format!("record task failed: {e}")));
                            continue;
                        }
                    };
                    let record = &records[pos];
                    match result {
                        Ok(ProcessOutcome::Classified(classification)) => {
                            terminal[pos] = true;
                            state.failed_record_ids.remove(&record.id);
                            self.emit(RunnerEvent::RecordClassified {
                                record_id: record.id.clone(),
                                label: classification.label,
                            });
                        }
                        Ok(ProcessOutcome::Failed(reason)) => {
                            terminal[pos] = true;
                            state.failed_record_ids.insert(record.id.clone());
                            self.emit(RunnerEvent::RecordFailed {
                                record_id: record.id.clone(),
                                reason,
                            });
                        }
                        Err(e) => {
                            // Anything surfacing here is a store or
                            // checkpoint-level problem, not a per-record
                            // classification failure.
                            error!(record_id = %record.id, error = %e, "Fatal pipeline error");
                            fatal = Some(e);
                            continue;
                        }
                    }

                    while frontier < terminal.len() && terminal[frontier] {
                        frontier += 1;
                    }
                    if frontier > 0 {
                        state.complete(records[frontier - 1].entry_index);
                    }

                    records_since_persist += 1;
                    if records_since_persist >= self.config.checkpoint_interval_records
                        || last_persist.elapsed() >= persist_every
                    {
                        if let Err(e) = self.checkpoints.persist(&state).await {
                            fatal = Some(e);
                            continue;
                        }
                        self.emit(RunnerEvent::CheckpointPersisted {
                            last_completed_entry_index: state.last_completed_entry_index,
                        });
                        records_since_persist = 0;
                        last_persist = Instant::now();
                    }
                }
            }
        }

        // Always leave a consistent, resumable checkpoint behind, unless
        // the checkpoint itself is what failed.
        match &fatal {
            Some(Error::CheckpointWrite(_)) => {}
            _ => {
                self.checkpoints.persist(&state).await?;
                self.emit(RunnerEvent::CheckpointPersisted {
                    last_completed_entry_index: state.last_completed_entry_index,
                });
            }
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        let complete = !cancelled && frontier == records.len();
        if complete {
            self.checkpoints.archive(state.run_id).await?;
            info!(run_id = %state.run_id, "Batch run complete");
            self.emit(RunnerEvent::RunCompleted { run_id: state.run_id });
        } else {
            info!(run_id = %state.run_id, "Batch run stopped before completion");
            self.emit(RunnerEvent::RunCancelled { run_id: state.run_id });
        }

        self.summarize(records.len(), skipped).await
    }

    /// Build the run summary from terminal store state.
    async fn summarize(&self, total: usize, skipped: usize) -> Result<RunSummary> {
        let mut summary = RunSummary {
            total,
            skipped,
            ..Default::default()
        };
        for label in [Label::Strong, Label::Weak, Label::None] {
            let count = self.store.list_by_label(label).await.len();
            match label {
                Label::Strong => summary.strong = count,
                Label::Weak => summary.weak = count,
                Label::None => summary.none = count,
            }
        }
        for record in self.store.list_failed().await {
            if let Some(reason) = record.failure_reason {
                summary.count_failure(reason);
            }
        }
        info!(
            strong = summary.strong,
            weak = summary.weak,
            none = summary.none,
            failed = summary.failed(),
            skipped = summary.skipped,
            "Run summary"
        );
        Ok(summary)
    }
}
