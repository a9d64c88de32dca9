//! # toponym-pipeline
//!
//! Classification pipeline and checkpointed batch runner.
//!
//! This crate provides:
//! - Per-record orchestration of rule evaluation, narration resolution, and
//!   judge escalation
//! - Cross-entry narration resolution over a bounded look-back window
//! - A resume-safe batch runner with checkpointing, a bounded worker pool,
//!   and cooperative cancellation
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use toponym_core::{Corpus, PipelineConfig};
//! use toponym_judge::{HttpJudgeBackend, JudgeClassifier};
//! use toponym_pipeline::{BatchRunner, ClassificationPipeline, NarrationResolver};
//! use toponym_rules::default_rules;
//! use toponym_store::{CheckpointStore, FilesystemBackend, RecordStore};
//!
//! let config = PipelineConfig::from_env();
//! let backend = Arc::new(FilesystemBackend::new("./state"));
//! let store = Arc::new(RecordStore::new(backend.clone()));
//! let judge = JudgeClassifier::new(Arc::new(HttpJudgeBackend::from_env()?));
//!
//! let pipeline = Arc::new(ClassificationPipeline::new(
//!     default_rules()?,
//!     NarrationResolver::new(config.lookback_window_size),
//!     judge,
//!     store.clone(),
//!     config.escalation_threshold,
//! ));
//! let runner = BatchRunner::new(pipeline, store, CheckpointStore::new(backend), config);
//!
//! let handle = runner.handle();
//! let summary = runner.run(&corpus).await?;
//! ```

pub mod pipeline;
pub mod resolver;
pub mod runner;

// Re-export core types
pub use toponym_core::*;

pub use pipeline::{ClassificationPipeline, ProcessOutcome};
pub use resolver::NarrationResolver;
pub use runner::{BatchRunner, RunnerEvent, RunnerHandle};
