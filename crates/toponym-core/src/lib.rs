//! # toponym-core
//!
//! Core types, error taxonomy, and configuration for the toponym
//! classification pipeline.
//!
//! This crate provides the foundational data structures that the other
//! toponym crates depend on: records, classifications, evidence spans,
//! narration links, checkpoint state, the error type, and the pipeline
//! configuration surface.

pub mod config;
pub mod corpus;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;

// Re-export commonly used types at crate root
pub use config::{FailedRecordRetryPolicy, PipelineConfig};
pub use corpus::{Corpus, CorpusEntry};
pub use error::{Error, Result};
pub use models::{
    CheckpointState, Classification, DecisionSource, EvidenceSource, EvidenceSpan, FailureReason,
    Label, NarrationLink, OverriddenRuleMatch, Record, RecordStatus, ResolvedContext, RunSummary,
};
