//! Error types for the toponym pipeline.

use thiserror::Error;

/// Result type alias using the toponym Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for toponym operations.
///
/// Control-flow outcomes are deliberately *not* errors: a rule engine miss
/// is `Option::None`, and a failed narration resolution is a degraded but
/// valid continuation. Only the variants below surface as `Err`.
#[derive(Error, Debug)]
pub enum Error {
    /// Two rule patterns with different labels share a trigger condition.
    /// Detected at rule-set load time; silent precedence would make runs
    /// non-reproducible.
    #[error("Rule conflict: {0}")]
    RuleConflict(String),

    /// Judge returned an evidence span that is not a verbatim substring of
    /// the supplied text. The record is marked for manual review.
    #[error("Ungrounded evidence: {0}")]
    UngroundedEvidence(String),

    /// Reasoning service unreachable after all retries were exhausted.
    #[error("Judge unavailable: {0}")]
    JudgeUnavailable(String),

    /// Checkpoint could not be persisted. Fatal to the run: proceeding
    /// without guaranteed resumability is worse than stopping.
    #[error("Checkpoint write failure: {0}")]
    CheckpointWrite(String),

    /// Duplicate or out-of-order entry index in the corpus. Fatal at load
    /// time, before any record is processed.
    #[error("Corpus inconsistency: {0}")]
    CorpusInconsistency(String),

    /// Record store operation failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Record not found in the store.
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed.
    #[error("Request error: {0}")]
    Request(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

impl Error {
    /// Whether this error aborts the whole batch run.
    ///
    /// Per-record errors are isolated and recorded on the record itself;
    /// only errors that would compromise resumability or the global
    /// ordering invariant stop the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::CheckpointWrite(_) | Error::CorpusInconsistency(_))
    }
}
