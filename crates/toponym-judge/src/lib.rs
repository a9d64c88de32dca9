//! # toponym-judge
//!
//! Escalation path of the classification pipeline: when the rule engine
//! returns no match, or a match below the escalation threshold, the record
//! is sent to an external reasoning service together with any resolved
//! cross-entry context and the three-way schema definition.
//!
//! The service is an untrusted oracle. Every evidence quote it returns is
//! validated as a verbatim substring of the supplied text before the
//! verdict is accepted; anything ungrounded rejects the verdict and marks
//! the record for manual review.

pub mod backend;
pub mod classifier;
pub mod mock;
pub mod parse;

pub use backend::{is_retryable, HttpJudgeBackend, JudgeBackend};
pub use classifier::{JudgeClassifier, JudgeOutcome};
pub use mock::MockJudgeBackend;
pub use parse::{parse_verdict, JudgeVerdict};
