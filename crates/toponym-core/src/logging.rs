//! Structured logging schema and field name constants.
//!
//! All crates use these constants for consistent structured logging fields,
//! so a single run can be filtered by `run_id` and a single record traced by
//! `record_id` across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Run-fatal conditions (checkpoint write failure, corpus inconsistency) |
//! | WARN  | Per-record failures, judge retries, rejected evidence |
//! | INFO  | Run lifecycle (start, resume, checkpoint, completion) |
//! | DEBUG | Decision points (escalation, overridden rule matches, resolution) |
//! | TRACE | Per-pattern evaluation, raw judge responses |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Batch run UUID, stable across resume.
pub const RUN_ID: &str = "run_id";

/// Record identifier being operated on.
pub const RECORD_ID: &str = "record_id";

/// Corpus position of the record.
pub const ENTRY_INDEX: &str = "entry_index";

/// Component within the pipeline.
/// Values: "rules", "resolver", "judge", "pipeline", "runner", "store"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "evaluate", "resolve", "classify", "persist_checkpoint"
pub const OPERATION: &str = "op";

// ─── Decision fields ───────────────────────────────────────────────────────

/// Rule identifier that matched.
pub const RULE_ID: &str = "rule_id";

/// Classification label assigned.
pub const LABEL: &str = "label";

/// Confidence of a rule match or resolution.
pub const CONFIDENCE: &str = "confidence";

/// Why a record was marked FAILED.
pub const FAILURE_REASON: &str = "failure_reason";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Judge retry attempt number (1-based).
pub const ATTEMPT: &str = "attempt";

/// Number of records covered by a persisted checkpoint interval.
pub const RECORD_COUNT: &str = "record_count";

/// Initialize a tracing subscriber for binaries and ad hoc tools.
///
/// Respects `RUST_LOG`; defaults to `info` for the toponym crates. Safe to
/// call once per process; tests should prefer their own subscriber.
pub fn init() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,toponym=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
