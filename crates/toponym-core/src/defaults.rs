//! Centralized default constants for the toponym pipeline.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers.

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Confidence floor below which a rule match is treated as ambiguous and
/// escalated to the judge. Tuned against the gazetteer corpus: causal-marker
/// patterns sit at 0.9+, looser markers at 0.6–0.8.
pub const ESCALATION_THRESHOLD: f32 = 0.85;

/// Confidence attached to accepted judge verdicts. The reasoning service
/// reports no calibrated score of its own.
pub const JUDGE_CONFIDENCE: f32 = 0.75;

// =============================================================================
// NARRATION RESOLUTION
// =============================================================================

/// Look-back window for cross-entry narration resolution. Covers the typical
/// administrative-unit grouping span of the corpus (entries for one
/// commandery and its counties).
pub const LOOKBACK_WINDOW: usize = 8;

/// Floor for distance-scaled resolution confidence.
pub const RESOLUTION_CONFIDENCE_FLOOR: f32 = 0.1;

// =============================================================================
// JUDGE SERVICE
// =============================================================================

/// Maximum attempts per judge call (first try + retries).
pub const JUDGE_MAX_RETRIES: u32 = 3;

/// Base of the exponential backoff between judge retries, in seconds.
pub const RETRY_BACKOFF_BASE_SECS: f64 = 0.5;

/// Per-request timeout for judge calls, in seconds.
pub const JUDGE_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// BATCH EXECUTION
// =============================================================================

/// Degree of parallelism for record processing. 1 = a single logical stream.
pub const PARALLELISM: usize = 1;

/// Persist the checkpoint at least every this many completed records.
pub const CHECKPOINT_INTERVAL_RECORDS: usize = 25;

/// Persist the checkpoint at least every this many seconds.
pub const CHECKPOINT_INTERVAL_SECS: f64 = 30.0;

/// Capacity of the runner event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;
