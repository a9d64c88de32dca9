//! Pipeline configuration surface.
//!
//! Typed config with defaults from [`crate::defaults`], `with_*` builders,
//! and environment-variable loading (`TOPONYM_*` prefixed).

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};

/// What to do with records left FAILED by a prior run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailedRecordRetryPolicy {
    /// Reset and reprocess once; a second failure is final.
    #[default]
    RetryOnce,
    /// Leave prior failures untouched.
    Skip,
}

impl std::str::FromStr for FailedRecordRetryPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RETRY_ONCE" => Ok(Self::RetryOnce),
            "SKIP" => Ok(Self::Skip),
            other => Err(Error::Config(format!("unknown retry policy: {other}"))),
        }
    }
}

/// Configuration for a batch classification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Rule matches below this confidence are escalated to the judge.
    pub escalation_threshold: f32,
    /// Preceding entries considered for narration resolution.
    pub lookback_window_size: usize,
    /// Persist the checkpoint every K completed records.
    pub checkpoint_interval_records: usize,
    /// Persist the checkpoint every T seconds.
    pub checkpoint_interval_seconds: f64,
    /// Maximum judge attempts per record.
    pub max_judge_retries: u32,
    /// Base of the exponential retry backoff, in seconds.
    pub retry_backoff_base: f64,
    /// Bounded worker-pool size.
    pub parallelism: usize,
    pub failed_record_retry_policy: FailedRecordRetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: defaults::ESCALATION_THRESHOLD,
            lookback_window_size: defaults::LOOKBACK_WINDOW,
            checkpoint_interval_records: defaults::CHECKPOINT_INTERVAL_RECORDS,
            checkpoint_interval_seconds: defaults::CHECKPOINT_INTERVAL_SECS,
            max_judge_retries: defaults::JUDGE_MAX_RETRIES,
            retry_backoff_base: defaults::RETRY_BACKOFF_BASE_SECS,
            parallelism: defaults::PARALLELISM,
            failed_record_retry_policy: FailedRecordRetryPolicy::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TOPONYM_ESCALATION_THRESHOLD` | `0.85` | Rule-confidence floor |
    /// | `TOPONYM_LOOKBACK_WINDOW` | `8` | Narration look-back entries |
    /// | `TOPONYM_CHECKPOINT_RECORDS` | `25` | Checkpoint every K records |
    /// | `TOPONYM_CHECKPOINT_SECONDS` | `30.0` | Checkpoint every T seconds |
    /// | `TOPONYM_JUDGE_MAX_RETRIES` | `3` | Judge attempts per record |
    /// | `TOPONYM_RETRY_BACKOFF_BASE` | `0.5` | Backoff base, seconds |
    /// | `TOPONYM_PARALLELISM` | `1` | Worker-pool size |
    /// | `TOPONYM_FAILED_RETRY_POLICY` | `RETRY_ONCE` | `RETRY_ONCE` or `SKIP` |
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            escalation_threshold: env_parse("TOPONYM_ESCALATION_THRESHOLD")
                .unwrap_or(d.escalation_threshold),
            lookback_window_size: env_parse("TOPONYM_LOOKBACK_WINDOW")
                .unwrap_or(d.lookback_window_size),
            checkpoint_interval_records: env_parse("TOPONYM_CHECKPOINT_RECORDS")
                .unwrap_or(d.checkpoint_interval_records),
            checkpoint_interval_seconds: env_parse("TOPONYM_CHECKPOINT_SECONDS")
                .unwrap_or(d.checkpoint_interval_seconds),
            max_judge_retries: env_parse("TOPONYM_JUDGE_MAX_RETRIES")
                .unwrap_or(d.max_judge_retries),
            retry_backoff_base: env_parse("TOPONYM_RETRY_BACKOFF_BASE")
                .unwrap_or(d.retry_backoff_base),
            parallelism: env_parse::<usize>("TOPONYM_PARALLELISM")
                .unwrap_or(d.parallelism)
                .max(1),
            failed_record_retry_policy: env_parse("TOPONYM_FAILED_RETRY_POLICY")
                .unwrap_or(d.failed_record_retry_policy),
        }
    }

    pub fn with_escalation_threshold(mut self, threshold: f32) -> Self {
        self.escalation_threshold = threshold;
        self
    }

    pub fn with_lookback_window(mut self, size: usize) -> Self {
        self.lookback_window_size = size;
        self
    }

    pub fn with_checkpoint_interval(mut self, records: usize, seconds: f64) -> Self {
        self.checkpoint_interval_records = records;
        self.checkpoint_interval_seconds = seconds;
        self
    }

    pub fn with_max_judge_retries(mut self, retries: u32) -> Self {
        self.max_judge_retries = retries;
        self
    }

    pub fn with_retry_backoff_base(mut self, seconds: f64) -> Self {
        self.retry_backoff_base = seconds;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_failed_record_retry_policy(mut self, policy: FailedRecordRetryPolicy) -> Self {
        self.failed_record_retry_policy = policy;
        self
    }

    /// Reject configurations that cannot produce a consistent run.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.escalation_threshold) {
            return Err(Error::Config(format!(
                "escalation_threshold must be within [0, 1], got {}",
                self.escalation_threshold
            )));
        }
        if self.checkpoint_interval_records == 0 {
            return Err(Error::Config(
                "checkpoint_interval_records must be at least 1".into(),
            ));
        }
        if self.checkpoint_interval_seconds <= 0.0 {
            return Err(Error::Config(
                "checkpoint_interval_seconds must be positive".into(),
            ));
        }
        if self.max_judge_retries == 0 {
            return Err(Error::Config("max_judge_retries must be at least 1".into()));
        }
        if self.retry_backoff_base < 0.0 {
            return Err(Error::Config("retry_backoff_base must be non-negative".into()));
        }
        if self.parallelism == 0 {
            return Err(Error::Config("parallelism must be at least 1".into()));
        }
        Ok(())
    }
}
