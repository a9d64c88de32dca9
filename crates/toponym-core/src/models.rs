//! Data model for toponymic-explanation classification.
//!
//! A corpus entry becomes a [`Record`]; the pipeline attaches at most one
//! [`Classification`] to it. Classifications are immutable once written;
//! re-classification requires an explicit reset, never a silent overwrite.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// Labels and statuses
// ============================================================================

/// Three-way label for naming-explanation strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    /// Direct causal naming explanation, stated by the author.
    Strong,
    /// Explanation attributed to a cited source or reported speech.
    Weak,
    /// No naming logic present.
    None,
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strong => write!(f, "STRONG"),
            Self::Weak => write!(f, "WEAK"),
            Self::None => write!(f, "NONE"),
        }
    }
}

impl std::str::FromStr for Label {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRONG" => Ok(Self::Strong),
            "WEAK" => Ok(Self::Weak),
            "NONE" => Ok(Self::None),
            other => Err(Error::InvalidInput(format!("unknown label: {other}"))),
        }
    }
}

/// Processing status of a record within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Not yet processed.
    Pending,
    /// Terminal: classification written.
    Classified,
    /// Terminal: processing failed, see [`FailureReason`].
    Failed,
}

impl RecordStatus {
    /// Terminal states are visible through the read API; PENDING never is.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Classified | Self::Failed)
    }
}

/// Why a record ended up FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// Judge returned evidence that is not verbatim in the source text.
    UngroundedEvidence,
    /// Reasoning service exhausted its retries.
    JudgeUnavailable,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UngroundedEvidence => write!(f, "UNGROUNDED_EVIDENCE"),
            Self::JudgeUnavailable => write!(f, "JUDGE_UNAVAILABLE"),
        }
    }
}

/// Which component produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Deterministic rule engine, above the escalation threshold.
    Rule,
    /// External reasoning service.
    Judge,
}

// ============================================================================
// Evidence
// ============================================================================

/// Which text an evidence span indexes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    /// The record's own raw text.
    RecordText,
    /// The resolved cross-entry context text.
    ResolvedContext,
}

/// A verbatim substring cited as support for a classification.
///
/// Offsets are byte offsets into the source text; `quote` duplicates the
/// substring so spans stay meaningful without re-reading the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSpan {
    pub start: usize,
    pub end: usize,
    pub quote: String,
    pub source: EvidenceSource,
}

impl EvidenceSpan {
    /// Build a span from a quote located in `text`, or `None` if the quote
    /// is not a verbatim substring.
    pub fn locate(text: &str, quote: &str, source: EvidenceSource) -> Option<Self> {
        let start = text.find(quote)?;
        Some(Self {
            start,
            end: start + quote.len(),
            quote: quote.to_string(),
            source,
        })
    }

    /// Check that `quote` is the exact substring of `text` at [start, end).
    pub fn verify_against(&self, text: &str) -> bool {
        text.get(self.start..self.end)
            .is_some_and(|s| s == self.quote)
    }
}

// ============================================================================
// Classification
// ============================================================================

/// A rule match retained for audit after the judge superseded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverriddenRuleMatch {
    pub rule_id: String,
    pub label: Label,
    pub confidence: f32,
}

/// Terminal classification attached to a record.
///
/// Created once per record per run; immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: Label,
    /// 0.0–1.0. Rule confidences are fixed per pattern; judge results carry
    /// the configured judge confidence.
    pub confidence: f32,
    pub evidence_spans: Vec<EvidenceSpan>,
    pub decision_source: DecisionSource,
    /// Present iff `decision_source == Rule`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Free-text rationale returned by the judge, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// Sub-threshold rule match that the judge result superseded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overridden_rule_match: Option<OverriddenRuleMatch>,
    pub classified_at: DateTime<Utc>,
}

impl Classification {
    /// Enforce the structural invariants before a classification is stored.
    ///
    /// STRONG and WEAK require at least one evidence span; `rule_id` must be
    /// present exactly when the decision came from the rule engine.
    pub fn validate(&self) -> Result<()> {
        if matches!(self.label, Label::Strong | Label::Weak) && self.evidence_spans.is_empty() {
            return Err(Error::InvalidInput(format!(
                "{} classification requires at least one evidence span",
                self.label
            )));
        }
        match self.decision_source {
            DecisionSource::Rule if self.rule_id.is_none() => Err(Error::InvalidInput(
                "rule-sourced classification missing rule_id".into(),
            )),
            DecisionSource::Judge if self.rule_id.is_some() => Err(Error::InvalidInput(
                "judge-sourced classification must not carry rule_id".into(),
            )),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Record
// ============================================================================

/// One corpus entry with its processing state.
///
/// Created at corpus load; mutated only by the classification pipeline;
/// never deleted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier derived from corpus position.
    pub id: String,
    /// Position in the corpus, used for ordering and context lookup.
    pub entry_index: u64,
    /// Declared placename supplied by the corpus loader.
    pub placename: String,
    pub raw_text: String,
    pub status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
}

impl Record {
    /// Derive the stable record id for a corpus position.
    pub fn id_for_index(entry_index: u64) -> String {
        format!("rec-{entry_index:06}")
    }

    pub fn new(entry_index: u64, placename: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: Self::id_for_index(entry_index),
            entry_index,
            placename: placename.into(),
            raw_text: raw_text.into(),
            status: RecordStatus::Pending,
            failure_reason: None,
            classification: None,
        }
    }
}

// ============================================================================
// Narration link
// ============================================================================

/// Non-owning relation from a record whose explanatory clause names a place
/// introduced by a different (preceding) record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationLink {
    pub source_record_id: String,
    pub target_record_id: String,
    /// Inversely scaled by look-back distance; 1.0 = immediately preceding.
    pub resolution_confidence: f32,
}

/// Cross-entry context produced by a successful narration resolution.
///
/// Carries the target entry's placename and text so the judge can ground
/// evidence spans against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedContext {
    pub link: NarrationLink,
    pub target_placename: String,
    pub target_text: String,
}

// ============================================================================
// Checkpoint
// ============================================================================

/// Process-wide batch progress, persisted at a bounded interval so a crash
/// loses at most one interval's worth of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub run_id: Uuid,
    /// `None` until the first record of the run completes.
    pub last_completed_entry_index: Option<u64>,
    pub failed_record_ids: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointState {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            last_completed_entry_index: None,
            failed_record_ids: BTreeSet::new(),
            updated_at: Utc::now(),
        }
    }

    /// Index the next run should resume from.
    pub fn resume_index(&self) -> u64 {
        self.last_completed_entry_index.map_or(0, |i| i + 1)
    }

    /// Record completion of `entry_index` (success or terminal failure).
    pub fn complete(&mut self, entry_index: u64) {
        let next = Some(entry_index);
        if next > self.last_completed_entry_index {
            self.last_completed_entry_index = next;
        }
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// Run summary
// ============================================================================

/// User-visible outcome of a batch run: counts per terminal state and per
/// failure reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub strong: usize,
    pub weak: usize,
    pub none: usize,
    pub ungrounded_evidence: usize,
    pub judge_unavailable: usize,
    /// Records already terminal from a prior run, not reprocessed.
    pub skipped: usize,
}

impl RunSummary {
    pub fn classified(&self) -> usize {
        self.strong + self.weak + self.none
    }

    pub fn failed(&self) -> usize {
        self.ungrounded_evidence + self.judge_unavailable
    }

    pub fn count_label(&mut self, label: Label) {
        match label {
            Label::Strong => self.strong += 1,
            Label::Weak => self.weak += 1,
            Label::None => self.none += 1,
        }
    }

    pub fn count_failure(&mut self, reason: FailureReason) {
        match reason {
            FailureReason::UngroundedEvidence => self.ungrounded_evidence += 1,
            FailureReason::JudgeUnavailable => self.judge_unavailable += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(text: &str, quote: &str) -> EvidenceSpan {
        EvidenceSpan::locate(text, quote, EvidenceSource::RecordText).unwrap()
    }

    #[test]
    fn test_label_roundtrip() {
        for label in [Label::Strong, Label::Weak, Label::None] {
            let parsed: Label = label.to_string().parse().unwrap();
            assert_eq!(parsed, label);
        }
        assert!("MAYBE".parse::<Label>().is_err());
    }

    #[test]
    fn test_label_serde_screaming() {
        assert_eq!(serde_json::to_string(&Label::Strong).unwrap(), "\"STRONG\"");
        let label: Label = serde_json::from_str("\"WEAK\"").unwrap();
        assert_eq!(label, Label::Weak);
    }

    #[test]
    fn test_evidence_span_locate_multibyte() {
        let text = "漢置。因山名之。";
        let s = span(text, "因山名之");
        assert!(s.verify_against(text));
        assert_eq!(s.quote, "因山名之");
        assert_eq!(&text[s.start..s.end], "因山名之");
    }

    #[test]
    fn test_evidence_span_locate_missing() {
        assert!(EvidenceSpan::locate("縣東南五十里", "故名", EvidenceSource::RecordText).is_none());
    }

    #[test]
    fn test_evidence_span_verify_rejects_drift() {
        let text = "因山名之";
        let mut s = span(text, "因山");
        s.start += 3; // shift off the character boundary
        assert!(!s.verify_against(text));
    }

    #[test]
    fn test_classification_requires_evidence_for_strong() {
        let c = Classification {
            label: Label::Strong,
            confidence: 0.95,
            evidence_spans: vec![],
            decision_source: DecisionSource::Rule,
            rule_id: Some("strong-causal-name".into()),
            rationale: None,
            overridden_rule_match: None,
            classified_at: Utc::now(),
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_classification_none_allows_empty_evidence() {
        let c = Classification {
            label: Label::None,
            confidence: 0.7,
            evidence_spans: vec![],
            decision_source: DecisionSource::Judge,
            rule_id: None,
            rationale: Some("positional description only".into()),
            overridden_rule_match: None,
            classified_at: Utc::now(),
        };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_classification_rule_id_consistency() {
        let text = "故名";
        let base = Classification {
            label: Label::Strong,
            confidence: 0.9,
            evidence_spans: vec![span(text, "故名")],
            decision_source: DecisionSource::Rule,
            rule_id: None,
            rationale: None,
            overridden_rule_match: None,
            classified_at: Utc::now(),
        };
        assert!(base.validate().is_err());

        let judge_with_rule_id = Classification {
            decision_source: DecisionSource::Judge,
            rule_id: Some("strong-causal-name".into()),
            ..base
        };
        assert!(judge_with_rule_id.validate().is_err());
    }

    #[test]
    fn test_record_id_derivation() {
        assert_eq!(Record::id_for_index(0), "rec-000000");
        assert_eq!(Record::id_for_index(1234), "rec-001234");
        let r = Record::new(7, "谷水", "出谷陽谷，因谷名之");
        assert_eq!(r.id, "rec-000007");
        assert_eq!(r.status, RecordStatus::Pending);
    }

    #[test]
    fn test_checkpoint_resume_index() {
        let mut cp = CheckpointState::new(Uuid::new_v4());
        assert_eq!(cp.resume_index(), 0);
        cp.complete(0);
        assert_eq!(cp.resume_index(), 1);
        cp.complete(5);
        // Out-of-order completion never moves the watermark backwards.
        cp.complete(3);
        assert_eq!(cp.resume_index(), 6);
    }

    #[test]
    fn test_run_summary_counts() {
        let mut s = RunSummary::default();
        s.count_label(Label::Strong);
        s.count_label(Label::Strong);
        s.count_label(Label::None);
        s.count_failure(FailureReason::JudgeUnavailable);
        assert_eq!(s.classified(), 3);
        assert_eq!(s.failed(), 1);
        assert_eq!(s.strong, 2);
    }
}
