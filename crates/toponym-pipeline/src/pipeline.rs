//! Per-record classification pipeline.
//!
//! State machine:
//!
//! ```text
//! PENDING ─(rule match ≥ threshold)──────────────► CLASSIFIED[source=RULE]
//! PENDING ─(no match / below threshold)─► resolve ─► judge ─► CLASSIFIED[source=JUDGE]
//!                                                          └► FAILED
//! ```
//!
//! The decision policy never blends scores: a confident rule match is
//! accepted outright, anything else goes to the judge and the judge result
//! supersedes the rule match entirely. The superseded match is kept as
//! audit metadata on the classification.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use toponym_core::{
    Classification, DecisionSource, Error, FailureReason, OverriddenRuleMatch, Record, Result,
};
use toponym_judge::JudgeClassifier;
use toponym_rules::RuleSet;
use toponym_store::RecordStore;

use crate::resolver::NarrationResolver;

/// Terminal outcome of processing one record.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Classified(Classification),
    Failed(FailureReason),
}

/// Orchestrates RuleEngine → NarrationResolver → JudgeClassifier for one
/// record and writes the terminal state through the record store.
pub struct ClassificationPipeline {
    rules: RuleSet,
    resolver: NarrationResolver,
    judge: JudgeClassifier,
    store: Arc<RecordStore>,
    escalation_threshold: f32,
}

impl ClassificationPipeline {
    pub fn new(
        rules: RuleSet,
        resolver: NarrationResolver,
        judge: JudgeClassifier,
        store: Arc<RecordStore>,
        escalation_threshold: f32,
    ) -> Self {
        Self {
            rules,
            resolver,
            judge,
            store,
            escalation_threshold,
        }
    }

    /// Process one PENDING record against its look-back window.
    ///
    /// Writes the terminal state exactly once. Per-record failures
    /// (ungrounded evidence, judge unavailable) are recorded on the record
    /// and returned as [`ProcessOutcome::Failed`]; only store and
    /// checkpoint-level errors propagate as `Err`.
    pub async fn process(&self, record: &Record, window: &[Record]) -> Result<ProcessOutcome> {
        let rule_match = self.rules.evaluate(&record.raw_text);

        if let Some(m) = &rule_match {
            if m.confidence >= self.escalation_threshold {
                let classification = Classification {
                    label: m.label,
                    confidence: m.confidence,
                    evidence_spans: vec![m.span.clone()],
                    decision_source: DecisionSource::Rule,
                    rule_id: Some(m.rule_id.clone()),
                    rationale: None,
                    overridden_rule_match: None,
                    classified_at: Utc::now(),
                };
                self.store
                    .set_classification(&record.id, classification.clone())
                    .await?;
                debug!(
                    record_id = %record.id,
                    rule_id = %m.rule_id,
                    label = %m.label,
                    "Classified by rule"
                );
                return Ok(ProcessOutcome::Classified(classification));
            }
            debug!(
                record_id = %record.id,
                rule_id = %m.rule_id,
                confidence = m.confidence,
                "Rule match below escalation threshold"
            );
        }

        // Escalation: best-effort narration resolution, then the judge.
        let context = self.resolver.resolve(record, window);
        match self
            .judge
            .classify(&record.placename, &record.raw_text, context.as_ref())
            .await
        {
            Ok(outcome) => {
                let classification = Classification {
                    label: outcome.label,
                    confidence: outcome.confidence,
                    evidence_spans: outcome.evidence_spans,
                    decision_source: DecisionSource::Judge,
                    rule_id: None,
                    rationale: outcome.rationale,
                    overridden_rule_match: rule_match.map(|m| OverriddenRuleMatch {
                        rule_id: m.rule_id,
                        label: m.label,
                        confidence: m.confidence,
                    }),
                    classified_at: Utc::now(),
                };
                self.store
                    .set_classification(&record.id, classification.clone())
                    .await?;
                Ok(ProcessOutcome::Classified(classification))
            }
            Err(Error::UngroundedEvidence(reason)) => {
                warn!(record_id = %record.id, %reason, "Judge verdict rejected");
                self.store
                    .mark_failed(&record.id, FailureReason::UngroundedEvidence)
                    .await?;
                Ok(ProcessOutcome::Failed(FailureReason::UngroundedEvidence))
            }
            Err(Error::JudgeUnavailable(reason)) => {
                warn!(record_id = %record.id, %reason, "Judge unavailable");
                self.store
                    .mark_failed(&record.id, FailureReason::JudgeUnavailable)
                    .await?;
                Ok(ProcessOutcome::Failed(FailureReason::JudgeUnavailable))
            }
            Err(e) => Err(e),
        }
    }
}
