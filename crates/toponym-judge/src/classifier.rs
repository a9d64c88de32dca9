//! Judge classifier: escalation path for records the rule engine could not
//! confidently classify.
//!
//! Wraps a [`JudgeBackend`] with bounded exponential-backoff retries and
//! grounds every returned evidence quote against the supplied text before
//! accepting the verdict. Evidence must be grounded, not generated: an
//! ungrounded quote rejects the whole verdict.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use toponym_core::{
    defaults, Error, EvidenceSource, EvidenceSpan, Label, ResolvedContext, Result,
};

use crate::backend::{is_retryable, JudgeBackend};
use crate::parse::parse_verdict;

/// Schema definition sent as the system prompt on every call.
///
/// Mirrors the annotation guideline for the corpus: STRONG is the author's
/// own causal naming statement, WEAK is an explanation attributed to another
/// source (reported speech, editorial note, or book citation), NONE is
/// everything else (position, distance, hydrology, administrative history).
const SCHEMA_PROMPT: &str = "\
You are an annotation assistant for historical toponymy research.

Decide whether the passage explains WHY the place bears its name, and at
which discourse level.

STRONG — all of the following hold:
1. The text states the naming cause explicitly (markers such as 因, 故, 以,
   取, 改曰).
2. The explanation is the author's own direct statement, not a report.
3. No citation or attribution marker governs the clause: 云, 曰, 注, 按, 謂,
   相傳, or a book title in 《》.

WEAK — a naming explanation exists, but it is attributed: reported speech
(云/曰/相傳), an editorial note (按/謹按), or a cited work (《…》), even when
causal markers appear inside the quoted material.

NONE — only location, distance, direction, hydrology, terrain, households,
or administrative history; no naming causality at all.

Return JSON only:
{
  \"label\": \"STRONG | WEAK | NONE\",
  \"evidence\": \"verbatim fragment of the given text supporting the label\",
  \"rationale\": \"one short sentence\"
}

The evidence value must be copied verbatim from the provided text. For NONE
it may be empty.";

/// Accepted, grounded judge verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeOutcome {
    pub label: Label,
    pub confidence: f32,
    pub evidence_spans: Vec<EvidenceSpan>,
    pub rationale: Option<String>,
}

/// Escalation classifier backed by an external reasoning service.
pub struct JudgeClassifier {
    backend: Arc<dyn JudgeBackend>,
    max_retries: u32,
    backoff_base_secs: f64,
    confidence: f32,
}

impl JudgeClassifier {
    pub fn new(backend: Arc<dyn JudgeBackend>) -> Self {
        Self {
            backend,
            max_retries: defaults::JUDGE_MAX_RETRIES,
            backoff_base_secs: defaults::RETRY_BACKOFF_BASE_SECS,
            confidence: defaults::JUDGE_CONFIDENCE,
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_backoff_base_secs(mut self, secs: f64) -> Self {
        self.backoff_base_secs = secs;
        self
    }

    /// Classify a record, optionally with resolved cross-entry context.
    ///
    /// Errors: [`Error::UngroundedEvidence`] for malformed or ungrounded
    /// verdicts, [`Error::JudgeUnavailable`] once retries are exhausted or
    /// the service rejects the request terminally. Neither aborts a batch.
    pub async fn classify(
        &self,
        placename: &str,
        text: &str,
        context: Option<&ResolvedContext>,
    ) -> Result<JudgeOutcome> {
        let user = build_user_prompt(placename, text, context);
        let content = self.complete_with_retries(&user).await?;
        let verdict = parse_verdict(&content)?;

        let mut spans = Vec::with_capacity(verdict.evidence.len());
        for quote in &verdict.evidence {
            let span = EvidenceSpan::locate(text, quote, EvidenceSource::RecordText).or_else(|| {
                context.and_then(|ctx| {
                    EvidenceSpan::locate(&ctx.target_text, quote, EvidenceSource::ResolvedContext)
                })
            });
            match span {
                Some(span) => spans.push(span),
                None => {
                    warn!(quote = %quote, "Judge evidence not verbatim in source");
                    return Err(Error::UngroundedEvidence(format!(
                        "evidence {quote:?} is not a verbatim substring of the supplied text"
                    )));
                }
            }
        }

        // NONE needs no spans; STRONG/WEAK without any grounded span cannot
        // satisfy the evidence invariant.
        if matches!(verdict.label, Label::Strong | Label::Weak) && spans.is_empty() {
            return Err(Error::UngroundedEvidence(format!(
                "{} verdict without evidence",
                verdict.label
            )));
        }

        debug!(label = %verdict.label, span_count = spans.len(), "Judge verdict accepted");
        Ok(JudgeOutcome {
            label: verdict.label,
            confidence: self.confidence,
            evidence_spans: spans,
            rationale: verdict.rationale,
        })
    }

    async fn complete_with_retries(&self, user: &str) -> Result<String> {
        let mut last_err: Option<Error> = None;
        for attempt in 1..=self.max_retries {
            match self.backend.complete(SCHEMA_PROMPT, user).await {
                Ok(content) => return Ok(content),
                Err(e) if is_retryable(&e) => {
                    warn!(attempt, error = %e, "Transient judge failure");
                    last_err = Some(e);
                    if attempt < self.max_retries {
                        // Cap the exponent so an arbitrarily large retry
                        // budget cannot overflow the doubling.
                        let exponent = (attempt - 1).min(32) as i32;
                        let backoff = self.backoff_base_secs * 2f64.powi(exponent);
                        tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                    }
                }
                Err(e) => {
                    return Err(Error::JudgeUnavailable(format!(
                        "terminal service error: {e}"
                    )));
                }
            }
        }
        Err(Error::JudgeUnavailable(format!(
            "retries exhausted after {} attempts: {}",
            self.max_retries,
            last_err.map_or_else(|| "unknown".to_string(), |e| e.to_string())
        )))
    }
}

/// Assemble the user prompt: placename, record text, and any resolved
/// cross-entry context.
fn build_user_prompt(placename: &str, text: &str, context: Option<&ResolvedContext>) -> String {
    match context {
        Some(ctx) => format!(
            "Placename: 【{placename}】\nText: {text}\n\nThe text refers back to an earlier entry.\nReferenced placename: 【{}】\nReferenced entry text: {}",
            ctx.target_placename, ctx.target_text
        ),
        None => format!("Placename: 【{placename}】\nText: {text}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockJudgeBackend;
    use toponym_core::NarrationLink;

    fn classifier(mock: &MockJudgeBackend) -> JudgeClassifier {
        JudgeClassifier::new(Arc::new(mock.clone()))
            .with_max_retries(3)
            .with_backoff_base_secs(0.0)
    }

    #[tokio::test]
    async fn test_none_without_evidence_accepted() {
        let mock =
            MockJudgeBackend::new().with_default_response(r#"{"label": "NONE", "evidence": ""}"#);
        let outcome = classifier(&mock)
            .classify("盧氏縣", "縣東南五十里", None)
            .await
            .unwrap();
        assert_eq!(outcome.label, Label::None);
        assert!(outcome.evidence_spans.is_empty());
    }

    #[tokio::test]
    async fn test_grounded_evidence_becomes_span() {
        let mock = MockJudgeBackend::new()
            .with_default_response(r#"{"label": "WEAK", "evidence": "相傳因山名", "rationale": "attributed"}"#);
        let text = "漢置。相傳因山名。";
        let outcome = classifier(&mock).classify("穀城", text, None).await.unwrap();
        assert_eq!(outcome.label, Label::Weak);
        assert_eq!(outcome.evidence_spans.len(), 1);
        assert!(outcome.evidence_spans[0].verify_against(text));
        assert_eq!(outcome.evidence_spans[0].source, EvidenceSource::RecordText);
    }

    #[tokio::test]
    async fn test_ungrounded_evidence_rejected() {
        let mock = MockJudgeBackend::new()
            .with_default_response(r#"{"label": "STRONG", "evidence": "因塗山氏國為名"}"#);
        let err = classifier(&mock)
            .classify("當塗", "縣北有塗山", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UngroundedEvidence(_)));
    }

    #[tokio::test]
    async fn test_evidence_grounded_in_resolved_context() {
        let ctx = ResolvedContext {
            link: NarrationLink {
                source_record_id: "rec-000005".into(),
                target_record_id: "rec-000004".into(),
                resolution_confidence: 1.0,
            },
            target_placename: "新安縣".into(),
            target_text: "秦置，有函谷關".into(),
        };
        let mock = MockJudgeBackend::new()
            .with_default_response(r#"{"label": "STRONG", "evidence": "有函谷關"}"#);
        let outcome = classifier(&mock)
            .classify("函谷", "因前縣名之", Some(&ctx))
            .await
            .unwrap();
        assert_eq!(
            outcome.evidence_spans[0].source,
            EvidenceSource::ResolvedContext
        );
        assert!(outcome.evidence_spans[0].verify_against("秦置，有函谷關"));
    }

    #[tokio::test]
    async fn test_strong_without_evidence_rejected() {
        let mock = MockJudgeBackend::new()
            .with_default_response(r#"{"label": "STRONG", "evidence": ""}"#);
        let err = classifier(&mock)
            .classify("穀城", "因穀水名之", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UngroundedEvidence(_)));
    }

    #[tokio::test]
    async fn test_transient_failures_retried() {
        let mock = MockJudgeBackend::new()
            .with_default_response(r#"{"label": "NONE", "evidence": ""}"#)
            .fail_times(2);
        let outcome = classifier(&mock)
            .classify("盧氏", "縣東南五十里", None)
            .await
            .unwrap();
        assert_eq!(outcome.label, Label::None);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_large_retry_budget_exhausts_cleanly() {
        // A retry budget well past the doubling range must still end in
        // JudgeUnavailable, never a panic.
        let mock = MockJudgeBackend::new().fail_times(u32::MAX);
        let classifier = JudgeClassifier::new(Arc::new(mock.clone()))
            .with_max_retries(40)
            .with_backoff_base_secs(0.0);
        let err = classifier
            .classify("盧氏", "縣東南五十里", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::JudgeUnavailable(_)));
        assert_eq!(mock.call_count(), 40);
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_unavailable() {
        let mock = MockJudgeBackend::new()
            .with_default_response(r#"{"label": "NONE", "evidence": ""}"#)
            .fail_times(5);
        let err = classifier(&mock)
            .classify("盧氏", "縣東南五十里", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::JudgeUnavailable(_)));
        assert_eq!(mock.call_count(), 3);
    }

    #[test]
    fn test_user_prompt_includes_context() {
        let ctx = ResolvedContext {
            link: NarrationLink {
                source_record_id: "rec-000002".into(),
                target_record_id: "rec-000001".into(),
                resolution_confidence: 0.9,
            },
            target_placename: "新安縣".into(),
            target_text: "秦置".into(),
        };
        let prompt = build_user_prompt("函谷", "因前縣名之", Some(&ctx));
        assert!(prompt.contains("新安縣"));
        assert!(prompt.contains("因前縣名之"));
    }
}
