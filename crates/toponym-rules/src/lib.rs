//! # toponym-rules
//!
//! Deterministic, precision-first rule engine for toponymic-explanation
//! classification.
//!
//! A [`RuleSet`] is an ordered list of [`Pattern`]s; evaluation applies them
//! in list order and the first match wins. Each pattern carries the label it
//! implies, a fixed confidence reflecting how unambiguous it is, and the
//! capture group whose literal match becomes the evidence span. The engine
//! never invents text outside the source string.
//!
//! Because two patterns with different labels can match the same text (a
//! citation marker wrapping a causal clause, for instance), every pattern
//! declares probe strings and the overlaps it intentionally shadows. The
//! load-time conflict check fails on any cross-label overlap that is not
//! declared, so precedence is never silent.

pub mod patterns;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use toponym_core::{Error, EvidenceSource, EvidenceSpan, Label, Result};

pub use patterns::default_rules;

/// A single precision pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// Stable identifier, recorded on rule-sourced classifications.
    pub id: String,
    pub label: Label,
    /// Fixed confidence for any match of this pattern. Causal-marker
    /// patterns score highest; bare markers sit below the escalation
    /// threshold and always hand off to the judge.
    pub confidence: f32,
    regex: Regex,
    /// Capture group whose match becomes the evidence span (0 = full match).
    evidence_group: usize,
    /// Canonical trigger texts, used by the load-time conflict check.
    probes: Vec<String>,
    /// Pattern ids this pattern intentionally shadows when both match.
    overrides: Vec<String>,
}

impl Pattern {
    pub fn new(
        id: impl Into<String>,
        label: Label,
        confidence: f32,
        pattern: &str,
        probes: &[&str],
    ) -> Result<Self> {
        let id = id.into();
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::InvalidInput(format!(
                "pattern {id}: confidence {confidence} outside [0, 1]"
            )));
        }
        if probes.is_empty() {
            return Err(Error::InvalidInput(format!(
                "pattern {id}: at least one probe string is required"
            )));
        }
        let regex = Regex::new(pattern)
            .map_err(|e| Error::InvalidInput(format!("pattern {id}: invalid regex: {e}")))?;
        Ok(Self {
            id,
            label,
            confidence,
            regex,
            evidence_group: 0,
            probes: probes.iter().map(|p| p.to_string()).collect(),
            overrides: Vec::new(),
        })
    }

    /// Use capture group `group` as the evidence span instead of the full
    /// match.
    pub fn with_evidence_group(mut self, group: usize) -> Self {
        self.evidence_group = group;
        self
    }

    /// Declare that this pattern intentionally wins over `id` when both
    /// match the same text. Only meaningful for the earlier-listed pattern.
    pub fn with_override(mut self, id: impl Into<String>) -> Self {
        self.overrides.push(id.into());
        self
    }

    fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Result of a winning pattern match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule_id: String,
    pub label: Label,
    pub confidence: f32,
    pub span: EvidenceSpan,
}

/// A cross-label overlap detected by the load-time conflict check.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictReport {
    /// Earlier-listed pattern (the runtime winner).
    pub winner_id: String,
    /// Later-listed pattern that also matches.
    pub shadowed_id: String,
    /// Probe text that triggered both.
    pub probe: String,
}

/// Ordered rule set with first-match-wins evaluation.
#[derive(Debug, Clone)]
pub struct RuleSet {
    patterns: Vec<Pattern>,
}

impl RuleSet {
    /// Build a rule set, running the conflict check.
    ///
    /// Every probe of every pattern is evaluated against every other
    /// pattern. A cross-label double match is an error unless the
    /// earlier-listed pattern declared the later one in its overrides;
    /// undeclared precedence would make results non-reproducible.
    pub fn new(patterns: Vec<Pattern>) -> Result<Self> {
        let set = Self { patterns };
        let undeclared: Vec<ConflictReport> = set
            .conflicts()
            .into_iter()
            .filter(|c| {
                !set.patterns
                    .iter()
                    .any(|p| p.id == c.winner_id && p.overrides.contains(&c.shadowed_id))
            })
            .collect();

        if let Some(first) = undeclared.first() {
            return Err(Error::RuleConflict(format!(
                "{} undeclared cross-label overlap(s); first: {} shadows {} on probe {:?}",
                undeclared.len(),
                first.winner_id,
                first.shadowed_id,
                first.probe
            )));
        }
        Ok(set)
    }

    /// All cross-label overlaps among the patterns' probes, declared or not.
    pub fn conflicts(&self) -> Vec<ConflictReport> {
        let mut reports = Vec::new();
        for pattern in &self.patterns {
            for probe in &pattern.probes {
                let mut matching: Vec<&Pattern> = self
                    .patterns
                    .iter()
                    .filter(|p| p.matches(probe))
                    .collect();
                if matching.len() < 2 {
                    continue;
                }
                // List order decides the runtime winner.
                let winner = matching.remove(0);
                for shadowed in matching {
                    if shadowed.label != winner.label {
                        reports.push(ConflictReport {
                            winner_id: winner.id.clone(),
                            shadowed_id: shadowed.id.clone(),
                            probe: probe.clone(),
                        });
                    }
                }
            }
        }
        reports.sort_by(|a, b| (&a.winner_id, &a.shadowed_id).cmp(&(&b.winner_id, &b.shadowed_id)));
        reports.dedup_by(|a, b| a.winner_id == b.winner_id && a.shadowed_id == b.shadowed_id);
        reports
    }

    /// Evaluate `text` against the patterns in list order.
    ///
    /// Returns the first match, with the literal substring captured by the
    /// pattern's evidence group as the evidence span. Pure function: no
    /// external calls, no side effects; `None` means no pattern matched.
    pub fn evaluate(&self, text: &str) -> Option<RuleMatch> {
        for pattern in &self.patterns {
            let Some(captures) = pattern.regex.captures(text) else {
                trace!(rule_id = %pattern.id, "no match");
                continue;
            };
            let group = captures
                .get(pattern.evidence_group)
                .or_else(|| captures.get(0))?;
            return Some(RuleMatch {
                rule_id: pattern.id.clone(),
                label: pattern.label,
                confidence: pattern.confidence,
                span: EvidenceSpan {
                    start: group.start(),
                    end: group.end(),
                    quote: group.as_str().to_string(),
                    source: EvidenceSource::RecordText,
                },
            });
        }
        None
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
