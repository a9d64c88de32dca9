//! Verdict extraction from raw judge output.
//!
//! Reasoning services wrap their JSON in prose more often than not, so the
//! first JSON object is scraped out of the response before parsing. The
//! `evidence` field arrives either as a single string or as an array.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use toponym_core::{Error, Label, Result};

static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("static regex is valid"));

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EvidenceField {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    label: String,
    #[serde(default)]
    evidence: Option<EvidenceField>,
    #[serde(default)]
    rationale: Option<String>,
}

/// Parsed, not yet grounded, judge verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeVerdict {
    pub label: Label,
    /// Evidence quotes as returned by the service; empty strings dropped.
    pub evidence: Vec<String>,
    pub rationale: Option<String>,
}

/// Extract and parse the verdict from raw response content.
///
/// A response with no JSON object, unparseable JSON, or an unknown label is
/// malformed; the caller marks the record for manual review.
pub fn parse_verdict(content: &str) -> Result<JudgeVerdict> {
    let json = JSON_OBJECT
        .find(content)
        .ok_or_else(|| Error::UngroundedEvidence("no JSON object in judge response".into()))?;

    let raw: RawVerdict = serde_json::from_str(json.as_str())
        .map_err(|e| Error::UngroundedEvidence(format!("malformed judge JSON: {e}")))?;

    let label: Label = raw
        .label
        .parse()
        .map_err(|_| Error::UngroundedEvidence(format!("unknown judge label: {}", raw.label)))?;

    let evidence = match raw.evidence {
        None => Vec::new(),
        Some(EvidenceField::One(s)) => vec![s],
        Some(EvidenceField::Many(v)) => v,
    }
    .into_iter()
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .collect();

    Ok(JudgeVerdict {
        label,
        evidence,
        rationale: raw.rationale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_json() {
        let v = parse_verdict(r#"{"label": "STRONG", "evidence": "因山名之"}"#).unwrap();
        assert_eq!(v.label, Label::Strong);
        assert_eq!(v.evidence, vec!["因山名之"]);
        assert!(v.rationale.is_none());
    }

    #[test]
    fn test_parse_json_wrapped_in_prose() {
        let content = "根據分類標準，判斷如下：\n{\"label\": \"WEAK\", \"evidence\": [\"《志》云因水名之\"], \"rationale\": \"引證典籍\"}\n以上。";
        let v = parse_verdict(content).unwrap();
        assert_eq!(v.label, Label::Weak);
        assert_eq!(v.evidence.len(), 1);
        assert_eq!(v.rationale.as_deref(), Some("引證典籍"));
    }

    #[test]
    fn test_parse_none_with_empty_evidence() {
        let v = parse_verdict(r#"{"label": "NONE", "evidence": ""}"#).unwrap();
        assert_eq!(v.label, Label::None);
        assert!(v.evidence.is_empty());
    }

    #[test]
    fn test_parse_missing_evidence_field() {
        let v = parse_verdict(r#"{"label": "NONE"}"#).unwrap();
        assert!(v.evidence.is_empty());
    }

    #[test]
    fn test_parse_no_json_is_malformed() {
        let err = parse_verdict("the text explains the name").unwrap_err();
        assert!(matches!(err, Error::UngroundedEvidence(_)));
    }

    #[test]
    fn test_parse_unknown_label_is_malformed() {
        let err = parse_verdict(r#"{"label": "MAYBE", "evidence": ""}"#).unwrap_err();
        assert!(matches!(err, Error::UngroundedEvidence(_)));
    }
}
