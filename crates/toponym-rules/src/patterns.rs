//! Default rule set for the gazetteer corpus.
//!
//! Pattern inventory: causal naming markers (因/以/取 paired with 名之/為名/
//! 故名/之義) imply STRONG; explicit citation or reported-speech markers
//! (相傳/按/云/《…》) wrapping a naming clause imply WEAK, because the
//! explanation is attributed rather than stated by the author. Bare markers
//! (故名/故曰/改曰) are kept deliberately below the escalation threshold:
//! they signal naming logic but not reliably whose judgment it is, so they
//! always hand off to the judge.
//!
//! Citation patterns are listed first and declare the causal patterns they
//! shadow: a nested clause like 相傳因山名之 triggers both, and attribution
//! must win.

use toponym_core::{Label, Result};

use crate::{Pattern, RuleSet};

/// Confidence for unambiguous causal-marker patterns.
const CAUSAL_CONFIDENCE: f32 = 0.95;

/// Confidence for citation-marker patterns.
const CITED_CONFIDENCE: f32 = 0.9;

/// Confidence for looser causal constructions.
const LOOSE_CAUSAL_CONFIDENCE: f32 = 0.9;

/// Confidence for bare markers; below the default escalation threshold.
const BARE_MARKER_CONFIDENCE: f32 = 0.7;

/// Build the default rule set.
pub fn default_rules() -> Result<RuleSet> {
    RuleSet::new(vec![
        // --- WEAK: attributed naming explanations -------------------------
        Pattern::new(
            "weak-cited-causal",
            Label::Weak,
            CITED_CONFIDENCE,
            r"(?:相傳|謹按|按|云|舊說)[^。]{0,16}(?:名之|為名|故名|故曰)",
            &["相傳因山名之", "按以舊縣為名", "云故名"],
        )?
        .with_override("strong-cause-named")
        .with_override("strong-take-for-name")
        .with_override("strong-thus-named"),
        Pattern::new(
            "weak-book-citation",
            Label::Weak,
            CITED_CONFIDENCE,
            r"《[^》]{1,16}》[^。]{0,16}(?:名之|為名|故名|故曰)",
            &["《郡國志》因水名之", "《志》謂因洛水為名"],
        )?
        .with_override("strong-cause-named")
        .with_override("strong-cause-for-name"),
        // --- STRONG: direct causal naming statements ----------------------
        Pattern::new(
            "strong-cause-named",
            Label::Strong,
            CAUSAL_CONFIDENCE,
            r"因[^。]{0,12}名之",
            &["因山名之"],
        )?,
        Pattern::new(
            "strong-cause-for-name",
            Label::Strong,
            CAUSAL_CONFIDENCE,
            r"因[^。]{0,12}為名",
            &["因渠為名"],
        )?,
        Pattern::new(
            "strong-cause-thus-named",
            Label::Strong,
            CAUSAL_CONFIDENCE,
            r"因[^。]{0,12}故名",
            &["因避水患故名"],
        )?,
        Pattern::new(
            "strong-take-for-name",
            Label::Strong,
            LOOSE_CAUSAL_CONFIDENCE,
            r"以[^。]{0,12}為名",
            &["以山為名"],
        )?,
        Pattern::new(
            "strong-take-meaning",
            Label::Strong,
            LOOSE_CAUSAL_CONFIDENCE,
            r"取[^。]{0,12}之義",
            &["取安寧之義"],
        )?,
        Pattern::new(
            "strong-take-named",
            Label::Strong,
            LOOSE_CAUSAL_CONFIDENCE,
            r"取[^。]{0,12}名之",
            &["取嘉禾名之"],
        )?,
        // --- STRONG but ambiguous: bare markers, always escalated ---------
        Pattern::new(
            "strong-renamed",
            Label::Strong,
            BARE_MARKER_CONFIDENCE,
            r"改曰",
            &["改曰新安"],
        )?,
        Pattern::new(
            "strong-thus-named",
            Label::Strong,
            BARE_MARKER_CONFIDENCE,
            r"故名",
            &["故名"],
        )?,
        Pattern::new(
            "strong-thus-called",
            Label::Strong,
            BARE_MARKER_CONFIDENCE,
            r"故曰",
            &["故曰"],
        )?,
    ])
}
