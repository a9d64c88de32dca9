//! Cross-entry narration resolution.
//!
//! Some entries explain the naming of a place introduced by a *different*,
//! typically preceding, entry ("因前縣名之", named after the aforementioned
//! county). The resolver scans a bounded look-back window of preceding
//! records for a candidate whose declared placename occurs in the referring
//! text. The nearest preceding match wins. Resolution failure is a degraded
//! but valid outcome: the record is classified on its own text alone.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use toponym_core::{defaults, NarrationLink, Record, ResolvedContext};

/// Resolves naming targets across entries, caching links for the run.
pub struct NarrationResolver {
    window_size: usize,
    cache: Mutex<HashMap<String, NarrationLink>>,
}

impl NarrationResolver {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Resolve `record` against its look-back window.
    ///
    /// `window` holds the preceding records in ascending entry order; only
    /// the trailing `window_size` entries are considered. A candidate
    /// matches when its declared placename (exact, or its suffix-stripped
    /// stem of at least two characters) occurs in the referring text.
    /// Candidates are scanned nearest-first, so ties on the referring
    /// phrase resolve to the smallest entry-index distance.
    pub fn resolve(&self, record: &Record, window: &[Record]) -> Option<ResolvedContext> {
        if let Some(link) = self
            .cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&record.id).cloned())
        {
            // Serve from cache only when the cached target is still in the
            // supplied window; otherwise rescan against what we were given.
            if let Some(target) = window.iter().find(|r| r.id == link.target_record_id) {
                return Some(ResolvedContext {
                    link,
                    target_placename: target.placename.clone(),
                    target_text: target.raw_text.clone(),
                });
            }
        }

        let start = window.len().saturating_sub(self.window_size);
        for candidate in window[start..].iter().rev() {
            if candidate.id == record.id || !Self::names_match(record, candidate) {
                continue;
            }
            let distance = record.entry_index.saturating_sub(candidate.entry_index).max(1);
            let confidence = (1.0
                - (distance - 1) as f32 / self.window_size as f32)
                .max(defaults::RESOLUTION_CONFIDENCE_FLOOR);
            let link = NarrationLink {
                source_record_id: record.id.clone(),
                target_record_id: candidate.id.clone(),
                resolution_confidence: confidence,
            };
            debug!(
                record_id = %record.id,
                target = %candidate.id,
                confidence,
                "Narration resolved"
            );
            if let Ok(mut cache) = self.cache.lock() {
                cache.insert(record.id.clone(), link.clone());
            }
            return Some(ResolvedContext {
                link,
                target_placename: candidate.placename.clone(),
                target_text: candidate.raw_text.clone(),
            });
        }
        None
    }

    /// All links resolved so far in this run.
    pub fn cached_links(&self) -> Vec<NarrationLink> {
        self.cache
            .lock()
            .map(|cache| cache.values().cloned().collect())
            .unwrap_or_default()
    }

    fn names_match(record: &Record, candidate: &Record) -> bool {
        let name = candidate.placename.as_str();
        if name.chars().count() < 2 {
            return false;
        }
        if record.raw_text.contains(name) {
            return true;
        }
        // Suffix-stripped stem: 新安縣 referenced as 新安.
        let stem: String = {
            let mut chars: Vec<char> = name.chars().collect();
            chars.pop();
            chars.into_iter().collect()
        };
        stem.chars().count() >= 2 && record.raw_text.contains(&stem)
    }
}

impl Default for NarrationResolver {
    fn default() -> Self {
        Self::new(defaults::LOOKBACK_WINDOW)
    }
}
