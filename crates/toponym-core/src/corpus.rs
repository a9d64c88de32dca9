//! Corpus interface boundary.
//!
//! Ingestion and parsing of source formats live outside the pipeline; the
//! loader hands us an ordered sequence of `(entry_index, raw_text,
//! declared_placename)` tuples. This module validates that sequence: a
//! duplicate or out-of-order entry index is fatal *before* any record is
//! processed, because both the checkpoint watermark and the narration
//! look-back window depend on a stable global order.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Record;

/// One tuple as supplied by the corpus loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub entry_index: u64,
    pub raw_text: String,
    pub declared_placename: String,
}

impl CorpusEntry {
    pub fn new(
        entry_index: u64,
        placename: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            entry_index,
            raw_text: raw_text.into(),
            declared_placename: placename.into(),
        }
    }
}

/// A validated, immutable corpus for one run.
#[derive(Debug, Clone)]
pub struct Corpus {
    records: Vec<Record>,
}

impl Corpus {
    /// Validate loader output and materialize records in stable order.
    pub fn from_entries(entries: impl IntoIterator<Item = CorpusEntry>) -> Result<Self> {
        let mut records: Vec<Record> = Vec::new();
        let mut last_index: Option<u64> = None;

        for entry in entries {
            match last_index {
                Some(prev) if entry.entry_index == prev => {
                    return Err(Error::CorpusInconsistency(format!(
                        "duplicate entry_index {prev}"
                    )));
                }
                Some(prev) if entry.entry_index < prev => {
                    return Err(Error::CorpusInconsistency(format!(
                        "out-of-order entry_index {} after {}",
                        entry.entry_index, prev
                    )));
                }
                _ => {}
            }
            last_index = Some(entry.entry_index);
            records.push(Record::new(
                entry.entry_index,
                entry.declared_placename,
                entry.raw_text,
            ));
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Highest entry index in the corpus, if any.
    pub fn final_entry_index(&self) -> Option<u64> {
        self.records.last().map(|r| r.entry_index)
    }
}
