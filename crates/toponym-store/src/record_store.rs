//! Durable record store.
//!
//! In-memory index over all records of the run, with write-through
//! persistence of terminal states. PENDING is a purely in-memory condition:
//! only CLASSIFIED and FAILED records are ever written to the backend, and
//! only those are visible through the read API.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use toponym_core::{
    Classification, Error, EvidenceSource, FailureReason, Label, Record, RecordStatus, Result,
};

use crate::backend::StorageBackend;

const RECORD_PREFIX: &str = "records";

fn record_key(id: &str) -> String {
    format!("{RECORD_PREFIX}/{id}.json")
}

/// Durable mapping of record identity to record state.
pub struct RecordStore {
    backend: Arc<dyn StorageBackend>,
    index: RwLock<HashMap<String, Record>>,
}

impl RecordStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Seed the store with corpus records, preferring any persisted terminal
    /// state from a prior run over the fresh PENDING record.
    pub async fn load(&self, records: &[Record]) -> Result<()> {
        let mut index = self.index.write().await;
        for record in records {
            let key = record_key(&record.id);
            let stored = if self.backend.exists(&key).await? {
                let data = self.backend.read(&key).await?;
                let persisted: Record = serde_json::from_slice(&data)?;
                if persisted.entry_index != record.entry_index {
                    return Err(Error::Store(format!(
                        "persisted record {} has entry_index {}, corpus says {}",
                        record.id, persisted.entry_index, record.entry_index
                    )));
                }
                persisted
            } else {
                record.clone()
            };
            index.insert(stored.id.clone(), stored);
        }
        debug!(record_count = index.len(), "Record store loaded");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Record> {
        self.index
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::RecordNotFound(id.to_string()))
    }

    /// Attach a classification and move the record to CLASSIFIED.
    ///
    /// Classifications are immutable: writing over a terminal record is an
    /// error, not an overwrite. Evidence spans pointing at the record's own
    /// text are verified verbatim before anything is persisted.
    pub async fn set_classification(&self, id: &str, classification: Classification) -> Result<()> {
        classification.validate()?;
        let mut index = self.index.write().await;
        let record = index
            .get_mut(id)
            .ok_or_else(|| Error::RecordNotFound(id.to_string()))?;
        if record.status.is_terminal() {
            return Err(Error::Store(format!(
                "record {id} is already {:?}; reset it before re-classifying",
                record.status
            )));
        }
        for span in &classification.evidence_spans {
            if span.source == EvidenceSource::RecordText && !span.verify_against(&record.raw_text) {
                return Err(Error::UngroundedEvidence(format!(
                    "span {:?} does not match record {id} text",
                    span.quote
                )));
            }
        }

        record.status = RecordStatus::Classified;
        record.failure_reason = None;
        record.classification = Some(classification);
        let data = serde_json::to_vec(record)?;
        self.backend.write(&record_key(id), &data).await?;
        Ok(())
    }

    /// Mark a record FAILED with the given reason.
    pub async fn mark_failed(&self, id: &str, reason: FailureReason) -> Result<()> {
        let mut index = self.index.write().await;
        let record = index
            .get_mut(id)
            .ok_or_else(|| Error::RecordNotFound(id.to_string()))?;
        if record.status == RecordStatus::Classified {
            return Err(Error::Store(format!(
                "record {id} is already CLASSIFIED; cannot mark failed"
            )));
        }
        record.status = RecordStatus::Failed;
        record.failure_reason = Some(reason);
        record.classification = None;
        let data = serde_json::to_vec(record)?;
        self.backend.write(&record_key(id), &data).await?;
        Ok(())
    }

    /// Explicitly reset a terminal record to PENDING so it can be
    /// reprocessed. Removes the persisted terminal state.
    pub async fn reset(&self, id: &str) -> Result<()> {
        let mut index = self.index.write().await;
        let record = index
            .get_mut(id)
            .ok_or_else(|| Error::RecordNotFound(id.to_string()))?;
        record.status = RecordStatus::Pending;
        record.failure_reason = None;
        record.classification = None;
        self.backend.delete(&record_key(id)).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read API (downstream consumers; terminal states only)
    // ------------------------------------------------------------------

    /// Classification for a record, if it reached CLASSIFIED.
    pub async fn get_classification(&self, id: &str) -> Result<Option<Classification>> {
        let record = self.get(id).await?;
        Ok(record.classification)
    }

    /// All CLASSIFIED records carrying `label`, in entry order.
    pub async fn list_by_label(&self, label: Label) -> Vec<Record> {
        let index = self.index.read().await;
        let mut records: Vec<Record> = index
            .values()
            .filter(|r| {
                r.status == RecordStatus::Classified
                    && r.classification.as_ref().is_some_and(|c| c.label == label)
            })
            .cloned()
            .collect();
        records.sort_by_key(|r| r.entry_index);
        records
    }

    /// All FAILED records, in entry order.
    pub async fn list_failed(&self) -> Vec<Record> {
        let index = self.index.read().await;
        let mut records: Vec<Record> = index
            .values()
            .filter(|r| r.status == RecordStatus::Failed)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.entry_index);
        records
    }
}
