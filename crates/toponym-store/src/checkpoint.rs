//! Checkpoint durability.
//!
//! The checkpoint is the run's write-ahead marker: it is persisted as one
//! atomic whole-state write, and any failure to persist it stops the run:
//! continuing without guaranteed resumability would silently trade
//! correctness for progress.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use toponym_core::{CheckpointState, Error, Result};

use crate::backend::StorageBackend;

const CURRENT_KEY: &str = "checkpoint/current.json";

fn archive_key(run_id: Uuid) -> String {
    format!("checkpoint/{run_id}.done.json")
}

/// Persistence wrapper for [`CheckpointState`].
pub struct CheckpointStore {
    backend: Arc<dyn StorageBackend>,
}

impl CheckpointStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Load the checkpoint left by a prior run, if any.
    pub async fn load(&self) -> Result<Option<CheckpointState>> {
        if !self.backend.exists(CURRENT_KEY).await? {
            return Ok(None);
        }
        let data = self.backend.read(CURRENT_KEY).await?;
        let state: CheckpointState = serde_json::from_slice(&data)
            .map_err(|e| Error::Store(format!("corrupt checkpoint: {e}")))?;
        info!(
            run_id = %state.run_id,
            resume_index = state.resume_index(),
            "Loaded prior checkpoint"
        );
        Ok(Some(state))
    }

    /// Atomically persist the whole checkpoint.
    ///
    /// Every error is mapped to [`Error::CheckpointWrite`], which is fatal
    /// to the run.
    pub async fn persist(&self, state: &CheckpointState) -> Result<()> {
        let data = serde_json::to_vec(state)
            .map_err(|e| Error::CheckpointWrite(format!("serialize: {e}")))?;
        self.backend
            .write(CURRENT_KEY, &data)
            .await
            .map_err(|e| Error::CheckpointWrite(e.to_string()))?;
        debug!(
            run_id = %state.run_id,
            last_completed = ?state.last_completed_entry_index,
            "Checkpoint persisted"
        );
        Ok(())
    }

    /// Archive the finished checkpoint so the next run starts fresh while
    /// the completed run stays auditable.
    pub async fn archive(&self, run_id: Uuid) -> Result<()> {
        self.backend.rename(CURRENT_KEY, &archive_key(run_id)).await?;
        info!(run_id = %run_id, "Checkpoint archived");
        Ok(())
    }
}
