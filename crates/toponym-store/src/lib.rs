//! # toponym-store
//!
//! Durable storage for the classification pipeline: the record store
//! (record identity → record state) and checkpoint persistence, both over a
//! pluggable key-value [`StorageBackend`] with atomic writes.

pub mod backend;
pub mod checkpoint;
pub mod record_store;

pub use backend::{FilesystemBackend, MemoryBackend, StorageBackend};
pub use checkpoint::CheckpointStore;
pub use record_store::RecordStore;
