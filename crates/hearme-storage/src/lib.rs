//! Local persistence for the HearMe gesture pipeline.
//!
//! This crate provides:
//! - Reference embedding artifacts (`<stem>_embedding.npy`, shape `(1, L)`)
//! - Reference lookup by lesson through the catalog
//! - Lesson progress stores (in-memory and JSON file)

pub mod artifact;
pub mod error;
pub mod progress;
pub mod reference;

pub use artifact::{artifact_exists, load_embedding, store_embedding, StoreOutcome};
pub use error::{StorageError, StorageResult};
pub use progress::{InMemoryProgressStore, JsonFileProgressStore, ProgressRecorder};
pub use reference::ReferenceStore;
