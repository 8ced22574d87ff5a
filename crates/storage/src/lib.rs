//! Durable local persistence for the fieldsync offline core: the key-value
//! collaborator, the whole-document snapshot store, and the sync queue.

mod errors;
pub mod kv;
pub mod queue;
pub mod snapshot_store;

pub use errors::{Result, StorageError};
pub use kv::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
pub use queue::SyncQueue;
pub use snapshot_store::{AttachOutcome, AttachedDraft, SnapshotStore, UpsertOptions, UpsertedForm};
