//! Sync queue operation model and reconciliation helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum delivery attempts before an operation is moved to the failed
/// list. The queue itself is passive; the scheduler enforces this bound.
pub const MAX_RETRIES: u32 = 3;

/// Reconciliation cadence while the app is foregrounded.
pub const SYNC_FOREGROUND_INTERVAL_SECS: u64 = 30;

/// Kind of pending mutation awaiting transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperationType {
    Create,
    Update,
    Attach,
    Delete,
}

/// One durable entry in the sync queue, independent of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    pub id: String,
    pub op: SyncOperationType,
    pub form_id: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub retries: u32,
}

impl SyncOperation {
    pub fn new(
        op: SyncOperationType,
        form_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            op,
            form_id: form_id.into(),
            payload,
            timestamp: Utc::now(),
            retries: 0,
        }
    }

    /// True once the scheduler must stop retrying this operation.
    pub fn is_exhausted(&self) -> bool {
        self.retries >= MAX_RETRIES
    }
}

/// Last-writer-wins rule for folding a remote record over a local one.
///
/// Coarse per-record timestamps: a strictly newer remote wins, ties keep the
/// local copy. There is no event-id tiebreaker because each record has a
/// single writer at a time in this system.
pub fn should_apply_lww(local_updated_at: DateTime<Utc>, remote_updated_at: DateTime<Utc>) -> bool {
    remote_updated_at > local_updated_at
}
