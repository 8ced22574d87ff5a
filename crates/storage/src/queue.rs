//! Durable FIFO queue of pending sync operations.
//!
//! The queue is a passive store: it never decides when an operation is
//! retried or dropped. Retry-limit policy lives in the scheduler so the
//! queue stays reusable.

use std::sync::Arc;

use log::debug;
use tokio::sync::Mutex;

use fieldsync_core::{SyncOperation, SyncOperationType};

use crate::errors::Result;
use crate::kv::KeyValueStore;

/// Storage key of the serialized operation list.
pub const QUEUE_KEY: &str = "sync_queue";

/// Storage key of the dead-letter list holding retry-exhausted operations.
pub const FAILED_OPERATIONS_KEY: &str = "failed_operations";

/// Durability comes from persisting the whole list atomically per call,
/// not from per-entry storage. Mutations are serialized behind one lock,
/// same discipline as the snapshot store.
pub struct SyncQueue {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl SyncQueue {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    async fn read_list(&self, key: &str) -> Result<Vec<SyncOperation>> {
        match self.kv.get_item(key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write_list(&self, key: &str, operations: &[SyncOperation]) -> Result<()> {
        let raw = serde_json::to_string(operations)?;
        self.kv.set_item(key, &raw).await
    }

    /// Append one operation in submission order.
    pub async fn enqueue(
        &self,
        op: SyncOperationType,
        form_id: &str,
        payload: serde_json::Value,
    ) -> Result<SyncOperation> {
        let _guard = self.write_lock.lock().await;
        let operation = SyncOperation::new(op, form_id, payload);
        let mut operations = self.read_list(QUEUE_KEY).await?;
        operations.push(operation.clone());
        self.write_list(QUEUE_KEY, &operations).await?;
        debug!(
            "[SyncQueue] enqueued {:?} for form {} ({} pending)",
            op,
            form_id,
            operations.len()
        );
        Ok(operation)
    }

    /// Pending operations in FIFO order.
    pub async fn list(&self) -> Result<Vec<SyncOperation>> {
        self.read_list(QUEUE_KEY).await
    }

    /// Remove one operation by id. Returns whether it was present.
    pub async fn remove(&self, operation_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut operations = self.read_list(QUEUE_KEY).await?;
        let before = operations.len();
        operations.retain(|op| op.id != operation_id);
        if operations.len() == before {
            return Ok(false);
        }
        self.write_list(QUEUE_KEY, &operations).await?;
        Ok(true)
    }

    /// Bump the retry counter of one operation. Counters only increase.
    pub async fn increment_retry(&self, operation_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut operations = self.read_list(QUEUE_KEY).await?;
        let Some(operation) = operations.iter_mut().find(|op| op.id == operation_id) else {
            return Ok(false);
        };
        operation.retries += 1;
        self.write_list(QUEUE_KEY, &operations).await?;
        Ok(true)
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove_item(QUEUE_KEY).await
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.read_list(QUEUE_KEY).await?.len())
    }

    /// Park a retry-exhausted operation on the durable dead-letter list so
    /// it stays visible to the user instead of being silently discarded.
    pub async fn record_failed(&self, operation: SyncOperation) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut failed = self.read_list(FAILED_OPERATIONS_KEY).await?;
        failed.push(operation);
        self.write_list(FAILED_OPERATIONS_KEY, &failed).await
    }

    pub async fn list_failed(&self) -> Result<Vec<SyncOperation>> {
        self.read_list(FAILED_OPERATIONS_KEY).await
    }

    pub async fn clear_failed(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove_item(FAILED_OPERATIONS_KEY).await
    }
}
