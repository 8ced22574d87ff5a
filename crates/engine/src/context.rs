//! Explicit service context shared by the scheduler and orchestrator.
//!
//! The reference behavior this replaces kept a module-level persistence
//! handle and auth token; here every collaborator is owned by one context
//! object constructed at startup.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use fieldsync_remote::SyncApi;
use fieldsync_storage::{KeyValueStore, SnapshotStore, SyncQueue};

use crate::connectivity::ConnectivityMonitor;
use crate::session::SessionProvider;

/// Runtime state of the background engine: the cycle guard that coalesces
/// overlapping triggers, and the handle of the spawned scheduler task.
#[derive(Debug, Default)]
pub struct SyncRuntimeState {
    pub cycle_lock: Mutex<()>,
    pub background_task: Mutex<Option<JoinHandle<()>>>,
}

pub struct SyncContext {
    kv: Arc<dyn KeyValueStore>,
    snapshot_store: Arc<SnapshotStore>,
    queue: Arc<SyncQueue>,
    remote: Arc<dyn SyncApi>,
    session: Arc<dyn SessionProvider>,
    connectivity: Arc<dyn ConnectivityMonitor>,
}

impl SyncContext {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        remote: Arc<dyn SyncApi>,
        session: Arc<dyn SessionProvider>,
        connectivity: Arc<dyn ConnectivityMonitor>,
    ) -> Self {
        let snapshot_store = Arc::new(SnapshotStore::new(Arc::clone(&kv)));
        let queue = Arc::new(SyncQueue::new(Arc::clone(&kv)));
        Self {
            kv,
            snapshot_store,
            queue,
            remote,
            session,
            connectivity,
        }
    }

    pub fn kv(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.kv)
    }

    pub fn snapshot_store(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.snapshot_store)
    }

    pub fn queue(&self) -> Arc<SyncQueue> {
        Arc::clone(&self.queue)
    }

    pub fn remote(&self) -> Arc<dyn SyncApi> {
        Arc::clone(&self.remote)
    }

    pub fn session(&self) -> Arc<dyn SessionProvider> {
        Arc::clone(&self.session)
    }

    pub fn connectivity(&self) -> Arc<dyn ConnectivityMonitor> {
        Arc::clone(&self.connectivity)
    }
}
