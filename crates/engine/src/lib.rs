//! Background reconciliation engine and the data orchestrator consumed by
//! the presentation layer.

mod connectivity;
mod context;
mod errors;
mod orchestrator;
mod scheduler;
mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use connectivity::{ConnectivityMonitor, StaticConnectivity};
pub use context::{SyncContext, SyncRuntimeState};
pub use errors::{EngineError, Result};
pub use orchestrator::{
    AttachOutcome, DataOrchestrator, DeleteOutcome, RefreshOptions, SaveOptions, SaveOutcome,
};
pub use scheduler::{
    perform_background_sync, BackgroundSyncScheduler, SchedulerHandle, SyncCycleReport,
    SyncCycleStatus, SyncTrigger, LAST_FORMS_SYNC_KEY,
};
pub use session::{SessionProvider, StaticSession};
