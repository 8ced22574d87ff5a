//! User-facing data facade: serves the current snapshot to the presentation
//! layer and applies every mutation with local durability first, remote
//! delivery second.

use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use fieldsync_core::{
    resolve_project, AttachPayload, ClientFormPayload, FormRecord, FormStatus, OfflineSnapshot,
    ProjectRecord, SyncOperation, SyncOperationType,
};
use fieldsync_storage::{AttachOutcome as StoreAttachOutcome, UpsertOptions};

use crate::context::SyncContext;
use crate::errors::Result;

/// Overrides for [`DataOrchestrator::save_draft`], applied on top of the
/// record itself.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub annex_title: Option<String>,
    pub status: Option<FormStatus>,
    pub linked_project_id: Option<String>,
}

/// Options for [`DataOrchestrator::refresh`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshOptions {
    /// Suppress the loading-state signal; the refresh itself is unchanged.
    pub silent: bool,
}

/// A completed save. `synced` is false whenever the copy only reached local
/// storage; a queued operation covers the rest.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub record: FormRecord,
    pub synced: bool,
}

/// Result of an attachment request.
#[derive(Debug, Clone)]
pub enum AttachOutcome {
    Attached { record: FormRecord, synced: bool },
    DraftNotFound,
    NoMatchingProject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { synced: bool },
    NotFound,
}

/// Single entry point for reads and writes against the offline data set.
///
/// Every mutation persists locally before any network attempt, so app kills
/// and dead zones never lose work. Consumers observe the snapshot through a
/// watch channel instead of re-reading storage.
pub struct DataOrchestrator {
    context: Arc<SyncContext>,
    snapshot_tx: watch::Sender<OfflineSnapshot>,
    loading_tx: watch::Sender<bool>,
}

impl DataOrchestrator {
    pub fn new(context: Arc<SyncContext>) -> Self {
        let (snapshot_tx, _) = watch::channel(OfflineSnapshot::default());
        let (loading_tx, _) = watch::channel(false);
        Self {
            context,
            snapshot_tx,
            loading_tx,
        }
    }

    /// Load the persisted snapshot and publish it. Call once at startup so
    /// the UI renders local data before any network round-trip.
    pub async fn init(&self) -> Result<OfflineSnapshot> {
        let snapshot = self.context.snapshot_store().load().await?;
        self.snapshot_tx.send_replace(snapshot.clone());
        Ok(snapshot)
    }

    /// Current published snapshot.
    pub fn current(&self) -> OfflineSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OfflineSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// True while a remote refresh is in flight.
    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading_tx.subscribe()
    }

    /// Re-publish the snapshot whenever the scheduler folds remote changes
    /// into storage. Feed this the scheduler's remote-changes receiver.
    pub fn listen_for_remote_changes(
        &self,
        mut remote_changes: watch::Receiver<u64>,
    ) -> JoinHandle<()> {
        let context = Arc::clone(&self.context);
        let snapshot_tx = self.snapshot_tx.clone();
        tokio::spawn(async move {
            while remote_changes.changed().await.is_ok() {
                match context.snapshot_store().load().await {
                    Ok(snapshot) => {
                        snapshot_tx.send_replace(snapshot);
                    }
                    Err(err) => {
                        warn!("[Orchestrator] reload after remote change failed: {}", err);
                    }
                }
            }
        })
    }

    /// Fetch the authoritative snapshot when a session exists and the device
    /// is online; on any remote failure the persisted copy is served
    /// unchanged. Always ends with a publish.
    pub async fn refresh(&self, options: RefreshOptions) -> Result<OfflineSnapshot> {
        if !options.silent {
            self.loading_tx.send_replace(true);
        }
        let result = self.refresh_inner().await;
        if !options.silent {
            self.loading_tx.send_replace(false);
        }
        let snapshot = result?;
        self.snapshot_tx.send_replace(snapshot.clone());
        Ok(snapshot)
    }

    async fn refresh_inner(&self) -> Result<OfflineSnapshot> {
        if self.context.connectivity().is_connected() {
            if let Some(token) = self.context.session().access_token() {
                match self.context.remote().fetch_snapshot(&token).await {
                    Ok(remote_snapshot) => {
                        let stored = self
                            .context
                            .snapshot_store()
                            .replace(remote_snapshot)
                            .await?;
                        return Ok(stored);
                    }
                    Err(err) if err.is_offline() => {
                        debug!(
                            "[Orchestrator] server unreachable, serving local copy: {}",
                            err
                        );
                    }
                    Err(err) => {
                        warn!(
                            "[Orchestrator] snapshot fetch failed, serving local copy: {}",
                            err
                        );
                    }
                }
            }
        }
        Ok(self.context.snapshot_store().load().await?)
    }

    /// Persist a form locally, then attempt the remote upsert. Offline or on
    /// failure the operation is queued; without a session the record stays a
    /// purely local draft.
    pub async fn save_draft(
        &self,
        record: FormRecord,
        options: SaveOptions,
    ) -> Result<SaveOutcome> {
        let token = self.context.session().access_token();
        let store = self.context.snapshot_store();
        let is_new = store.load().await?.find_form(&record.id).is_none();

        let default_status = if token.is_some() {
            FormStatus::PendingSync
        } else {
            FormStatus::Draft
        };
        let upserted = store
            .upsert_form(
                record,
                UpsertOptions {
                    annex_title: options.annex_title,
                    status: Some(options.status.unwrap_or(default_status)),
                    linked_project_id: options.linked_project_id,
                },
            )
            .await?;
        self.snapshot_tx.send_replace(upserted.snapshot);
        let stored = upserted.record;

        let Some(token) = token else {
            return Ok(SaveOutcome {
                record: stored,
                synced: false,
            });
        };

        let op = if is_new {
            SyncOperationType::Create
        } else {
            SyncOperationType::Update
        };
        let payload = ClientFormPayload::from(&stored);

        if self.context.connectivity().is_connected() {
            match self
                .context
                .remote()
                .upsert_forms(&token, vec![payload.clone()])
                .await
            {
                Ok(_) => {
                    // The server may fill fields the client cannot compute,
                    // so a full refresh replaces the optimistic local copy.
                    let snapshot = self.refresh(RefreshOptions { silent: true }).await?;
                    let record = snapshot
                        .find_form(&stored.id)
                        .cloned()
                        .unwrap_or(stored);
                    return Ok(SaveOutcome {
                        record,
                        synced: true,
                    });
                }
                Err(err) if err.is_offline() => {
                    debug!("[Orchestrator] server unreachable, queueing upsert: {}", err);
                }
                Err(err) => {
                    warn!("[Orchestrator] remote upsert failed, queueing: {}", err);
                }
            }
        }

        self.context
            .queue()
            .enqueue(op, &stored.id, serde_json::to_value(&payload)?)
            .await?;
        Ok(SaveOutcome {
            record: stored,
            synced: false,
        })
    }

    /// Attach a standalone draft to the project matching the payload.
    /// Online the server performs the attachment and its copy is folded
    /// back; otherwise the local mutator runs and the attachment is queued.
    pub async fn attach_draft(
        &self,
        form_id: &str,
        payload: AttachPayload,
    ) -> Result<AttachOutcome> {
        let token = self.context.session().access_token();
        let store = self.context.snapshot_store();

        if let Some(token) = token.as_deref() {
            if self.context.connectivity().is_connected() {
                match self.context.remote().attach_form(token, form_id, &payload).await {
                    Ok(server_record) => {
                        let snapshot = self.refresh(RefreshOptions { silent: true }).await?;
                        let record = snapshot
                            .find_form(form_id)
                            .cloned()
                            .unwrap_or(server_record);
                        return Ok(AttachOutcome::Attached {
                            record,
                            synced: true,
                        });
                    }
                    Err(err) if err.is_offline() => {
                        debug!(
                            "[Orchestrator] server unreachable, attaching locally: {}",
                            err
                        );
                    }
                    Err(err) => {
                        warn!(
                            "[Orchestrator] remote attach failed, attaching locally: {}",
                            err
                        );
                    }
                }
            }
        }

        match store.attach_draft(form_id, &payload).await? {
            StoreAttachOutcome::Attached(attached) => {
                self.snapshot_tx.send_replace(attached.snapshot);
                if token.is_some() {
                    self.context
                        .queue()
                        .enqueue(
                            SyncOperationType::Attach,
                            form_id,
                            serde_json::to_value(&payload)?,
                        )
                        .await?;
                }
                Ok(AttachOutcome::Attached {
                    record: attached.record,
                    synced: false,
                })
            }
            StoreAttachOutcome::DraftNotFound => Ok(AttachOutcome::DraftNotFound),
            StoreAttachOutcome::NoMatchingProject => Ok(AttachOutcome::NoMatchingProject),
        }
    }

    /// Remove a form locally, then best-effort remotely. The local removal
    /// stands even when the server call fails; a queued delete finishes the
    /// job later.
    pub async fn delete_form(&self, form_id: &str) -> Result<DeleteOutcome> {
        let store = self.context.snapshot_store();
        let Some(snapshot) = store.delete_form(form_id).await? else {
            return Ok(DeleteOutcome::NotFound);
        };
        self.snapshot_tx.send_replace(snapshot);

        let Some(token) = self.context.session().access_token() else {
            return Ok(DeleteOutcome::Deleted { synced: false });
        };

        if self.context.connectivity().is_connected() {
            match self.context.remote().delete_form(&token, form_id).await {
                Ok(()) => return Ok(DeleteOutcome::Deleted { synced: true }),
                Err(err) if err.is_offline() => {
                    debug!("[Orchestrator] server unreachable, queueing delete: {}", err);
                }
                Err(err) => {
                    warn!("[Orchestrator] remote delete failed, queueing: {}", err);
                }
            }
        }
        self.context
            .queue()
            .enqueue(SyncOperationType::Delete, form_id, Value::Null)
            .await?;
        Ok(DeleteOutcome::Deleted { synced: false })
    }

    /// Look a project up in the published snapshot by any of its
    /// identifiers (project code, ABEMIS id, QR reference).
    pub fn find_project_by_code(&self, code: &str) -> Option<ProjectRecord> {
        let payload = AttachPayload::any_identifier(code);
        let snapshot = self.snapshot_tx.borrow();
        resolve_project(&snapshot.projects, &payload).cloned()
    }

    /// Operations dropped from the retry queue after exhausting their
    /// attempts, kept for operator review.
    pub async fn failed_operations(&self) -> Result<Vec<SyncOperation>> {
        Ok(self.context.queue().list_failed().await?)
    }

    /// Pending (not yet delivered) queue entries.
    pub async fn pending_operations(&self) -> Result<Vec<SyncOperation>> {
        Ok(self.context.queue().list().await?)
    }
}
