//! Scripted collaborators shared by the scheduler and orchestrator tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use fieldsync_core::{
    AttachPayload, ClientFormPayload, FormRecord, FormStatus, OfflineSnapshot, ProjectRecord,
    SyncOperationType, ValidationForm,
};
use fieldsync_remote::{RemoteSyncError, Result as RemoteResult, SyncApi};
use fieldsync_storage::{MemoryKeyValueStore, SyncQueue};

use crate::connectivity::StaticConnectivity;
use crate::context::SyncContext;
use crate::session::{SessionProvider, StaticSession};

/// Scripted server double. Calls are recorded as `"endpoint:argument"`
/// strings so tests can assert both ordering and absence.
#[derive(Default)]
pub struct MockSyncApi {
    calls: Mutex<Vec<String>>,
    failing_forms: Mutex<HashSet<String>>,
    rejected_forms: Mutex<HashSet<String>>,
    snapshot: Mutex<Option<OfflineSnapshot>>,
    pull_result: Mutex<Vec<FormRecord>>,
    pull_fails: Mutex<bool>,
    mid_drain_enqueue: Mutex<Option<Arc<SyncQueue>>>,
}

impl MockSyncApi {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Make every per-form endpoint reject this form id with a 500.
    pub fn fail_form(&self, form_id: &str) {
        self.failing_forms.lock().unwrap().insert(form_id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_forms.lock().unwrap().clear();
    }

    /// Make every per-form endpoint reject this form id with a 422, which
    /// classifies as a permanent failure.
    pub fn reject_form(&self, form_id: &str) {
        self.rejected_forms.lock().unwrap().insert(form_id.to_string());
    }

    fn form_error(&self, form_id: &str) -> Option<RemoteSyncError> {
        if self.failing_forms.lock().unwrap().contains(form_id) {
            return Some(RemoteSyncError::api(500, "server error"));
        }
        if self.rejected_forms.lock().unwrap().contains(form_id) {
            return Some(RemoteSyncError::api(422, "validation failed"));
        }
        None
    }

    pub fn set_snapshot(&self, snapshot: OfflineSnapshot) {
        *self.snapshot.lock().unwrap() = Some(snapshot);
    }

    pub fn set_pull(&self, forms: Vec<FormRecord>) {
        *self.pull_result.lock().unwrap() = forms;
    }

    pub fn fail_pull(&self) {
        *self.pull_fails.lock().unwrap() = true;
    }

    /// During the next upsert call, push a fresh operation for form `late`
    /// into the given queue.
    pub fn enqueue_mid_drain(&self, queue: Arc<SyncQueue>) {
        *self.mid_drain_enqueue.lock().unwrap() = Some(queue);
    }
}

#[async_trait]
impl SyncApi for MockSyncApi {
    async fn fetch_snapshot(&self, _token: &str) -> RemoteResult<OfflineSnapshot> {
        self.record("fetch_snapshot".to_string());
        match self.snapshot.lock().unwrap().clone() {
            Some(snapshot) => Ok(snapshot),
            None => Err(RemoteSyncError::api(503, "snapshot unavailable")),
        }
    }

    async fn pull_forms_since(&self, _token: &str, since_ms: i64) -> RemoteResult<Vec<FormRecord>> {
        self.record(format!("pull:{since_ms}"));
        if *self.pull_fails.lock().unwrap() {
            return Err(RemoteSyncError::api(503, "pull unavailable"));
        }
        Ok(self.pull_result.lock().unwrap().clone())
    }

    async fn upsert_forms(
        &self,
        _token: &str,
        forms: Vec<ClientFormPayload>,
    ) -> RemoteResult<Vec<FormRecord>> {
        let interleaved = self.mid_drain_enqueue.lock().unwrap().take();
        if let Some(queue) = interleaved {
            let record = FormRecord::new_draft("late", "Annex E", ValidationForm::default());
            queue
                .enqueue(
                    SyncOperationType::Update,
                    "late",
                    serde_json::to_value(ClientFormPayload::from(&record)).expect("payload"),
                )
                .await
                .expect("mid-drain enqueue");
        }
        let mut accepted = Vec::new();
        for payload in &forms {
            self.record(format!("upsert:{}", payload.id));
            if let Some(err) = self.form_error(&payload.id) {
                return Err(err);
            }
            let mut record = FormRecord::new_draft(
                payload.id.clone(),
                payload.annex_title.clone(),
                payload.form.clone(),
            );
            record.status = FormStatus::Synced;
            record.linked_project_id = payload.linked_project_id.clone();
            accepted.push(record);
        }
        Ok(accepted)
    }

    async fn attach_form(
        &self,
        _token: &str,
        form_id: &str,
        _payload: &AttachPayload,
    ) -> RemoteResult<FormRecord> {
        self.record(format!("attach:{form_id}"));
        if let Some(err) = self.form_error(form_id) {
            return Err(err);
        }
        let mut record = FormRecord::new_draft(form_id, "Annex E", ValidationForm::default());
        record.status = FormStatus::Synced;
        Ok(record)
    }

    async fn delete_form(&self, _token: &str, form_id: &str) -> RemoteResult<()> {
        self.record(format!("delete:{form_id}"));
        if let Some(err) = self.form_error(form_id) {
            return Err(err);
        }
        Ok(())
    }
}

/// Context over an in-memory store with the given connectivity and session
/// state.
pub fn test_context(api: Arc<MockSyncApi>, connected: bool, signed_in: bool) -> Arc<SyncContext> {
    let session: Arc<dyn SessionProvider> = if signed_in {
        Arc::new(StaticSession::signed_in("test-token"))
    } else {
        Arc::new(StaticSession::signed_out())
    };
    Arc::new(SyncContext::new(
        Arc::new(MemoryKeyValueStore::new()),
        api,
        session,
        Arc::new(StaticConnectivity::new(connected)),
    ))
}

/// A server-stamped synced form record.
pub fn synced_record(id: &str) -> FormRecord {
    let mut record = FormRecord::new_draft(id, "Annex E", ValidationForm::default());
    record.status = FormStatus::Synced;
    record
}

/// A project with the usual identifier trio populated.
pub fn project(id: &str, project_code: &str, abemis_id: Option<&str>) -> ProjectRecord {
    ProjectRecord {
        id: id.to_string(),
        project_code: project_code.to_string(),
        abemis_id: abemis_id.map(str::to_string),
        qr_reference: Some(format!("QR-{id}")),
        title: format!("Project {id}"),
        province: "Iloilo".to_string(),
        municipality: "Pototan".to_string(),
        status: "ongoing".to_string(),
        geotags: Vec::new(),
        proposal_documents: Vec::new(),
        forms: Vec::new(),
    }
}
