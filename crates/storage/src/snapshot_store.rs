//! Whole-document persistence of the offline snapshot with
//! read-modify-write mutators.

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use fieldsync_core::{
    resolve_project, should_apply_lww, AttachPayload, FormRecord, FormStatus, OfflineSnapshot,
    SNAPSHOT_SCHEMA_VERSION,
};

use crate::errors::Result;
use crate::kv::KeyValueStore;

/// Storage key of the serialized snapshot document.
pub const SNAPSHOT_KEY: &str = "offline_snapshot";

/// Overrides applied on top of the record handed to `upsert_form`.
#[derive(Debug, Clone, Default)]
pub struct UpsertOptions {
    pub annex_title: Option<String>,
    pub status: Option<FormStatus>,
    pub linked_project_id: Option<String>,
}

/// A completed upsert: the persisted snapshot plus the record as stored.
#[derive(Debug, Clone)]
pub struct UpsertedForm {
    pub snapshot: OfflineSnapshot,
    pub record: FormRecord,
}

/// A completed attachment relocation.
#[derive(Debug, Clone)]
pub struct AttachedDraft {
    pub snapshot: OfflineSnapshot,
    pub record: FormRecord,
    pub project_id: String,
}

/// Result of an attachment attempt. Negative outcomes are normal results,
/// not errors; the persisted snapshot is untouched for both.
#[derive(Debug, Clone)]
pub enum AttachOutcome {
    Attached(AttachedDraft),
    DraftNotFound,
    NoMatchingProject,
}

/// On-disk envelope around the snapshot. Version 1 documents predate the
/// normalization pass and are migrated once at load.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSnapshot {
    #[serde(default = "legacy_schema_version")]
    schema_version: u32,
    #[serde(flatten)]
    snapshot: OfflineSnapshot,
}

fn legacy_schema_version() -> u32 {
    1
}

/// The snapshot store. Every operation reads and writes the whole aggregate;
/// all mutations are serialized behind one lock so concurrently triggered
/// writers cannot interleave between read and write (the lost-update race of
/// the reference behavior). Reads stay concurrent.
pub struct SnapshotStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// Decode the persisted document, applying the schema migration
    /// in-memory when needed. Returns the snapshot plus whether a migration
    /// happened.
    async fn read_current(&self) -> Result<(OfflineSnapshot, bool)> {
        let Some(raw) = self.kv.get_item(SNAPSHOT_KEY).await? else {
            return Ok((OfflineSnapshot::default(), false));
        };
        let stored: StoredSnapshot = serde_json::from_str(&raw)?;
        if stored.schema_version < SNAPSHOT_SCHEMA_VERSION {
            debug!(
                "[SnapshotStore] migrating snapshot schema v{} -> v{}",
                stored.schema_version, SNAPSHOT_SCHEMA_VERSION
            );
            return Ok((stored.snapshot.normalize(), true));
        }
        Ok((stored.snapshot, false))
    }

    async fn persist(&self, snapshot: &OfflineSnapshot) -> Result<()> {
        let stored = StoredSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            snapshot: snapshot.clone(),
        };
        let raw = serde_json::to_string(&stored)?;
        self.kv.set_item(SNAPSHOT_KEY, &raw).await
    }

    /// Load the current snapshot. A legacy document is migrated and written
    /// back once, so later reads skip the normalization pass.
    pub async fn load(&self) -> Result<OfflineSnapshot> {
        let _guard = self.write_lock.lock().await;
        let (snapshot, migrated) = self.read_current().await?;
        if migrated {
            self.persist(&snapshot).await?;
        }
        Ok(snapshot)
    }

    /// Replace the whole local snapshot with a server-originated one.
    pub async fn replace(&self, remote: OfflineSnapshot) -> Result<OfflineSnapshot> {
        let _guard = self.write_lock.lock().await;
        let normalized = remote.normalize();
        self.persist(&normalized).await?;
        Ok(normalized)
    }

    /// Insert or update one form record.
    ///
    /// When the (overridden) linked project exists, the record replaces any
    /// prior record with the same id inside that project's forms and moves
    /// to the front; otherwise it lands at the front of the standalone
    /// drafts. Timestamps are refreshed: this is a local mutation.
    pub async fn upsert_form(
        &self,
        record: FormRecord,
        options: UpsertOptions,
    ) -> Result<UpsertedForm> {
        let _guard = self.write_lock.lock().await;
        let (mut snapshot, _) = self.read_current().await?;

        let mut record = record;
        if let Some(annex_title) = options.annex_title {
            record.annex_title = annex_title;
        }
        if let Some(status) = options.status {
            record.status = status;
        }
        let target = options
            .linked_project_id
            .or_else(|| record.linked_project_id.clone());
        record.touch();

        Self::place_form(&mut snapshot, &mut record, target);
        self.persist(&snapshot).await?;
        Ok(UpsertedForm { snapshot, record })
    }

    /// Fold one server-side form record into the snapshot under the
    /// last-writer-wins rule. Timestamps are preserved as received; returns
    /// the updated snapshot when the remote copy won, `None` when the local
    /// copy was newer and kept.
    pub async fn merge_remote_form(&self, record: FormRecord) -> Result<Option<OfflineSnapshot>> {
        let _guard = self.write_lock.lock().await;
        let (mut snapshot, _) = self.read_current().await?;

        if let Some(local) = snapshot.find_form(&record.id) {
            if !should_apply_lww(local.updated_at, record.updated_at) {
                return Ok(None);
            }
        }

        let mut record = record;
        let target = record.linked_project_id.clone();
        Self::place_form(&mut snapshot, &mut record, target);
        self.persist(&snapshot).await?;
        Ok(Some(snapshot))
    }

    /// Relocate a standalone draft into the project resolved from the
    /// payload. A single atomic relocation within one snapshot write; on any
    /// negative outcome nothing is persisted.
    pub async fn attach_draft(
        &self,
        form_id: &str,
        payload: &AttachPayload,
    ) -> Result<AttachOutcome> {
        let _guard = self.write_lock.lock().await;
        let (mut snapshot, _) = self.read_current().await?;

        let project_pos = resolve_project(&snapshot.projects, payload)
            .map(|p| p.id.clone())
            .and_then(|id| snapshot.projects.iter().position(|p| p.id == id));
        let Some(project_pos) = project_pos else {
            return Ok(AttachOutcome::NoMatchingProject);
        };
        let Some(draft_pos) = snapshot
            .standalone_drafts
            .iter()
            .position(|r| r.id == form_id)
        else {
            return Ok(AttachOutcome::DraftNotFound);
        };

        let mut record = snapshot.standalone_drafts.remove(draft_pos);
        let project = &mut snapshot.projects[project_pos];
        record.linked_project_id = Some(project.id.clone());
        if record.abemis_id.is_none() {
            record.abemis_id = project.abemis_id.clone();
        }
        if record.qr_reference.is_none() {
            record.qr_reference = project.qr_reference.clone();
        }
        record.touch();
        let project_id = project.id.clone();
        project.forms.insert(0, record.clone());

        self.persist(&snapshot).await?;
        Ok(AttachOutcome::Attached(AttachedDraft {
            snapshot,
            record,
            project_id,
        }))
    }

    /// Delete a form wherever it currently lives: standalone drafts first,
    /// then each project's forms. Returns the updated snapshot, or `None`
    /// when no record matched (nothing persisted).
    pub async fn delete_form(&self, form_id: &str) -> Result<Option<OfflineSnapshot>> {
        let _guard = self.write_lock.lock().await;
        let (mut snapshot, _) = self.read_current().await?;

        let mut removed = false;
        if let Some(pos) = snapshot
            .standalone_drafts
            .iter()
            .position(|r| r.id == form_id)
        {
            snapshot.standalone_drafts.remove(pos);
            removed = true;
        } else {
            for project in &mut snapshot.projects {
                if let Some(pos) = project.forms.iter().position(|r| r.id == form_id) {
                    project.forms.remove(pos);
                    removed = true;
                    break;
                }
            }
        }

        if !removed {
            return Ok(None);
        }
        self.persist(&snapshot).await?;
        Ok(Some(snapshot))
    }

    /// Remove every other copy of the record, then insert it at the front of
    /// its target container. Keeps the single-residence invariant.
    fn place_form(snapshot: &mut OfflineSnapshot, record: &mut FormRecord, target: Option<String>) {
        snapshot.standalone_drafts.retain(|r| r.id != record.id);
        for project in &mut snapshot.projects {
            project.forms.retain(|r| r.id != record.id);
        }

        let project = target.and_then(|id| snapshot.projects.iter_mut().find(|p| p.id == id));
        match project {
            Some(project) => {
                record.linked_project_id = Some(project.id.clone());
                project.forms.insert(0, record.clone());
            }
            None => {
                record.linked_project_id = None;
                snapshot.standalone_drafts.insert(0, record.clone());
            }
        }
    }
}
