//! Validation form models and their sync metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sync lifecycle status of a validation form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormStatus {
    Draft,
    PendingSync,
    Synced,
    Error,
}

impl Default for FormStatus {
    fn default() -> Self {
        Self::Draft
    }
}

/// The user-entered survey payload describing one road/infrastructure
/// validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationForm {
    #[serde(default)]
    pub road_name: String,
    #[serde(default)]
    pub barangay: String,
    #[serde(default)]
    pub municipality: String,
    #[serde(default)]
    pub province: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width_m: Option<f64>,
    #[serde(default)]
    pub surface_type: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub remarks: String,
    #[serde(default)]
    pub noted_issues: Vec<String>,
}

/// A validation form wrapped with the metadata the sync core tracks.
///
/// `updated_at` is the server-visible record timestamp; `last_touch` is the
/// local mutation timestamp and is refreshed on every local write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormRecord {
    pub id: String,
    #[serde(default)]
    pub annex_title: String,
    pub form: ValidationForm,
    #[serde(default)]
    pub status: FormStatus,
    pub updated_at: DateTime<Utc>,
    pub last_touch: DateTime<Utc>,
    /// Absent means "standalone draft", not yet linked to any project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abemis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl FormRecord {
    /// New standalone draft with fresh timestamps.
    pub fn new_draft(
        id: impl Into<String>,
        annex_title: impl Into<String>,
        form: ValidationForm,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            annex_title: annex_title.into(),
            form,
            status: FormStatus::Draft,
            updated_at: now,
            last_touch: now,
            linked_project_id: None,
            abemis_id: None,
            qr_reference: None,
            created_by: None,
        }
    }

    /// Refresh both timestamps after a local mutation. Timestamps never move
    /// backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
        if now > self.last_touch {
            self.last_touch = now;
        }
    }
}

/// Wire shape for the batch upsert endpoint (`POST /sync/forms`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFormPayload {
    pub id: String,
    pub annex_title: String,
    pub form: ValidationForm,
    pub status: FormStatus,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abemis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl From<&FormRecord> for ClientFormPayload {
    fn from(record: &FormRecord) -> Self {
        Self {
            id: record.id.clone(),
            annex_title: record.annex_title.clone(),
            form: record.form.clone(),
            status: record.status,
            updated_at: record.updated_at,
            linked_project_id: record.linked_project_id.clone(),
            abemis_id: record.abemis_id.clone(),
            qr_reference: record.qr_reference.clone(),
            created_by: record.created_by.clone(),
        }
    }
}
