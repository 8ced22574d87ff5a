//! Canonical project/infrastructure records.

use serde::{Deserialize, Serialize};

use crate::forms::FormRecord;

/// A geotagged photo reference captured in the field. Read-only media
/// metadata from the server's point of view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geotag {
    pub id: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<String>,
}

/// A proposal document attached to a project on the server side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDocument {
    pub id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

/// Canonical project record. Created only by snapshot replacement from the
/// server, never purely locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: String,
    #[serde(default)]
    pub project_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abemis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_reference: Option<String>,
    /// Display title. Older snapshots stored this under `projectTitle`.
    #[serde(default, alias = "projectTitle")]
    pub title: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub municipality: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub geotags: Vec<Geotag>,
    #[serde(default)]
    pub proposal_documents: Vec<ProposalDocument>,
    /// Forms already attached to this project, most-recent-first.
    #[serde(default)]
    pub forms: Vec<FormRecord>,
}
