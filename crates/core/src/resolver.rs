//! Attachment resolution: matching a draft to a project by shared external
//! identifiers.

use serde::{Deserialize, Serialize};

use crate::projects::ProjectRecord;

/// Identifier bundle used to attach a draft to a project. Any subset of the
/// four fields may be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abemis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_reference: Option<String>,
}

impl AttachPayload {
    /// Treat one free-form code as a candidate for every identifier field.
    pub fn any_identifier(code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            project_id: Some(code.clone()),
            project_code: Some(code.clone()),
            abemis_id: Some(code.clone()),
            qr_reference: Some(code),
        }
    }
}

fn candidate(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// Resolve the project a payload refers to.
///
/// Builds a lowercase, trimmed candidate set from whichever payload fields
/// are present and returns the first project whose own reference set
/// (`abemisId`, `projectCode`, `qrReference`, `id`) intersects it. An empty
/// candidate set fails immediately without scanning. When duplicate external
/// ids make several projects match, the first in list order wins; that
/// non-determinism is accepted because `projectCode` uniqueness is the
/// server's invariant.
pub fn resolve_project<'a>(
    projects: &'a [ProjectRecord],
    payload: &AttachPayload,
) -> Option<&'a ProjectRecord> {
    let candidates: Vec<String> = [
        candidate(payload.project_id.as_deref()),
        candidate(payload.project_code.as_deref()),
        candidate(payload.abemis_id.as_deref()),
        candidate(payload.qr_reference.as_deref()),
    ]
    .into_iter()
    .flatten()
    .collect();

    if candidates.is_empty() {
        return None;
    }

    projects.iter().find(|project| {
        [
            candidate(project.abemis_id.as_deref()),
            candidate(Some(project.project_code.as_str())),
            candidate(project.qr_reference.as_deref()),
            candidate(Some(project.id.as_str())),
        ]
        .into_iter()
        .flatten()
        .any(|reference| candidates.contains(&reference))
    })
}
