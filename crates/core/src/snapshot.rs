//! The offline snapshot aggregate and its normalization pass.

use serde::{Deserialize, Serialize};

use crate::forms::FormRecord;
use crate::projects::ProjectRecord;

/// Schema version written alongside the persisted snapshot document.
/// Version 1 predates the `title` rename and relied on read-time fix-ups.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 2;

/// The aggregate root of local persistence: all projects plus every form not
/// yet linked to a project. Reads and writes always operate on the whole
/// aggregate, never on individual sub-records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineSnapshot {
    #[serde(default)]
    pub projects: Vec<ProjectRecord>,
    #[serde(default)]
    pub standalone_drafts: Vec<FormRecord>,
}

impl OfflineSnapshot {
    /// Reconcile schema drift so callers never special-case it.
    ///
    /// Legacy key renames are handled by serde aliases at decode time; this
    /// pass repairs the relational fields inside the aggregate: every form
    /// embedded in a project carries that project's id, and inherits the
    /// project's external identifiers when it has none of its own.
    pub fn normalize(mut self) -> Self {
        for project in &mut self.projects {
            for form in &mut project.forms {
                if form.linked_project_id.as_deref() != Some(project.id.as_str()) {
                    form.linked_project_id = Some(project.id.clone());
                }
                if form.abemis_id.is_none() {
                    form.abemis_id = project.abemis_id.clone();
                }
                if form.qr_reference.is_none() {
                    form.qr_reference = project.qr_reference.clone();
                }
            }
        }
        for draft in &mut self.standalone_drafts {
            draft.linked_project_id = None;
        }
        self
    }

    /// Look up a form wherever it currently lives: standalone drafts first,
    /// then every project's embedded forms.
    pub fn find_form(&self, form_id: &str) -> Option<&FormRecord> {
        self.standalone_drafts
            .iter()
            .find(|record| record.id == form_id)
            .or_else(|| {
                self.projects
                    .iter()
                    .flat_map(|project| project.forms.iter())
                    .find(|record| record.id == form_id)
            })
    }
}
