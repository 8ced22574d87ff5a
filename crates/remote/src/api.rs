//! Trait seam over the server's sync endpoints.

use async_trait::async_trait;

use fieldsync_core::{AttachPayload, ClientFormPayload, FormRecord, OfflineSnapshot};

use crate::error::Result;

/// The five server operations the offline core consumes. The scheduler and
/// orchestrator depend on this trait, never on the concrete HTTP client, so
/// reconciliation logic is testable against a scripted mock.
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// Full authoritative snapshot.
    async fn fetch_snapshot(&self, token: &str) -> Result<OfflineSnapshot>;

    /// Forms updated since the given epoch-millisecond watermark.
    async fn pull_forms_since(&self, token: &str, since_ms: i64) -> Result<Vec<FormRecord>>;

    /// Batch upsert of locally edited forms.
    async fn upsert_forms(
        &self,
        token: &str,
        forms: Vec<ClientFormPayload>,
    ) -> Result<Vec<FormRecord>>;

    /// Server-side attach, mirroring the local resolver's precedence.
    async fn attach_form(
        &self,
        token: &str,
        form_id: &str,
        payload: &AttachPayload,
    ) -> Result<FormRecord>;

    async fn delete_form(&self, token: &str, form_id: &str) -> Result<()>;
}
