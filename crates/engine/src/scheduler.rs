//! Background reconciliation: drains the sync queue and pulls incremental
//! remote changes, woken by a timer and by platform events.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{interval, Duration, MissedTickBehavior};

use fieldsync_core::{
    AttachPayload, ClientFormPayload, SyncOperation, SyncOperationType,
    SYNC_FOREGROUND_INTERVAL_SECS,
};
use fieldsync_remote::{ApiRetryClass, RemoteSyncError, SyncApi};

use crate::context::{SyncContext, SyncRuntimeState};
use crate::errors::Result;

/// Storage key of the incremental-pull watermark (epoch milliseconds).
pub const LAST_FORMS_SYNC_KEY: &str = "last_forms_sync_at";

/// Wake-up source for a reconciliation cycle. All triggers funnel into the
/// same cycle logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Periodic,
    Reconnected,
    Foregrounded,
    Manual,
}

/// Outcome class of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCycleStatus {
    Completed,
    Offline,
    NoSession,
}

/// Lightweight cycle metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCycleReport {
    pub status: SyncCycleStatus,
    pub sent_count: usize,
    pub dropped_count: usize,
    pub pulled_count: usize,
}

impl SyncCycleReport {
    fn skipped(status: SyncCycleStatus) -> Self {
        Self {
            status,
            sent_count: 0,
            dropped_count: 0,
            pulled_count: 0,
        }
    }
}

/// Attempt one queued operation against the server.
async fn dispatch_operation(
    remote: &dyn SyncApi,
    token: &str,
    op: &SyncOperation,
) -> std::result::Result<(), RemoteSyncError> {
    match op.op {
        SyncOperationType::Create | SyncOperationType::Update => {
            let payload: ClientFormPayload = serde_json::from_value(op.payload.clone())?;
            remote.upsert_forms(token, vec![payload]).await.map(|_| ())
        }
        SyncOperationType::Attach => {
            let payload: AttachPayload = serde_json::from_value(op.payload.clone())?;
            remote
                .attach_form(token, &op.form_id, &payload)
                .await
                .map(|_| ())
        }
        SyncOperationType::Delete => remote.delete_form(token, &op.form_id).await,
    }
}

async fn read_watermark(context: &SyncContext) -> Result<i64> {
    let raw = context.kv().get_item(LAST_FORMS_SYNC_KEY).await?;
    Ok(raw.and_then(|value| value.parse::<i64>().ok()).unwrap_or(0))
}

/// Run one reconciliation cycle: connectivity gate, queue drain, then the
/// incremental pull. Only persistence failures escape; everything the server
/// can do wrong is handled per operation.
pub async fn perform_background_sync(
    context: &SyncContext,
    refresh_tx: &watch::Sender<u64>,
) -> Result<SyncCycleReport> {
    if !context.connectivity().is_connected() {
        debug!("[Scheduler] offline, skipping sync cycle");
        return Ok(SyncCycleReport::skipped(SyncCycleStatus::Offline));
    }
    let Some(token) = context.session().access_token() else {
        debug!("[Scheduler] no session, skipping sync cycle");
        return Ok(SyncCycleReport::skipped(SyncCycleStatus::NoSession));
    };

    // Drain phase. The list is snapshotted here; operations enqueued while
    // the drain runs wait for the next cycle, so nothing is processed twice
    // concurrently. One failing operation never blocks the rest.
    let queue = context.queue();
    let pending = queue.list().await?;
    let mut sent_count = 0;
    let mut dropped_count = 0;
    for op in pending {
        if op.is_exhausted() {
            warn!(
                "[Scheduler] dropping {:?} operation {} for form {} after {} attempts",
                op.op, op.id, op.form_id, op.retries
            );
            queue.remove(&op.id).await?;
            queue.record_failed(op).await?;
            dropped_count += 1;
            continue;
        }
        match dispatch_operation(context.remote().as_ref(), &token, &op).await {
            Ok(()) => {
                queue.remove(&op.id).await?;
                sent_count += 1;
            }
            Err(err) if err.retry_class() == ApiRetryClass::Permanent => {
                // Retrying a rejected payload cannot succeed; it goes to
                // the failed list on the first refusal.
                warn!(
                    "[Scheduler] {:?} operation {} permanently rejected: {}",
                    op.op, op.id, err
                );
                queue.remove(&op.id).await?;
                queue.record_failed(op).await?;
                dropped_count += 1;
            }
            Err(err) => {
                debug!(
                    "[Scheduler] {:?} operation {} failed (attempt {}): {}",
                    op.op,
                    op.id,
                    op.retries + 1,
                    err
                );
                queue.increment_retry(&op.id).await?;
            }
        }
    }

    // Incremental pull phase. A remote failure here is logged and does not
    // affect the drain's outcome; the watermark only ever moves forward.
    let mut pulled_count = 0;
    let since = read_watermark(context).await?;
    match context.remote().pull_forms_since(&token, since).await {
        Ok(forms) if !forms.is_empty() => {
            let store = context.snapshot_store();
            for form in forms {
                if store.merge_remote_form(form).await?.is_some() {
                    pulled_count += 1;
                }
            }
            let now_ms = Utc::now().timestamp_millis();
            context
                .kv()
                .set_item(LAST_FORMS_SYNC_KEY, &now_ms.to_string())
                .await?;
            refresh_tx.send_modify(|seq| *seq += 1);
        }
        Ok(_) => {}
        Err(err) => {
            warn!("[Scheduler] incremental pull failed: {}", err);
        }
    }

    Ok(SyncCycleReport {
        status: SyncCycleStatus::Completed,
        sent_count,
        dropped_count,
        pulled_count,
    })
}

/// Clonable trigger feed for platform bridges (network monitor, app
/// lifecycle) and manual refresh buttons.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SyncTrigger>,
}

impl SchedulerHandle {
    fn send(&self, trigger: SyncTrigger) {
        // A closed channel just means the scheduler is gone.
        let _ = self.tx.send(trigger);
    }

    pub fn notify_reconnected(&self) {
        self.send(SyncTrigger::Reconnected);
    }

    pub fn notify_foregrounded(&self) {
        self.send(SyncTrigger::Foregrounded);
    }

    pub fn request_sync(&self) {
        self.send(SyncTrigger::Manual);
    }
}

/// Owns the single background task that serves every trigger source.
pub struct BackgroundSyncScheduler {
    context: Arc<SyncContext>,
    runtime: Arc<SyncRuntimeState>,
    triggers_tx: mpsc::UnboundedSender<SyncTrigger>,
    triggers_rx: Arc<Mutex<mpsc::UnboundedReceiver<SyncTrigger>>>,
    refresh_tx: watch::Sender<u64>,
    refresh_rx: watch::Receiver<u64>,
}

impl BackgroundSyncScheduler {
    pub fn new(context: Arc<SyncContext>) -> Self {
        let (triggers_tx, triggers_rx) = mpsc::unbounded_channel();
        let (refresh_tx, refresh_rx) = watch::channel(0);
        Self {
            context,
            runtime: Arc::new(SyncRuntimeState::default()),
            triggers_tx,
            triggers_rx: Arc::new(Mutex::new(triggers_rx)),
            refresh_tx,
            refresh_rx,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            tx: self.triggers_tx.clone(),
        }
    }

    /// Channel bumped after a pull folded remote changes into the snapshot;
    /// the orchestrator listens on this to refresh its view.
    pub fn subscribe_remote_changes(&self) -> watch::Receiver<u64> {
        self.refresh_rx.clone()
    }

    /// Run one cycle immediately, serialized against the background loop.
    pub async fn run_cycle_now(&self) -> Result<SyncCycleReport> {
        let _cycle = self.runtime.cycle_lock.lock().await;
        perform_background_sync(&self.context, &self.refresh_tx).await
    }

    /// Spawn the background loop. The first periodic tick fires immediately,
    /// so startup gets a reconciliation pass without waiting a full interval.
    pub async fn start(&self) {
        let mut guard = self.runtime.background_task.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
            guard.take();
        }

        let context = Arc::clone(&self.context);
        let runtime = Arc::clone(&self.runtime);
        let triggers_rx = Arc::clone(&self.triggers_rx);
        let refresh_tx = self.refresh_tx.clone();

        let handle = tokio::spawn(async move {
            let mut rx = triggers_rx.lock().await;
            let mut ticker = interval(Duration::from_secs(SYNC_FOREGROUND_INTERVAL_SECS));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let trigger = tokio::select! {
                    _ = ticker.tick() => SyncTrigger::Periodic,
                    received = rx.recv() => match received {
                        Some(trigger) => trigger,
                        None => break,
                    },
                };

                // Overlapping wake-ups coalesce onto the running cycle
                // instead of stacking concurrent passes.
                let Ok(_cycle) = runtime.cycle_lock.try_lock() else {
                    debug!("[Scheduler] cycle in flight, coalescing {:?} trigger", trigger);
                    continue;
                };
                debug!("[Scheduler] waking for {:?} trigger", trigger);
                match perform_background_sync(&context, &refresh_tx).await {
                    Ok(report) => debug!(
                        "[Scheduler] cycle complete status={:?} sent={} dropped={} pulled={}",
                        report.status, report.sent_count, report.dropped_count, report.pulled_count
                    ),
                    Err(err) => warn!("[Scheduler] cycle failed: {}", err),
                }
            }
        });
        *guard = Some(handle);
    }

    pub async fn stop(&self) {
        let mut guard = self.runtime.background_task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{synced_record, test_context, MockSyncApi};
    use fieldsync_core::{FormRecord, ValidationForm, MAX_RETRIES};
    use serde_json::json;

    fn create_payload(id: &str) -> serde_json::Value {
        let record = FormRecord::new_draft(id, "Annex E", ValidationForm::default());
        serde_json::to_value(ClientFormPayload::from(&record)).expect("payload")
    }

    #[tokio::test]
    async fn retry_bound_scenario_drops_after_max_retries() {
        let api = Arc::new(MockSyncApi::default());
        api.fail_form("f1");
        let context = test_context(Arc::clone(&api), true, true);
        let (refresh_tx, _refresh_rx) = watch::channel(0);

        let op1 = context
            .queue()
            .enqueue(SyncOperationType::Create, "f1", create_payload("f1"))
            .await
            .expect("enqueue op1");
        // op1 already failed twice in prior cycles.
        for _ in 0..2 {
            context
                .queue()
                .increment_retry(&op1.id)
                .await
                .expect("retry");
        }
        context
            .queue()
            .enqueue(SyncOperationType::Create, "f2", create_payload("f2"))
            .await
            .expect("enqueue op2");

        // First drain: op1 fails a third time, op2 succeeds.
        let report = perform_background_sync(&context, &refresh_tx)
            .await
            .expect("cycle");
        assert_eq!(report.status, SyncCycleStatus::Completed);
        assert_eq!(report.sent_count, 1);
        assert_eq!(report.dropped_count, 0);
        let remaining = context.queue().list().await.expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].form_id, "f1");
        assert_eq!(remaining[0].retries, MAX_RETRIES);

        // Second drain: op1 is dropped without a fourth attempt.
        let report = perform_background_sync(&context, &refresh_tx)
            .await
            .expect("cycle");
        assert_eq!(report.dropped_count, 1);
        assert!(context.queue().list().await.expect("list").is_empty());
        let failed = context.queue().list_failed().await.expect("failed");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].form_id, "f1");

        let attempts = api
            .calls()
            .iter()
            .filter(|call| call.as_str() == "upsert:f1")
            .count();
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn permanent_rejection_goes_straight_to_the_failed_list() {
        let api = Arc::new(MockSyncApi::default());
        api.reject_form("f1");
        let context = test_context(Arc::clone(&api), true, true);
        let (refresh_tx, _refresh_rx) = watch::channel(0);

        context
            .queue()
            .enqueue(SyncOperationType::Create, "f1", create_payload("f1"))
            .await
            .expect("enqueue");

        let report = perform_background_sync(&context, &refresh_tx)
            .await
            .expect("cycle");
        assert_eq!(report.dropped_count, 1);
        assert!(context.queue().list().await.expect("list").is_empty());

        let failed = context.queue().list_failed().await.expect("failed");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].form_id, "f1");
        assert_eq!(failed[0].retries, 0, "no retries were spent on it");

        let attempts = api
            .calls()
            .iter()
            .filter(|call| call.as_str() == "upsert:f1")
            .count();
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn transient_failure_recovers_on_a_later_cycle() {
        let api = Arc::new(MockSyncApi::default());
        api.fail_form("f1");
        let context = test_context(Arc::clone(&api), true, true);
        let (refresh_tx, _refresh_rx) = watch::channel(0);

        context
            .queue()
            .enqueue(SyncOperationType::Create, "f1", create_payload("f1"))
            .await
            .expect("enqueue");

        let report = perform_background_sync(&context, &refresh_tx)
            .await
            .expect("cycle");
        assert_eq!(report.sent_count, 0);
        let pending = context.queue().list().await.expect("list");
        assert_eq!(pending[0].retries, 1);

        // Server recovers; the next cycle delivers the held operation.
        api.clear_failures();
        let report = perform_background_sync(&context, &refresh_tx)
            .await
            .expect("cycle");
        assert_eq!(report.sent_count, 1);
        assert!(context.queue().list().await.expect("list").is_empty());
        assert!(context.queue().list_failed().await.expect("failed").is_empty());
    }

    #[tokio::test]
    async fn offline_cycle_is_a_no_op() {
        let api = Arc::new(MockSyncApi::default());
        let context = test_context(Arc::clone(&api), false, true);
        let (refresh_tx, _refresh_rx) = watch::channel(0);

        context
            .queue()
            .enqueue(SyncOperationType::Delete, "f1", json!({}))
            .await
            .expect("enqueue");

        let report = perform_background_sync(&context, &refresh_tx)
            .await
            .expect("cycle");
        assert_eq!(report.status, SyncCycleStatus::Offline);
        assert_eq!(context.queue().count().await.expect("count"), 1);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn cycle_without_session_is_skipped() {
        let api = Arc::new(MockSyncApi::default());
        let context = test_context(Arc::clone(&api), true, false);
        let (refresh_tx, _refresh_rx) = watch::channel(0);

        let report = perform_background_sync(&context, &refresh_tx)
            .await
            .expect("cycle");
        assert_eq!(report.status, SyncCycleStatus::NoSession);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn drain_preserves_fifo_order() {
        let api = Arc::new(MockSyncApi::default());
        let context = test_context(Arc::clone(&api), true, true);
        let (refresh_tx, _refresh_rx) = watch::channel(0);

        for id in ["a", "b", "c"] {
            context
                .queue()
                .enqueue(SyncOperationType::Create, id, create_payload(id))
                .await
                .expect("enqueue");
        }
        perform_background_sync(&context, &refresh_tx)
            .await
            .expect("cycle");

        let upserts: Vec<String> = api
            .calls()
            .into_iter()
            .filter(|call| call.starts_with("upsert:"))
            .collect();
        assert_eq!(upserts, vec!["upsert:a", "upsert:b", "upsert:c"]);
        assert_eq!(context.queue().count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn pull_folds_forms_advances_watermark_and_notifies() {
        let api = Arc::new(MockSyncApi::default());
        api.set_pull(vec![synced_record("remote-1")]);
        let context = test_context(Arc::clone(&api), true, true);
        let (refresh_tx, mut refresh_rx) = watch::channel(0);

        let report = perform_background_sync(&context, &refresh_tx)
            .await
            .expect("cycle");
        assert_eq!(report.pulled_count, 1);
        assert!(refresh_rx.has_changed().expect("watch alive"));
        refresh_rx.mark_unchanged();

        assert!(api.calls().contains(&"pull:0".to_string()));
        let watermark = context
            .kv()
            .get_item(LAST_FORMS_SYNC_KEY)
            .await
            .expect("get")
            .expect("set")
            .parse::<i64>()
            .expect("millis");
        assert!(watermark > 0);

        let snapshot = context.snapshot_store().load().await.expect("load");
        assert!(snapshot.find_form("remote-1").is_some());

        // Empty pull: watermark stands, no notification.
        api.set_pull(vec![]);
        let report = perform_background_sync(&context, &refresh_tx)
            .await
            .expect("cycle");
        assert_eq!(report.pulled_count, 0);
        assert!(!refresh_rx.has_changed().expect("watch alive"));
        let unchanged = context
            .kv()
            .get_item(LAST_FORMS_SYNC_KEY)
            .await
            .expect("get")
            .expect("set")
            .parse::<i64>()
            .expect("millis");
        assert_eq!(unchanged, watermark);
    }

    #[tokio::test]
    async fn operations_enqueued_mid_drain_wait_for_the_next_cycle() {
        let api = Arc::new(MockSyncApi::default());
        let context = test_context(Arc::clone(&api), true, true);
        let (refresh_tx, _refresh_rx) = watch::channel(0);

        context
            .queue()
            .enqueue(SyncOperationType::Create, "a", create_payload("a"))
            .await
            .expect("enqueue");
        api.enqueue_mid_drain(context.queue());

        let report = perform_background_sync(&context, &refresh_tx)
            .await
            .expect("cycle");
        assert_eq!(report.sent_count, 1);
        assert!(!api.calls().contains(&"upsert:late".to_string()));

        let pending = context.queue().list().await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].form_id, "late");
        assert_eq!(pending[0].retries, 0);
    }

    #[tokio::test]
    async fn start_runs_a_cycle_without_waiting_a_full_interval() {
        let api = Arc::new(MockSyncApi::default());
        let context = test_context(Arc::clone(&api), true, true);
        let scheduler = BackgroundSyncScheduler::new(context);

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;

        assert!(api.calls().contains(&"pull:0".to_string()));
    }

    #[tokio::test]
    async fn manual_cycle_notifies_remote_change_subscribers() {
        let api = Arc::new(MockSyncApi::default());
        api.set_pull(vec![synced_record("remote-1")]);
        let context = test_context(Arc::clone(&api), true, true);
        let scheduler = BackgroundSyncScheduler::new(context);
        let mut remote_changes = scheduler.subscribe_remote_changes();

        let report = scheduler.run_cycle_now().await.expect("cycle");
        assert_eq!(report.status, SyncCycleStatus::Completed);
        assert_eq!(report.pulled_count, 1);
        assert!(remote_changes.has_changed().expect("watch alive"));
    }

    #[tokio::test]
    async fn pull_failure_does_not_affect_drain_outcome() {
        let api = Arc::new(MockSyncApi::default());
        api.fail_pull();
        let context = test_context(Arc::clone(&api), true, true);
        let (refresh_tx, _refresh_rx) = watch::channel(0);

        context
            .queue()
            .enqueue(SyncOperationType::Create, "f1", create_payload("f1"))
            .await
            .expect("enqueue");

        let report = perform_background_sync(&context, &refresh_tx)
            .await
            .expect("cycle");
        assert_eq!(report.status, SyncCycleStatus::Completed);
        assert_eq!(report.sent_count, 1);
        assert_eq!(report.pulled_count, 0);
    }
}
