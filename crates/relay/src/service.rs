//! RelayService: transport-agnostic request/response correlation.
//!
//! This service owns:
//! - The pending queue (producer -> executor)
//! - The correlation store (executor -> producer)
//! - Executor liveness tracking
//! - Shutdown coordination for the server and the expiry sweeper
//!
//! Transports (HTTP, etc.) delegate to this service. It assumes a single
//! executor; several executors polling the same relay would share one FIFO
//! with no affinity.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use crate::liveness::{LivenessSnapshot, LivenessTracker};
use crate::queue::PendingQueue;
use crate::store::CorrelationStore;
use crate::version::VersionInfo;
use crate::work::{RelayResult, WorkItem};

#[derive(Debug, thiserror::Error)]
pub enum DepositError {
    #[error("No submit is waiting on work id {0}")]
    UnknownId(String),
}

/// Snapshot of relay state for the status endpoint.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub liveness: LivenessSnapshot,
    pub pending_count: usize,
    /// Submits currently waiting for a result.
    pub awaiting_count: usize,
    /// Results deposited but not yet taken (includes orphans).
    pub stored_results: usize,
    pub version: VersionInfo,
}

impl StatusSnapshot {
    pub fn executor_connected(&self) -> bool {
        self.liveness.connected
    }
}

/// Guard for an in-flight submit - abandons the work item on drop unless disarmed.
///
/// The waiter registration is always released on drop. While armed (the
/// submit future was dropped before finishing), the queued item is removed so
/// the executor never runs it, and any result that already arrived is
/// discarded.
struct SubmitGuard<'a> {
    work_id: String,
    armed: bool,
    service: &'a RelayService,
}

impl<'a> SubmitGuard<'a> {
    fn new(work_id: String, service: &'a RelayService) -> Self {
        Self {
            work_id,
            armed: true,
            service,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.service.store.unregister_waiter(&self.work_id);
        if self.armed {
            let withdrawn = self.service.queue.remove(&self.work_id);
            let discarded = self.service.store.try_take(&self.work_id).is_some();
            tracing::info!(
                work_id = %self.work_id,
                withdrawn,
                discarded,
                "Submit abandoned before completion"
            );
        }
    }
}

pub struct RelayService {
    config: RelayConfig,

    queue: PendingQueue,
    store: CorrelationStore,
    liveness: LivenessTracker,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    version: VersionInfo,
}

impl RelayService {
    pub fn new(config: RelayConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            queue: PendingQueue::new(),
            store: CorrelationStore::new(),
            liveness: LivenessTracker::new(),
            shutdown_tx,
            shutdown_rx,
            version: VersionInfo::new(),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Queue a payload for the executor and wait for its result.
    ///
    /// Always returns a result: the executor's own, or a synthesized timeout
    /// failure once `wait_timeout` elapses.
    pub async fn submit(&self, payload: String, label: String) -> RelayResult {
        let item = WorkItem::new(payload, label);
        let id = item.id.clone();

        // Register before enqueueing so an instant deposit still finds a waiter.
        let waiter = self.store.register_waiter(&id);
        tracing::debug!(work_id = %id, label = %item.label, "Queued work item");
        self.queue.enqueue(item);

        // If this future is dropped mid-wait (e.g. the producer's connection
        // closed), the guard withdraws the item and the waiter.
        let mut guard = SubmitGuard::new(id.clone(), self);

        let outcome =
            tokio::time::timeout(self.config.wait_timeout, self.wait_for_result(&id, &waiter))
                .await;
        guard.disarm();
        drop(guard);

        match outcome {
            Ok(result) => {
                tracing::debug!(work_id = %id, success = result.success, "Work item completed");
                result
            }
            Err(_) => self.finish_timed_out(id),
        }
    }

    /// Cleanup after the wait ceiling: withdraw the item and synthesize a
    /// timeout, unless a result landed between the deadline and this call.
    fn finish_timed_out(&self, id: String) -> RelayResult {
        let dequeued = !self.queue.remove(&id);
        if let Some(result) = self.store.try_take(&id) {
            tracing::debug!(work_id = %id, "Result arrived at the wait ceiling");
            return result;
        }
        tracing::warn!(
            work_id = %id,
            dequeued,
            timeout_secs = self.config.wait_timeout.as_secs_f64(),
            "Executor did not respond before the wait ceiling"
        );
        RelayResult::timed_out(id)
    }

    async fn wait_for_result(&self, id: &str, waiter: &Notify) -> RelayResult {
        loop {
            if let Some(result) = self.store.try_take(id) {
                return result;
            }
            tokio::select! {
                _ = waiter.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Hand the next work item to the executor, if any.
    ///
    /// Every call counts as an executor sighting, even when the queue is empty.
    pub fn dequeue(&self) -> Option<WorkItem> {
        self.liveness.touch();
        let item = self.queue.try_dequeue();
        if let Some(ref item) = item {
            tracing::debug!(work_id = %item.id, label = %item.label, "Dispatched work item");
        }
        item
    }

    /// Store a result reported by the executor.
    ///
    /// Returns whether a submit was waiting on the id. Unknown ids are
    /// accepted and left for the expiry sweep unless strict deposits are on.
    pub fn deposit(&self, result: RelayResult) -> Result<bool, DepositError> {
        let id = result.id.clone();
        let awaited = self.store.is_awaited(&id);

        if !awaited {
            if self.config.reject_unknown_deposits {
                tracing::warn!(work_id = %id, "Rejected result for unknown work id");
                return Err(DepositError::UnknownId(id));
            }
            tracing::warn!(work_id = %id, "Stored result with no waiting submit");
        }

        Ok(self.store.put(id, result) || awaited)
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            liveness: self.liveness.snapshot(self.config.staleness_threshold),
            pending_count: self.queue.len(),
            awaiting_count: self.store.awaiting(),
            stored_results: self.store.len(),
            version: self.version.clone(),
        }
    }

    /// Purge unclaimed results older than the retention window.
    pub fn sweep_expired(&self) -> usize {
        let purged = self.store.purge_expired(self.config.result_retention());
        if purged > 0 {
            tracing::info!(purged, "Purged unclaimed results");
        }
        purged
    }

    /// Run `sweep_expired` every `sweep_interval` until shutdown is triggered.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_rx();
        let period = self.config.sweep_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        service.sweep_expired();
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::debug!("Result sweeper stopped");
                            return;
                        }
                    }
                }
            }
        })
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn test_config() -> RelayConfig {
        RelayConfig::default()
    }

    fn strict_config() -> RelayConfig {
        RelayConfig {
            reject_unknown_deposits: true,
            ..RelayConfig::default()
        }
    }

    /// Poll until a work item shows up, like an executor would.
    async fn next_item(service: &RelayService) -> WorkItem {
        loop {
            if let Some(item) = service.dequeue() {
                return item;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn submit_times_out_without_executor() {
        let service = RelayService::new(test_config());
        let started = tokio::time::Instant::now();

        let result = service
            .submit("return 1".to_string(), String::new())
            .await;

        let waited = started.elapsed();
        assert!(!result.success);
        assert!(result.timed_out);
        assert!(result.error.contains("didn't respond"));
        assert!(waited >= Duration::from_secs(30));
        assert!(waited <= Duration::from_secs(30) + Duration::from_millis(50));

        // Abandoned item is cleaned up, nothing left behind
        assert_eq!(service.status().pending_count, 0);
        assert_eq!(service.status().awaiting_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_returns_deposited_result() {
        let service = Arc::new(RelayService::new(test_config()));

        let executor = Arc::clone(&service);
        tokio::spawn(async move {
            let item = next_item(&executor).await;
            assert_eq!(item.payload, "return 42");
            tokio::time::sleep(Duration::from_secs(1)).await;
            executor
                .deposit(RelayResult::succeeded(item.id, "42"))
                .unwrap();
        });

        let started = tokio::time::Instant::now();
        let result = service
            .submit("return 42".to_string(), "answer".to_string())
            .await;

        assert!(result.success);
        assert!(!result.timed_out);
        assert_eq!(result.result, "42");
        assert!(started.elapsed() < Duration::from_millis(1100));

        // Consumed exactly once
        assert!(service.store.try_take(&result.id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn executor_failure_passes_through() {
        let service = Arc::new(RelayService::new(test_config()));

        let executor = Arc::clone(&service);
        tokio::spawn(async move {
            let item = next_item(&executor).await;
            executor
                .deposit(RelayResult::failed(item.id, "attempt to index nil"))
                .unwrap();
        });

        let result = service.submit("broken".to_string(), String::new()).await;
        assert!(!result.success);
        assert!(!result.timed_out);
        assert_eq!(result.error, "attempt to index nil");
    }

    #[tokio::test]
    async fn dequeue_empty_still_touches_liveness() {
        let service = RelayService::new(test_config());
        assert!(!service.status().executor_connected());

        assert!(service.dequeue().is_none());

        let status = service.status();
        assert!(status.executor_connected());
        assert!(status.liveness.since_last_seen.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_stale_executor() {
        let service = RelayService::new(test_config());
        service.dequeue();

        tokio::time::advance(Duration::from_secs(4)).await;

        let status = service.status();
        assert!(!status.executor_connected());
        assert!(status.liveness.since_last_seen.unwrap() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn status_counts_pending_and_awaiting() {
        let service = Arc::new(RelayService::new(test_config()));

        for i in 0..3 {
            let svc = Arc::clone(&service);
            tokio::spawn(async move { svc.submit(format!("job {i}"), String::new()).await });
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        let status = service.status();
        assert_eq!(status.pending_count, 3);
        assert_eq!(status.awaiting_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_submits_are_serviced_in_fifo_order() {
        let service = Arc::new(RelayService::new(test_config()));

        // Enqueue in a known order before the executor starts
        let mut submits = Vec::new();
        for i in 0..100 {
            let svc = Arc::clone(&service);
            submits.push(tokio::spawn(async move {
                let payload = format!("job {i}");
                let result = svc.submit(payload.clone(), String::new()).await;
                (payload, result)
            }));
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(service.status().pending_count, 100);

        let executor = Arc::clone(&service);
        let serviced = tokio::spawn(async move {
            let mut order = Vec::new();
            while order.len() < 100 {
                let item = next_item(&executor).await;
                tokio::time::sleep(Duration::from_millis(20)).await;
                order.push(item.payload.clone());
                executor
                    .deposit(RelayResult::succeeded(item.id, format!("done {}", item.payload)))
                    .unwrap();
            }
            order
        });

        let mut ids = HashSet::new();
        for submit in futures::future::join_all(submits).await {
            let (payload, result) = submit.unwrap();
            assert!(result.success, "{payload} timed out");
            assert_eq!(result.result, format!("done {payload}"));
            assert!(ids.insert(result.id));
        }

        let order = serviced.await.unwrap();
        let expected: Vec<String> = (0..100).map(|i| format!("job {i}")).collect();
        assert_eq!(order, expected);
    }

    #[tokio::test]
    async fn deposit_for_unknown_id_is_stored_by_default() {
        let service = RelayService::new(test_config());

        let awaited = service
            .deposit(RelayResult::succeeded("never-issued", "x"))
            .unwrap();

        assert!(!awaited);
        assert_eq!(service.status().stored_results, 1);
    }

    #[tokio::test]
    async fn strict_deposit_rejects_unknown_id() {
        let service = RelayService::new(strict_config());

        let err = service
            .deposit(RelayResult::succeeded("never-issued", "x"))
            .unwrap_err();

        assert!(matches!(err, DepositError::UnknownId(ref id) if id == "never-issued"));
        assert_eq!(service.status().stored_results, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn late_result_after_timeout_is_swept() {
        let service = Arc::new(RelayService::new(test_config()));

        let svc = Arc::clone(&service);
        let submit = tokio::spawn(async move { svc.submit("slow".into(), String::new()).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let item = service.dequeue().unwrap();

        let result = submit.await.unwrap();
        assert!(result.timed_out);

        // Executor finishes after the producer gave up
        let awaited = service.deposit(RelayResult::succeeded(item.id, "late")).unwrap();
        assert!(!awaited);
        assert_eq!(service.status().stored_results, 1);

        assert_eq!(service.sweep_expired(), 0);
        tokio::time::advance(service.config().result_retention()).await;
        assert_eq!(service.sweep_expired(), 1);
        assert_eq!(service.status().stored_results, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_submit_withdraws_item_and_waiter() {
        let service = Arc::new(RelayService::new(test_config()));

        let svc = Arc::clone(&service);
        let submit = tokio::spawn(async move { svc.submit("rm -rf".into(), String::new()).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(service.status().pending_count, 1);
        assert_eq!(service.status().awaiting_count, 1);

        submit.abort();
        assert!(submit.await.unwrap_err().is_cancelled());

        let status = service.status();
        assert_eq!(status.pending_count, 0);
        assert_eq!(status.awaiting_count, 0);
        assert!(service.dequeue().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_submit_discards_arrived_result() {
        let service = Arc::new(RelayService::new(test_config()));

        let svc = Arc::clone(&service);
        let submit = tokio::spawn(async move { svc.submit("slow".into(), String::new()).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let item = service.dequeue().unwrap();

        // Result lands, but the submit is dropped before it wakes up
        assert!(service.deposit(RelayResult::succeeded(item.id, "late")).unwrap());
        submit.abort();
        let _ = submit.await;

        assert_eq!(service.status().stored_results, 0);
        assert_eq!(service.status().awaiting_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn strict_deposit_rejects_id_of_dropped_submit() {
        let service = Arc::new(RelayService::new(strict_config()));

        let svc = Arc::clone(&service);
        let submit = tokio::spawn(async move { svc.submit("slow".into(), String::new()).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let item = service.dequeue().unwrap();

        submit.abort();
        let _ = submit.await;

        assert!(matches!(
            service.deposit(RelayResult::succeeded(item.id, "late")),
            Err(DepositError::UnknownId(_))
        ));
        assert_eq!(service.status().stored_results, 0);
    }

    #[tokio::test]
    async fn result_arriving_at_deadline_wins_over_timeout() {
        let service = RelayService::new(test_config());
        let item = WorkItem::new("return 1".into(), String::new());
        let id = item.id.clone();
        service.queue.enqueue(item);

        // Deposit lands after the deadline fired but before cleanup ran
        service.store.put(id.clone(), RelayResult::succeeded(id.clone(), "1"));

        let result = service.finish_timed_out(id.clone());
        assert_eq!(result, RelayResult::succeeded(id.clone(), "1"));
        assert_eq!(service.status().pending_count, 0);
        assert!(service.store.try_take(&id).is_none());
    }

    #[tokio::test]
    async fn deadline_without_result_synthesizes_timeout() {
        let service = RelayService::new(test_config());
        let item = WorkItem::new("return 1".into(), String::new());
        let id = item.id.clone();
        service.queue.enqueue(item);

        let result = service.finish_timed_out(id);
        assert!(result.timed_out);
        assert_eq!(service.status().pending_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_orphans_on_tick() {
        let service = Arc::new(RelayService::new(RelayConfig {
            wait_timeout: Duration::from_secs(1),
            result_grace: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(1),
            ..RelayConfig::default()
        }));
        let sweeper = service.spawn_sweeper();

        service
            .deposit(RelayResult::succeeded("orphan", "x"))
            .unwrap();
        assert_eq!(service.status().stored_results, 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(service.status().stored_results, 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(service.status().stored_results, 0);

        service.trigger_shutdown();
        sweeper.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_stops_on_shutdown() {
        let service = Arc::new(RelayService::new(test_config()));
        let sweeper = service.spawn_sweeper();

        service.trigger_shutdown();

        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_signal_works() {
        let svc = RelayService::new(test_config());
        let mut rx = svc.shutdown_rx();

        assert!(!*rx.borrow());

        svc.trigger_shutdown();
        rx.changed().await.unwrap();

        assert!(*rx.borrow());
    }
}
