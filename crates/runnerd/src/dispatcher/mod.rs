/*
 *  Copyright 2025-2026 Runnerd Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Dispatcher: wires the Queue Store, Retry Engine, and Executor Output
//! Stream into the actual claim/execute/retry loop, plus the background
//! sweepers that recover stale tasks and time out abandoned awaits.
//!
//! Work notification follows the same shape as a SQLite-backed work
//! distributor: no LISTEN/NOTIFY is available, so the loop wakes on a
//! short poll interval, with an immediate wake on `notify_work` when the
//! caller already knows a task was just enqueued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};

use crate::models::retry::RetryHistory;
use crate::models::task::{Task, TaskStatus};
use crate::queue::{ClaimOutcome, QueueStore};
use crate::retry::{EscalationReport, RetryConfig, RetryDecision, RetryEvent, RetryManager, TaskResult};
use crate::stream::OutputStream;

/// Pluggable execution strategy. Production code wires this to the
/// Process Supervisor driving a real executor binary; tests use a stub.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task, output: &OutputStream) -> TaskResult;
}

struct PerTaskRetryState {
    histories: Mutex<std::collections::HashMap<String, RetryHistory>>,
}

impl PerTaskRetryState {
    fn new() -> Self {
        Self {
            histories: Mutex::new(std::collections::HashMap::new()),
        }
    }
}

pub struct Dispatcher {
    queue: QueueStore,
    namespace: String,
    claim_batch_size: usize,
    poll_interval: Duration,
    notify: Arc<Notify>,
    shutdown: Arc<AtomicBool>,
    /// Guarantees single-flight claiming: only one in-flight claim loop
    /// per namespace, even if `spawn_claim_loop` is called twice.
    claim_lock: Arc<Mutex<()>>,
    retry_manager: RetryManager,
    /// Holds the `EscalationReport` the manager's sink just produced, so
    /// `run_one` can persist it without threading a return value through
    /// `record_and_decide`. Only ever holds at most one report at a time:
    /// `run_one` drains it immediately after the decision that filled it.
    escalation_slot: Arc<StdMutex<Option<EscalationReport>>>,
    retry_state: Arc<PerTaskRetryState>,
}

fn build_retry_manager(
    config: RetryConfig,
    escalation_slot: &Arc<StdMutex<Option<EscalationReport>>>,
) -> RetryManager {
    let slot = Arc::clone(escalation_slot);
    RetryManager::with_sink(
        config,
        Arc::new(move |event| {
            if let RetryEvent::EscalateDecision { report, .. } = event {
                if let Ok(mut guard) = slot.lock() {
                    *guard = Some(report);
                }
            }
        }),
    )
}

impl Dispatcher {
    pub fn new(queue: QueueStore, namespace: impl Into<String>, claim_batch_size: usize) -> Self {
        let escalation_slot: Arc<StdMutex<Option<EscalationReport>>> = Arc::new(StdMutex::new(None));
        let retry_manager = build_retry_manager(RetryConfig::default(), &escalation_slot);
        Self {
            queue,
            namespace: namespace.into(),
            claim_batch_size,
            poll_interval: Duration::from_millis(500),
            notify: Arc::new(Notify::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            claim_lock: Arc::new(Mutex::new(())),
            retry_manager,
            escalation_slot,
            retry_state: Arc::new(PerTaskRetryState::new()),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_manager = build_retry_manager(config, &self.escalation_slot);
        self
    }

    /// Wakes the claim loop immediately instead of waiting for the next
    /// poll tick. Call this right after `QueueStore::enqueue`.
    pub fn notify_work(&self) {
        self.notify.notify_one();
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Runs the claim/execute/retry loop until `shutdown()` is called.
    /// If a previous call to this method is still running, this call
    /// returns immediately without doing anything (single-flight).
    pub async fn run_claim_loop(&self, executor: Arc<dyn TaskExecutor>, output: OutputStream) {
        let Ok(_guard) = self.claim_lock.try_lock() else {
            warn!(namespace = %self.namespace, "claim loop already running, skipping duplicate spawn");
            return;
        };

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.queue.claim(&self.namespace, self.claim_batch_size as i64).await {
                Ok(ClaimOutcome::Claimed(task)) => {
                    self.run_one(task, Arc::clone(&executor), output.clone()).await;
                    // Keep draining without waiting if more work might be queued.
                    continue;
                }
                Ok(ClaimOutcome::NoneAvailable) => {}
                Err(e) => error!(error = %e, "claim failed"),
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn run_one(&self, task: Task, executor: Arc<dyn TaskExecutor>, output: OutputStream) {
        let task_id = task.task_id;
        let result = executor.execute(&task, &output).await;

        let mut histories = self.retry_state.histories.lock().await;
        let history = histories
            .entry(task_id.to_string())
            .or_insert_with(|| RetryHistory::empty(task_id, None));
        let decision = self
            .retry_manager
            .record_and_decide(history, &result, result.error.clone(), 0);
        drop(histories);

        match decision {
            RetryDecision::Pass => {
                let _ = self
                    .queue
                    .update_status_with_validation(task_id, TaskStatus::Complete, None, result.output)
                    .await;
            }
            RetryDecision::Retry { .. } => {
                let _ = self
                    .queue
                    .update_status_with_validation(task_id, TaskStatus::Queued, result.error, None)
                    .await;
                self.notify_work();
            }
            RetryDecision::Escalate { reason, .. } => {
                info!(task_id = %task_id, reason = reason.as_str(), "escalating task");
                let report = self.escalation_slot.lock().unwrap().take();
                let error_message = match &report {
                    Some(report) => {
                        serde_json::to_string(report).unwrap_or_else(|_| report.user_message.clone())
                    }
                    None => format!("escalated: {}", reason.as_str()),
                };
                let _ = self
                    .queue
                    .update_status_with_validation(task_id, TaskStatus::Error, Some(error_message), None)
                    .await;
                self.retry_manager.mark_escalated(task_id);
            }
        }
    }

    /// Periodically recovers RUNNING tasks that have been silent past
    /// `max_age_ms`.
    pub async fn run_stale_sweeper(&self, max_age_ms: i64, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        while !self.shutdown.load(Ordering::SeqCst) {
            ticker.tick().await;
            match self.queue.recover_stale_tasks(max_age_ms).await {
                Ok(0) => {}
                Ok(n) => debug!(recovered = n, "swept stale running tasks"),
                Err(e) => error!(error = %e, "stale sweep failed"),
            }
        }
    }

    /// Periodically fails AWAITING_RESPONSE tasks that timed out waiting
    /// for a human. The dispatcher owns this policy; the Queue Store only
    /// exposes the primitive transition.
    pub async fn run_awaiting_response_sweeper(&self, max_age_ms: i64, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        while !self.shutdown.load(Ordering::SeqCst) {
            ticker.tick().await;
            match self.queue.recover_stale_awaiting_response(max_age_ms).await {
                Ok(0) => {}
                Ok(n) => debug!(recovered = n, "swept stale awaiting-response tasks"),
                Err(e) => error!(error = %e, "awaiting-response sweep failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connection::test_database;
    use crate::models::task::TaskType;
    use crate::retry::classify::{ResultStatus, TaskResult};
    use std::sync::atomic::AtomicUsize;

    struct AlwaysPass;

    #[async_trait]
    impl TaskExecutor for AlwaysPass {
        async fn execute(&self, _task: &Task, _output: &OutputStream) -> TaskResult {
            TaskResult::pass()
        }
    }

    struct CountingFailThenPass {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskExecutor for CountingFailThenPass {
        async fn execute(&self, _task: &Task, _output: &OutputStream) -> TaskResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                TaskResult {
                    status: ResultStatus::Error,
                    output: None,
                    error: Some("HTTP 503 transient".to_string()),
                    quality_results: Vec::new(),
                    detected_issues: Vec::new(),
                }
            } else {
                TaskResult::pass()
            }
        }
    }

    #[tokio::test]
    async fn claimed_task_completes_on_pass() {
        let queue = QueueStore::new(test_database().await);
        let task = queue.enqueue("ns", "s", "g", "hi", TaskType::ReadInfo).await.unwrap();
        let dispatcher = Dispatcher::new(queue.clone(), "ns", 10).with_poll_interval(Duration::from_millis(10));

        let claimed = match queue.claim("ns", 10).await.unwrap() {
            ClaimOutcome::Claimed(t) => t,
            ClaimOutcome::NoneAvailable => panic!("expected claim"),
        };
        dispatcher.run_one(claimed, Arc::new(AlwaysPass), OutputStream::new()).await;

        let reread = queue.get_item("ns", task.task_id).await.unwrap();
        assert_eq!(reread.status, TaskStatus::Complete);
    }

    #[tokio::test]
    async fn transient_failure_requeues_for_retry() {
        let queue = QueueStore::new(test_database().await);
        let task = queue.enqueue("ns", "s", "g", "hi", TaskType::ReadInfo).await.unwrap();
        let dispatcher = Dispatcher::new(queue.clone(), "ns", 10);

        let claimed = match queue.claim("ns", 10).await.unwrap() {
            ClaimOutcome::Claimed(t) => t,
            ClaimOutcome::NoneAvailable => panic!("expected claim"),
        };
        let executor = Arc::new(CountingFailThenPass { calls: AtomicUsize::new(0) });
        dispatcher.run_one(claimed, executor, OutputStream::new()).await;

        let reread = queue.get_item("ns", task.task_id).await.unwrap();
        assert_eq!(reread.status, TaskStatus::Queued);
    }

    struct AlwaysFatal;

    #[async_trait]
    impl TaskExecutor for AlwaysFatal {
        async fn execute(&self, _task: &Task, _output: &OutputStream) -> TaskResult {
            TaskResult {
                status: ResultStatus::Error,
                output: None,
                error: Some("401 unauthorized".to_string()),
                quality_results: Vec::new(),
                detected_issues: Vec::new(),
            }
        }
    }

    #[tokio::test]
    async fn escalation_persists_a_full_report_not_a_bare_string() {
        let queue = QueueStore::new(test_database().await);
        let task = queue.enqueue("ns", "s", "g", "hi", TaskType::ReadInfo).await.unwrap();
        let dispatcher = Dispatcher::new(queue.clone(), "ns", 10);

        let claimed = match queue.claim("ns", 10).await.unwrap() {
            ClaimOutcome::Claimed(t) => t,
            ClaimOutcome::NoneAvailable => panic!("expected claim"),
        };
        dispatcher.run_one(claimed, Arc::new(AlwaysFatal), OutputStream::new()).await;

        let reread = queue.get_item("ns", task.task_id).await.unwrap();
        assert_eq!(reread.status, TaskStatus::Error);
        let error_message = reread.error_message.expect("escalation must set an error message");
        let report: crate::retry::EscalationReport =
            serde_json::from_str(&error_message).expect("error_message must be a serialized EscalationReport");
        assert_eq!(report.reason, crate::retry::EscalationReason::FatalError);
        assert!(report.recommended_actions.contains(&"re-set API key".to_string()));
    }

    #[tokio::test]
    async fn second_claim_loop_is_a_noop_while_first_runs() {
        let queue = QueueStore::new(test_database().await);
        let dispatcher = Arc::new(Dispatcher::new(queue, "ns", 10).with_poll_interval(Duration::from_millis(20)));
        let d1 = Arc::clone(&dispatcher);
        let d2 = Arc::clone(&dispatcher);

        let h1 = tokio::spawn(async move {
            d1.run_claim_loop(Arc::new(AlwaysPass), OutputStream::new()).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        // This call observes the lock held and returns immediately.
        d2.run_claim_loop(Arc::new(AlwaysPass), OutputStream::new()).await;

        dispatcher.shutdown();
        h1.await.unwrap();
    }
}
