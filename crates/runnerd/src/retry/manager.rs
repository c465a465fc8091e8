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

//! Stateful wrapper around `decide_retry`: records attempts into a
//! `RetryHistory` and emits `RetryEvent`s for observers (the dispatcher,
//! the activity log, the SSE surface).

use std::sync::Arc;

use crate::database::types::{RowId, Timestamp};
use crate::models::retry::{Attempt, AttemptStatus, RetryHistory};

use super::classify::{classify, FailureType, ResultStatus, TaskResult};
use super::decision::{decide_retry, RetryConfig, RetryDecision};
use super::escalation::{build_report, EscalationReport, FailureSummary};

/// Mirrors the lifecycle a single retry-eligible attempt moves through,
/// the way `ExecutionEventType` mirrors task/pipeline lifecycle events.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    RetryDecision { task_id: RowId, decision_summary: String },
    RetryStart { task_id: RowId, attempt_number: i32, delay_ms: u64 },
    RetrySuccess { task_id: RowId, attempt_number: i32 },
    EscalateDecision { task_id: RowId, report: EscalationReport },
    EscalateExecuted { task_id: RowId },
    RecoveryStart { task_id: RowId },
    RecoveryComplete { task_id: RowId },
}

pub type EventSink = Arc<dyn Fn(RetryEvent) + Send + Sync>;

/// Owns one `RetryHistory` per task and turns `TaskResult`s into
/// decisions, recording every attempt as it goes.
pub struct RetryManager {
    config: RetryConfig,
    sink: Option<EventSink>,
}

impl RetryManager {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, sink: None }
    }

    pub fn with_sink(config: RetryConfig, sink: EventSink) -> Self {
        Self { config, sink: Some(sink) }
    }

    fn emit(&self, event: RetryEvent) {
        if let Some(sink) = &self.sink {
            // Observers must never fail a retry decision; swallow panics
            // at the call site by keeping this a plain function call.
            (sink)(event);
        }
    }

    /// Records `result` against `history`, decides what happens next, and
    /// emits the matching events. Returns the decision for the caller to
    /// act on (requeue with a delay, write an escalation report, or mark
    /// the task complete).
    pub fn record_and_decide(
        &self,
        history: &mut RetryHistory,
        result: &TaskResult,
        error_message: Option<String>,
        duration_ms: i64,
    ) -> RetryDecision {
        let attempt_number = history.next_attempt_number();
        let status = if result.status == ResultStatus::Pass {
            AttemptStatus::Pass
        } else {
            AttemptStatus::Fail
        };
        let failure_type = if status == AttemptStatus::Fail {
            Some(classify(result).as_str().to_string())
        } else {
            None
        };

        history.attempts.push(Attempt {
            attempt_number,
            timestamp: Timestamp::now(),
            failure_type,
            status,
            error_message: error_message.clone(),
            duration_ms,
        });
        history.recompute_retry_count();

        if status == AttemptStatus::Pass {
            self.emit(RetryEvent::RetrySuccess {
                task_id: history.task_id,
                attempt_number,
            });
            return RetryDecision::Pass;
        }

        let decision = decide_retry(result, history.retry_count as u32, &self.config);
        self.emit(RetryEvent::RetryDecision {
            task_id: history.task_id,
            decision_summary: summarize(&decision),
        });

        match &decision {
            RetryDecision::Retry { delay_ms, .. } => {
                self.emit(RetryEvent::RetryStart {
                    task_id: history.task_id,
                    attempt_number,
                    delay_ms: *delay_ms,
                });
            }
            RetryDecision::Escalate { reason, .. } => {
                let failure_types: Vec<FailureType> = history
                    .attempts
                    .iter()
                    .filter_map(|a| a.failure_type.as_deref())
                    .filter_map(parse_failure_type)
                    .collect();
                let report = build_report(
                    &history.task_id.to_string(),
                    *reason,
                    FailureSummary {
                        total_attempts: history.attempts.len() as u32,
                        failure_types,
                        last_failure: error_message,
                    },
                    None,
                );
                self.emit(RetryEvent::EscalateDecision {
                    task_id: history.task_id,
                    report,
                });
            }
            RetryDecision::Pass => unreachable!("Pass handled above"),
        }

        decision
    }

    pub fn mark_escalated(&self, task_id: RowId) {
        self.emit(RetryEvent::EscalateExecuted { task_id });
    }

    pub fn mark_recovery_start(&self, task_id: RowId) {
        self.emit(RetryEvent::RecoveryStart { task_id });
    }

    pub fn mark_recovery_complete(&self, task_id: RowId) {
        self.emit(RetryEvent::RecoveryComplete { task_id });
    }
}

fn parse_failure_type(s: &str) -> Option<FailureType> {
    match s {
        "INCOMPLETE" => Some(FailureType::Incomplete),
        "QUALITY_FAILURE" => Some(FailureType::QualityFailure),
        "TIMEOUT" => Some(FailureType::Timeout),
        "TRANSIENT_ERROR" => Some(FailureType::TransientError),
        "RATE_LIMIT" => Some(FailureType::RateLimit),
        "FATAL_ERROR" => Some(FailureType::FatalError),
        "ESCALATE_REQUIRED" => Some(FailureType::EscalateRequired),
        _ => None,
    }
}

fn summarize(decision: &RetryDecision) -> String {
    match decision {
        RetryDecision::Retry { delay_ms, hint } => format!("retry in {delay_ms}ms: {hint}"),
        RetryDecision::Escalate { reason, .. } => format!("escalate: {}", reason.as_str()),
        RetryDecision::Pass => "pass".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn failing_result() -> TaskResult {
        TaskResult {
            status: ResultStatus::Fail,
            output: None,
            error: Some("HTTP 503 upstream unavailable".to_string()),
            quality_results: Vec::new(),
            detected_issues: Vec::new(),
        }
    }

    #[test]
    fn records_attempts_and_retries_then_escalates() {
        let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        let manager = RetryManager::with_sink(
            RetryConfig::default(),
            Arc::new(move |event| {
                sink_events.lock().unwrap().push(format!("{event:?}"));
            }),
        );

        let task_id = RowId::new_v4();
        let mut history = RetryHistory::empty(task_id, None);

        for _ in 0..3 {
            let decision = manager.record_and_decide(&mut history, &failing_result(), None, 10);
            assert!(matches!(decision, RetryDecision::Retry { .. }));
        }

        let final_decision = manager.record_and_decide(&mut history, &failing_result(), None, 10);
        assert!(matches!(final_decision, RetryDecision::Escalate { .. }));
        assert_eq!(history.retry_count, 4);
        assert!(!events.lock().unwrap().is_empty());
    }

    #[test]
    fn pass_after_failures_reports_success_without_escalating() {
        let manager = RetryManager::new(RetryConfig::default());
        let task_id = RowId::new_v4();
        let mut history = RetryHistory::empty(task_id, None);

        manager.record_and_decide(&mut history, &failing_result(), None, 10);
        let decision = manager.record_and_decide(&mut history, &TaskResult::pass(), None, 10);
        assert!(matches!(decision, RetryDecision::Pass));
        assert_eq!(history.retry_count, 1);
    }
}
