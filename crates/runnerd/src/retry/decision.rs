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

//! The retry decision algorithm: classify, check the retry budget, and
//! either hand back a delay or an escalation reason.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::backoff::BackoffConfig;
use super::classify::{classify, FailureType, ResultStatus, TaskResult};
use super::escalation::EscalationReason;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub default_max_retries: u32,
    pub default_backoff: BackoffConfig,
    /// Per-cause overrides, e.g. `RATE_LIMIT -> max_retries=5`.
    pub overrides: HashMap<FailureType, RetryOverride>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryOverride {
    pub max_retries: u32,
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        use super::backoff::BackoffStrategy;

        let mut overrides = HashMap::new();
        overrides.insert(
            FailureType::RateLimit,
            RetryOverride {
                max_retries: 5,
                backoff: BackoffConfig {
                    strategy: BackoffStrategy::Exponential,
                    base_delay_ms: 5_000,
                    max_delay_ms: 60_000,
                    multiplier: 2.0,
                    jitter: 0.2,
                },
            },
        );
        overrides.insert(
            FailureType::Timeout,
            RetryOverride {
                max_retries: 2,
                backoff: BackoffConfig::fixed(5_000),
            },
        );

        Self {
            default_max_retries: 3,
            default_backoff: BackoffConfig::exponential(1_000, 30_000, 0.1),
            overrides,
        }
    }
}

impl RetryConfig {
    fn max_retries_for(&self, failure_type: FailureType) -> u32 {
        self.overrides
            .get(&failure_type)
            .map(|o| o.max_retries)
            .unwrap_or(self.default_max_retries)
    }

    fn backoff_for(&self, failure_type: FailureType) -> BackoffConfig {
        self.overrides
            .get(&failure_type)
            .map(|o| o.backoff)
            .unwrap_or(self.default_backoff)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RetryDecision {
    Retry { delay_ms: u64, hint: String },
    Escalate { reason: EscalationReason, failure_type: Option<FailureType> },
    Pass,
}

/// Runs the four-step algorithm: pass through on success, classify on
/// failure, escalate immediately on a non-retryable type or an exhausted
/// budget, otherwise retry with a cause-specific backoff delay.
///
/// `attempt_number` is the number of attempts already made (1 after the
/// first failure), used both to pick the next backoff delay and to check
/// it against the retry budget.
pub fn decide_retry(result: &TaskResult, attempt_number: u32, config: &RetryConfig) -> RetryDecision {
    if result.status == ResultStatus::Pass {
        return RetryDecision::Pass;
    }

    let failure_type = classify(result);

    if !failure_type.is_retryable() {
        let reason = match failure_type {
            FailureType::FatalError => EscalationReason::FatalError,
            _ => EscalationReason::Unclassified,
        };
        return RetryDecision::Escalate {
            reason,
            failure_type: Some(failure_type),
        };
    }

    let max_retries = config.max_retries_for(failure_type);
    if attempt_number > max_retries {
        return RetryDecision::Escalate {
            reason: EscalationReason::MaxRetries,
            failure_type: Some(failure_type),
        };
    }

    let backoff = config.backoff_for(failure_type);
    let delay_ms = backoff.delay_for(attempt_number);
    let hint = modification_hint(failure_type);

    RetryDecision::Retry { delay_ms, hint }
}

fn modification_hint(failure_type: FailureType) -> String {
    match failure_type {
        FailureType::Incomplete => "ask for the full output, not a summary".to_string(),
        FailureType::QualityFailure => "address the failing quality criteria before resubmitting".to_string(),
        FailureType::Timeout => "narrow the task scope so it finishes within the deadline".to_string(),
        FailureType::TransientError => "no prompt change needed, retrying the same request".to_string(),
        FailureType::RateLimit => "back off and retry once the rate limit window clears".to_string(),
        FailureType::FatalError | FailureType::EscalateRequired => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::classify::QualityResult;

    fn timeout_result() -> TaskResult {
        TaskResult {
            status: ResultStatus::Timeout,
            output: None,
            error: None,
            quality_results: Vec::new(),
            detected_issues: Vec::new(),
        }
    }

    fn error_result(msg: &str) -> TaskResult {
        TaskResult {
            status: ResultStatus::Error,
            output: None,
            error: Some(msg.to_string()),
            quality_results: Vec::new(),
            detected_issues: Vec::new(),
        }
    }

    #[test]
    fn pass_is_pass() {
        let config = RetryConfig::default();
        assert!(matches!(decide_retry(&TaskResult::pass(), 0, &config), RetryDecision::Pass));
    }

    #[test]
    fn rate_limit_retries_within_spec_delay_window() {
        let config = RetryConfig::default();
        let result = error_result("HTTP 429 rate limit exceeded");
        match decide_retry(&result, 1, &config) {
            RetryDecision::Retry { delay_ms, .. } => {
                assert!(delay_ms >= 4_000 && delay_ms <= 7_000, "got {delay_ms}");
            }
            other => panic!("expected Retry, got {other:?}"),
        }
    }

    #[test]
    fn fatal_error_escalates_immediately_even_on_first_attempt() {
        let config = RetryConfig::default();
        let result = error_result("401 unauthorized");
        match decide_retry(&result, 1, &config) {
            RetryDecision::Escalate { reason, .. } => assert_eq!(reason, EscalationReason::FatalError),
            other => panic!("expected Escalate, got {other:?}"),
        }
    }

    #[test]
    fn timeout_escalates_after_its_override_budget() {
        let config = RetryConfig::default();
        let result = timeout_result();
        assert!(matches!(decide_retry(&result, 1, &config), RetryDecision::Retry { .. }));
        assert!(matches!(decide_retry(&result, 2, &config), RetryDecision::Retry { .. }));
        match decide_retry(&result, 3, &config) {
            RetryDecision::Escalate { reason, .. } => assert_eq!(reason, EscalationReason::MaxRetries),
            other => panic!("expected Escalate, got {other:?}"),
        }
    }

    #[test]
    fn six_consecutive_incomplete_retries_three_times_then_escalates() {
        let config = RetryConfig::default();
        let mut result = TaskResult::pass();
        result.status = ResultStatus::Fail;
        result.quality_results.push(QualityResult {
            criterion: "completeness".into(),
            passed: false,
        });

        let mut delays = Vec::new();
        for attempt in 1..=3 {
            match decide_retry(&result, attempt, &config) {
                RetryDecision::Retry { delay_ms, .. } => delays.push(delay_ms),
                other => panic!("expected Retry at attempt {attempt}, got {other:?}"),
            }
        }
        assert!(delays[0] < delays[1] && delays[1] < delays[2], "delays should grow: {delays:?}");

        match decide_retry(&result, 4, &config) {
            RetryDecision::Escalate { reason, .. } => assert_eq!(reason, EscalationReason::MaxRetries),
            other => panic!("expected Escalate, got {other:?}"),
        }
    }
}
