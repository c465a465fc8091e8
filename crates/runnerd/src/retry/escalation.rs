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

//! Escalation reporting: why a task gave up on retrying, rendered into
//! a human-facing message.

use serde::{Deserialize, Serialize};

use super::classify::FailureType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationReason {
    MaxRetries,
    FatalError,
    HumanJudgment,
    ResourceExhausted,
    /// A failure the classifier could not place in the taxonomy. Resolved
    /// as fail-closed: treated like any other escalation, never retried.
    Unclassified,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::MaxRetries => "MAX_RETRIES",
            EscalationReason::FatalError => "FATAL_ERROR",
            EscalationReason::HumanJudgment => "HUMAN_JUDGMENT",
            EscalationReason::ResourceExhausted => "RESOURCE_EXHAUSTED",
            EscalationReason::Unclassified => "UNCLASSIFIED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureSummary {
    pub total_attempts: u32,
    pub failure_types: Vec<FailureType>,
    pub last_failure: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugInfo {
    pub trace_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationReport {
    pub reason: EscalationReason,
    pub failure_summary: FailureSummary,
    pub user_message: String,
    pub debug_info: DebugInfo,
    pub recommended_actions: Vec<String>,
}

pub fn build_report(
    task_id: &str,
    reason: EscalationReason,
    failure_summary: FailureSummary,
    trace_file: Option<String>,
) -> EscalationReport {
    let user_message = match reason {
        EscalationReason::MaxRetries => format!(
            "Task {task_id} failed after {} attempts and needs review. Run `/trace {task_id}` for the full history.",
            failure_summary.total_attempts
        ),
        EscalationReason::FatalError => format!(
            "Task {task_id} hit a non-retryable error: {}",
            failure_summary.last_failure.clone().unwrap_or_default()
        ),
        EscalationReason::HumanJudgment => {
            format!("Task {task_id} requires a judgment call a retry can't make.")
        }
        EscalationReason::ResourceExhausted => {
            format!("Task {task_id} ran out of retry budget or resources.")
        }
        EscalationReason::Unclassified => {
            format!("Task {task_id} failed in a way that couldn't be classified; escalating to be safe.")
        }
    };

    let recommended_actions = match reason {
        EscalationReason::MaxRetries => vec![
            "split task".to_string(),
            "give more specific instructions".to_string(),
            "inspect trace".to_string(),
        ],
        EscalationReason::FatalError => vec!["check credentials".to_string(), "re-set API key".to_string()],
        EscalationReason::HumanJudgment => vec!["clarify requirements".to_string()],
        EscalationReason::ResourceExhausted => vec!["split task".to_string(), "check cost limit".to_string()],
        EscalationReason::Unclassified => {
            vec!["Inspect the raw failure output; the classifier found nothing actionable".to_string()]
        }
    };

    EscalationReport {
        reason,
        failure_summary,
        user_message,
        debug_info: DebugInfo { trace_file },
        recommended_actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_retries_message_mentions_trace_command() {
        let report = build_report(
            "task-1",
            EscalationReason::MaxRetries,
            FailureSummary {
                total_attempts: 3,
                failure_types: vec![FailureType::Incomplete],
                last_failure: Some("incomplete output".into()),
            },
            Some("/tmp/task-1.trace".into()),
        );
        assert!(report.user_message.contains("/trace task-1"));
        assert_eq!(report.reason, EscalationReason::MaxRetries);
    }
}
