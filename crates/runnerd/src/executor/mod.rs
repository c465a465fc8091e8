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

//! The production `TaskExecutor`: hands a task to the process managed by
//! the Process Supervisor over a line-delimited JSON protocol on its
//! stdin/stdout, and turns the lines it reads back into output chunks and
//! a final `TaskResult`.
//!
//! Protocol, one JSON object per line:
//! - request (written to stdin): `{task_id, task_group_id, session_id,
//!   task_type, prompt, conversation_history}`
//! - chunk (read from stdout): `{"type": "chunk", "text": "..."}`
//! - result (read from stdout, terminates the exchange):
//!   `{"type": "result", "status", "output", "error", "quality_results",
//!   "detected_issues"}`
//!
//! A line that isn't valid JSON, or carries no recognized `type`, is
//! treated as raw executor output and appended to the stream as-is.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::database::types::{RowId, Timestamp};
use crate::dispatcher::TaskExecutor;
use crate::models::task::{ConversationMessage, Task};
use crate::retry::classify::{ResultStatus, TaskResult};
use crate::stream::{OutputStream, StreamKind};
use crate::supervisor::{ProcessState, ProcessSupervisor};

#[derive(Serialize)]
struct ExecutorRequest<'a> {
    task_id: String,
    task_group_id: &'a str,
    session_id: &'a str,
    task_type: &'static str,
    prompt: &'a str,
    conversation_history: &'a [ConversationMessage],
}

fn error_result(message: impl Into<String>) -> TaskResult {
    TaskResult {
        status: ResultStatus::Error,
        output: None,
        error: Some(message.into()),
        quality_results: Vec::new(),
        detected_issues: Vec::new(),
    }
}

/// Drives the supervised executor process for each claimed task. Starts
/// the process on demand if it isn't already running, and restarts it
/// whenever an invocation blows through its deadline.
pub struct SupervisedExecutor {
    supervisor: Arc<ProcessSupervisor>,
    stop_grace_period: Duration,
}

impl SupervisedExecutor {
    pub fn new(supervisor: Arc<ProcessSupervisor>) -> Self {
        Self {
            supervisor,
            stop_grace_period: Duration::from_secs(10),
        }
    }

    pub fn with_stop_grace_period(mut self, grace_period: Duration) -> Self {
        self.stop_grace_period = grace_period;
        self
    }

    async fn ensure_running(&self) -> Result<(), TaskResult> {
        if self.supervisor.status().await.state == ProcessState::Running {
            return Ok(());
        }
        self.supervisor
            .start()
            .await
            .map_err(|e| error_result(format!("failed to start executor: {e}")))?;
        Ok(())
    }

    /// Reads lines until a `result` line arrives, `None` on a clean EOF.
    async fn read_until_result(
        &self,
        task_id: RowId,
        task_created_at: Timestamp,
        session_id: &str,
        output: &OutputStream,
    ) -> Option<TaskResult> {
        loop {
            let line = match self.supervisor.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => return Some(error_result(e.to_string())),
            };
            if line.trim().is_empty() {
                continue;
            }

            let parsed: Option<Value> = serde_json::from_str(&line).ok();
            match parsed.as_ref().and_then(|v| v.get("type")).and_then(Value::as_str) {
                Some("chunk") => {
                    let text = parsed
                        .as_ref()
                        .and_then(|v| v.get("text"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    output
                        .append(task_id, task_created_at, session_id, StreamKind::Stdout, text.to_string())
                        .await;
                }
                Some("result") => match parsed.and_then(|v| serde_json::from_value::<TaskResult>(v).ok()) {
                    Some(result) => return Some(result),
                    None => return Some(error_result("executor sent a malformed result line")),
                },
                _ => {
                    // Unrecognized shape: treat as raw output rather than dropping it.
                    output.append(task_id, task_created_at, session_id, StreamKind::System, line).await;
                }
            }
        }
    }
}

#[async_trait]
impl TaskExecutor for SupervisedExecutor {
    async fn execute(&self, task: &Task, output: &OutputStream) -> TaskResult {
        if let Err(result) = self.ensure_running().await {
            return result;
        }

        let request = ExecutorRequest {
            task_id: task.task_id.to_string(),
            task_group_id: &task.task_group_id,
            session_id: &task.session_id,
            task_type: task.task_type.as_str(),
            prompt: &task.prompt,
            conversation_history: &task.conversation_history,
        };
        let line = match serde_json::to_string(&request) {
            Ok(line) => line,
            Err(e) => return error_result(format!("failed to encode task request: {e}")),
        };
        if let Err(e) = self.supervisor.send_line(&line).await {
            return error_result(format!("failed to hand task to executor: {e}"));
        }

        let deadline = Duration::from_millis(task.task_type.default_timeout_ms() as u64);
        match tokio::time::timeout(
            deadline,
            self.read_until_result(task.task_id, task.created_at, &task.session_id, output),
        )
        .await
        {
            Ok(Some(result)) => result,
            Ok(None) => error_result("executor closed its output stream before sending a result"),
            Err(_elapsed) => {
                warn!(task_id = %task.task_id, "executor invocation exceeded its deadline, stopping process");
                let _ = self.supervisor.stop(self.stop_grace_period).await;
                TaskResult {
                    status: ResultStatus::Timeout,
                    output: None,
                    error: Some("executor invocation exceeded its deadline".to_string()),
                    quality_results: Vec::new(),
                    detected_issues: Vec::new(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::TaskType;

    fn echo_supervisor(script: &str) -> Arc<ProcessSupervisor> {
        Arc::new(ProcessSupervisor::new("sh", vec!["-c".to_string(), script.to_string()]))
    }

    fn sample_task() -> Task {
        Task {
            namespace: "ns".to_string(),
            task_id: RowId::new_v4(),
            task_group_id: "group".to_string(),
            session_id: "session".to_string(),
            status: crate::models::task::TaskStatus::Running,
            task_type: TaskType::ReadInfo,
            prompt: "hello".to_string(),
            created_at: crate::database::types::Timestamp::now(),
            updated_at: crate::database::types::Timestamp::now(),
            output: None,
            error_message: None,
            clarification: None,
            conversation_history: Vec::new(),
            events: Vec::new(),
        }
    }

    #[tokio::test]
    async fn reads_chunks_then_result() {
        let supervisor = echo_supervisor(
            "read line; echo '{\"type\":\"chunk\",\"text\":\"working\"}'; \
             echo '{\"type\":\"result\",\"status\":\"Pass\",\"output\":\"done\",\"error\":null}'",
        );
        let executor = SupervisedExecutor::new(supervisor);
        let output = OutputStream::new();
        let task = sample_task();

        let result = executor.execute(&task, &output).await;
        assert_eq!(result.status, ResultStatus::Pass);
        assert_eq!(result.output.as_deref(), Some("done"));

        let chunks = output.get_all(task.task_id).await;
        assert!(chunks.iter().any(|c| c.content == "working"));
    }

    #[tokio::test]
    async fn unrecognized_line_is_preserved_as_raw_output() {
        let supervisor = echo_supervisor(
            "read line; echo 'plain executor log line'; \
             echo '{\"type\":\"result\",\"status\":\"Pass\",\"output\":null,\"error\":null}'",
        );
        let executor = SupervisedExecutor::new(supervisor);
        let output = OutputStream::new();
        let task = sample_task();

        executor.execute(&task, &output).await;
        let chunks = output.get_all(task.task_id).await;
        assert!(chunks.iter().any(|c| c.content == "plain executor log line"));
    }

    #[tokio::test]
    async fn closed_stdout_without_result_is_an_error() {
        let supervisor = echo_supervisor("read line");
        let executor = SupervisedExecutor::new(supervisor);
        let output = OutputStream::new();
        let task = sample_task();

        let result = executor.execute(&task, &output).await;
        assert_eq!(result.status, ResultStatus::Error);
    }
}
