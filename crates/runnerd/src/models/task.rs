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

//! Task domain model.
//!
//! `Task` is the durable, namespaced queue record at the center of the
//! system. These are API-level domain types; `crate::database::schema`
//! holds the storage-specific column mapping.

use serde::{Deserialize, Serialize};

use crate::database::types::{RowId, Timestamp};

/// Coarse task category, driving write-permission and timeout-profile
/// selection in the Process Supervisor. The Markdown skill-definition
/// front-matter supplies this value; see `crate::skills`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    ReadInfo,
    Implementation,
    Report,
    Other,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::ReadInfo => "READ_INFO",
            TaskType::Implementation => "IMPLEMENTATION",
            TaskType::Report => "REPORT",
            TaskType::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "READ_INFO" => TaskType::ReadInfo,
            "IMPLEMENTATION" => TaskType::Implementation,
            "REPORT" => TaskType::Report,
            _ => TaskType::Other,
        }
    }

    /// Default hard deadline for an executor invocation of this task type.
    pub fn default_timeout_ms(&self) -> i64 {
        match self {
            TaskType::ReadInfo => 60_000,
            TaskType::Implementation => 900_000,
            TaskType::Report => 300_000,
            TaskType::Other => 300_000,
        }
    }

    /// Whether tasks of this type may write to the filesystem.
    pub fn allows_write(&self) -> bool {
        matches!(self, TaskType::Implementation)
    }
}

/// `Task.status`. Transitions are validated against the table in
/// `crate::queue::state_machine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Queued,
    Running,
    AwaitingResponse,
    Complete,
    Error,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::AwaitingResponse => "AWAITING_RESPONSE",
            TaskStatus::Complete => "COMPLETE",
            TaskStatus::Error => "ERROR",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "QUEUED" => TaskStatus::Queued,
            "RUNNING" => TaskStatus::Running,
            "AWAITING_RESPONSE" => TaskStatus::AwaitingResponse,
            "COMPLETE" => TaskStatus::Complete,
            "ERROR" => TaskStatus::Error,
            "CANCELLED" => TaskStatus::Cancelled,
            _ => return None,
        })
    }

    /// Terminal states are never mutated again except for read-only
    /// appends to `events`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Complete | TaskStatus::Error | TaskStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub namespace: String,
    pub task_id: RowId,
    pub task_group_id: String,
    pub session_id: String,
    pub status: TaskStatus,
    pub task_type: TaskType,
    pub prompt: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub output: Option<String>,
    pub error_message: Option<String>,
    pub clarification: Option<String>,
    pub conversation_history: Vec<ConversationMessage>,
    pub events: Vec<TaskEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub event_type: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: Timestamp,
}
