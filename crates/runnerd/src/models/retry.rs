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

//! Retry-history domain model, owned exclusively by the Retry Engine.

use serde::{Deserialize, Serialize};

use crate::database::types::{RowId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttemptStatus {
    Pass,
    Fail,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pass => "PASS",
            AttemptStatus::Fail => "FAIL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PASS" => Some(AttemptStatus::Pass),
            "FAIL" => Some(AttemptStatus::Fail),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub attempt_number: i32,
    pub timestamp: Timestamp,
    pub failure_type: Option<String>,
    pub status: AttemptStatus,
    pub error_message: Option<String>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryHistory {
    pub id: RowId,
    pub task_id: RowId,
    pub subtask_id: Option<String>,
    pub retry_count: i32,
    pub attempts: Vec<Attempt>,
}

impl RetryHistory {
    pub fn empty(task_id: RowId, subtask_id: Option<String>) -> Self {
        Self {
            id: RowId::new_v4(),
            task_id,
            subtask_id,
            retry_count: 0,
            attempts: Vec::new(),
        }
    }

    /// `retry_count` equals the number of FAIL attempts recorded so far.
    pub fn recompute_retry_count(&mut self) {
        self.retry_count = self
            .attempts
            .iter()
            .filter(|a| a.status == AttemptStatus::Fail)
            .count() as i32;
    }

    pub fn next_attempt_number(&self) -> i32 {
        self.attempts
            .iter()
            .map(|a| a.attempt_number)
            .max()
            .unwrap_or(0)
            + 1
    }
}
