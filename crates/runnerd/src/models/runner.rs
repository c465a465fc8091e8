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

//! Runner heartbeat record.

use serde::{Deserialize, Serialize};

use crate::database::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunnerStatus {
    Running,
    Stopped,
}

impl RunnerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerStatus::Running => "RUNNING",
            RunnerStatus::Stopped => "STOPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(RunnerStatus::Running),
            "STOPPED" => Some(RunnerStatus::Stopped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerRecord {
    pub namespace: String,
    pub runner_id: String,
    pub started_at: Timestamp,
    pub last_heartbeat: Timestamp,
    pub status: RunnerStatus,
    pub project_root: Option<String>,
}

impl RunnerRecord {
    /// Aliveness = `now − last_heartbeat < heartbeatTimeout`.
    pub fn is_alive(&self, now: Timestamp, heartbeat_timeout_ms: i64) -> bool {
        let elapsed = now - self.last_heartbeat;
        elapsed.num_milliseconds() < heartbeat_timeout_ms
    }
}
