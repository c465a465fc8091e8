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

//! Error taxonomy shared by the core subsystems.

use thiserror::Error;

use crate::models::task::TaskStatus;

/// Errors raised by the Queue Store.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task not found")]
    NotFound,

    #[error("conflict: task was modified concurrently")]
    Conflict,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

/// Errors raised by the Process Supervisor.
#[derive(Debug, Error, Clone)]
pub enum SupervisorError {
    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error("process error: {0}")]
    ProcessError(String),

    #[error("operation timed out")]
    Timeout,

    #[error("supervisor lock unavailable, another operation is in progress")]
    LockUnavailable,
}
