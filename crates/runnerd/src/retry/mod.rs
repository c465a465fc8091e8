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

//! Retry & Recovery Engine: a pure decision function plus a stateful
//! manager that records attempts and persists retry history.

pub mod backoff;
pub mod classify;
pub mod decision;
pub mod escalation;
pub mod manager;
pub mod partial;

pub use backoff::{BackoffConfig, BackoffStrategy};
pub use classify::{classify, FailureType, TaskResult};
pub use decision::{decide_retry, RetryConfig, RetryDecision};
pub use escalation::{EscalationReason, EscalationReport};
pub use manager::{RetryEvent, RetryManager};
pub use partial::{partial_recovery_strategy, RecoveryStrategy};
