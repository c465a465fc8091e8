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

//! Core library for a single-node task orchestration runner: a durable
//! queue with atomic claiming, a retry and escalation engine, a process
//! supervisor, and a live output stream, tied together by a dispatcher.

pub mod config;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod models;
pub mod queue;
pub mod retry;
pub mod skills;
pub mod stream;
pub mod supervisor;

pub use config::RunnerConfig;
pub use database::Database;
pub use dispatcher::Dispatcher;
pub use executor::SupervisedExecutor;
pub use queue::QueueStore;
pub use stream::OutputStream;
pub use supervisor::ProcessSupervisor;
