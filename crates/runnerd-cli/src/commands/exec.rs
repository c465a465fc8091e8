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

//! One-shot synchronous execution: enqueues a task, claims it, and runs
//! it to completion against the configured executor without going
//! through the retry loop, reporting the outcome as an exit code:
//!
//! 0 COMPLETE, 1 INCOMPLETE, 2 NO_EVIDENCE, 3 ERROR, 4 INVALID.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args as ClapArgs;
use runnerd::config::RunnerConfig;
use runnerd::dispatcher::TaskExecutor;
use runnerd::models::task::{TaskStatus, TaskType};
use runnerd::retry::classify::{self, FailureType, ResultStatus};
use runnerd::stream::OutputStream;
use runnerd::supervisor::ProcessSupervisor;

#[derive(Debug, ClapArgs)]
pub struct Args {
    pub namespace: String,
    pub prompt: String,

    #[arg(long, default_value = "cli")]
    pub session_id: String,

    #[arg(long)]
    pub task_group_id: Option<String>,

    #[arg(long, default_value = "READ_INFO")]
    pub task_type: String,
}

pub async fn run(database_url: &str, config: &RunnerConfig, args: Args) -> Result<ExitCode> {
    let Some(task_type) = parse_task_type(&args.task_type) else {
        eprintln!("invalid task type: {}", args.task_type);
        return Ok(ExitCode::from(4));
    };

    let queue = super::open_queue(database_url).await?;
    let task_group_id = args.task_group_id.clone().unwrap_or_else(|| args.session_id.clone());
    let task = queue
        .enqueue(&args.namespace, &args.session_id, &task_group_id, &args.prompt, task_type)
        .await?;

    let runnerd::queue::ClaimOutcome::Claimed(claimed) = queue.claim(&args.namespace, 1).await? else {
        eprintln!("enqueued task {} was immediately claimed by another worker", task.task_id);
        return Ok(ExitCode::from(3));
    };

    let mut supervisor = ProcessSupervisor::new(config.supervisor.executor_binary.clone(), config.supervisor.executor_args.clone());
    if let Some(build_command) = &config.supervisor.build_command {
        if let Some((program, rest)) = build_command.split_first() {
            supervisor = supervisor.with_build_command(program.clone(), rest.to_vec());
        }
    }
    let executor = runnerd::executor::SupervisedExecutor::new(Arc::new(supervisor));
    let output = OutputStream::new();
    let result = executor.execute(&claimed, &output).await;

    let code = exit_code_for(&result);
    let new_status = if result.status == ResultStatus::Pass { TaskStatus::Complete } else { TaskStatus::Error };
    queue
        .update_status_with_validation(claimed.task_id, new_status, result.error.clone(), result.output.clone())
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(ExitCode::from(code))
}

fn parse_task_type(raw: &str) -> Option<TaskType> {
    match raw.to_uppercase().as_str() {
        "READ_INFO" => Some(TaskType::ReadInfo),
        "IMPLEMENTATION" => Some(TaskType::Implementation),
        "REPORT" => Some(TaskType::Report),
        "OTHER" => Some(TaskType::Other),
        _ => None,
    }
}

fn exit_code_for(result: &classify::TaskResult) -> u8 {
    if result.status == ResultStatus::Pass {
        return 0;
    }
    match classify::classify(result) {
        FailureType::Incomplete => 1,
        FailureType::EscalateRequired => 2,
        _ => 3,
    }
}
