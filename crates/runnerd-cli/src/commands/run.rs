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

//! The long-lived process: claim loop, stale-task sweeper, and
//! AWAITING_RESPONSE sweeper, all driving the supervised executor
//! process, until interrupted.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::info;

use runnerd::config::RunnerConfig;
use runnerd::executor::SupervisedExecutor;
use runnerd::supervisor::ProcessSupervisor;
use runnerd::{Database, Dispatcher, OutputStream, QueueStore};

#[derive(Debug, ClapArgs)]
pub struct Args {
    #[arg(long)]
    pub namespace: Option<String>,
}

pub async fn run(database_url: &str, config: &RunnerConfig, args: Args) -> Result<ExitCode> {
    let namespace = args.namespace.unwrap_or_else(|| config.default_namespace.clone());

    let database = Database::connect(database_url, 8)?;
    database.migrate().await?;
    let queue = QueueStore::new(database);
    let output = OutputStream::new();

    let mut supervisor = ProcessSupervisor::new(config.supervisor.executor_binary.clone(), config.supervisor.executor_args.clone());
    if let Some(build_command) = &config.supervisor.build_command {
        if let Some((program, rest)) = build_command.split_first() {
            supervisor = supervisor.with_build_command(program.clone(), rest.to_vec());
        }
    }
    let supervisor = Arc::new(supervisor);
    supervisor.start().await?;
    let executor: Arc<dyn runnerd::dispatcher::TaskExecutor> = Arc::new(SupervisedExecutor::new(Arc::clone(&supervisor)));

    let retry_config = runnerd::retry::RetryConfig {
        default_max_retries: config.retry.default_max_retries,
        default_backoff: config.retry.to_backoff_config(),
        ..Default::default()
    };
    let dispatcher = Arc::new(
        Dispatcher::new(queue.clone(), namespace.clone(), config.claim_batch_size).with_retry_config(retry_config),
    );

    info!(%namespace, "runnerd starting");

    let claim_handle = {
        let dispatcher = Arc::clone(&dispatcher);
        let output = output.clone();
        tokio::spawn(async move { dispatcher.run_claim_loop(executor, output).await })
    };
    let stale_handle = {
        let dispatcher = Arc::clone(&dispatcher);
        let max_age_ms = config.stale_task_max_age_ms as i64;
        tokio::spawn(async move { dispatcher.run_stale_sweeper(max_age_ms, Duration::from_secs(30)).await })
    };
    let awaiting_handle = {
        let dispatcher = Arc::clone(&dispatcher);
        let max_age_ms = config.awaiting_response_timeout_ms as i64;
        tokio::spawn(async move { dispatcher.run_awaiting_response_sweeper(max_age_ms, Duration::from_secs(60)).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping dispatcher");
    dispatcher.shutdown();
    let _ = tokio::join!(claim_handle, stale_handle, awaiting_handle);
    supervisor.stop(Duration::from_secs(10)).await?;

    Ok(ExitCode::SUCCESS)
}
