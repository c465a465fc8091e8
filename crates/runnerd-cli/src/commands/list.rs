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

use std::process::ExitCode;

use anyhow::Result;
use clap::Args as ClapArgs;

#[derive(Debug, ClapArgs)]
pub struct Args {
    pub namespace: String,

    #[arg(long)]
    pub task_group_id: Option<String>,
}

pub async fn run(database_url: &str, args: Args) -> Result<ExitCode> {
    let queue = super::open_queue(database_url).await?;
    let tasks = match &args.task_group_id {
        Some(group) => queue.list_group(&args.namespace, group).await?,
        None => queue.list_namespace(&args.namespace).await?,
    };
    println!("{}", serde_json::to_string_pretty(&tasks)?);
    Ok(ExitCode::SUCCESS)
}
