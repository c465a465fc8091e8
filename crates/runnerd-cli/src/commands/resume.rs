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
use runnerd::database::RowId;

#[derive(Debug, ClapArgs)]
pub struct Args {
    pub task_id: uuid::Uuid,
    pub response: String,
}

pub async fn run(database_url: &str, args: Args) -> Result<ExitCode> {
    let queue = super::open_queue(database_url).await?;
    let task = queue.resume_with_response(RowId::from(args.task_id), args.response).await?;
    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(ExitCode::SUCCESS)
}
