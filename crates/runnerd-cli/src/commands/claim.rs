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
use runnerd::queue::ClaimOutcome;

#[derive(Debug, ClapArgs)]
pub struct Args {
    pub namespace: String,

    #[arg(long, default_value_t = 1)]
    pub batch_size: usize,
}

pub async fn run(database_url: &str, args: Args) -> Result<ExitCode> {
    let queue = super::open_queue(database_url).await?;
    match queue.claim(&args.namespace, args.batch_size as i64).await? {
        ClaimOutcome::Claimed(task) => {
            println!("{}", serde_json::to_string_pretty(&task)?);
            Ok(ExitCode::SUCCESS)
        }
        ClaimOutcome::NoneAvailable => {
            eprintln!("no queued tasks in namespace {}", args.namespace);
            Ok(ExitCode::from(1))
        }
    }
}
