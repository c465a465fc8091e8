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

//! `runner` subcommands talk to a running `runnerd-server` over HTTP,
//! since the Process Supervisor's state lives inside that process, not
//! inside this one-shot CLI invocation.

use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::{Args as ClapArgs, Subcommand};
use serde_json::Value;

use runnerd::config::RunnerConfig;

#[derive(Debug, Subcommand)]
pub enum RunnerCommands {
    /// Report the supervised executor process's state, PID, and build SHA.
    Status(ServerArgs),
    /// Stop the supervised executor process.
    Stop(ServerArgs),
    /// Run the configured build command; the supervisor computes the
    /// fingerprint itself from the resulting binary.
    Build(ServerArgs),
    /// Stop then start the supervised executor process.
    Restart(RestartArgs),
}

#[derive(Debug, ClapArgs)]
pub struct ServerArgs {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub server: String,
}

#[derive(Debug, ClapArgs)]
pub struct RestartArgs {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub server: String,

    /// Run the configured build command between stop and start.
    #[arg(long)]
    pub build: bool,
}

pub async fn run(_config: &RunnerConfig, command: RunnerCommands) -> Result<ExitCode> {
    let client = reqwest::Client::new();
    match command {
        RunnerCommands::Status(args) => {
            let body: Value = client
                .get(format!("{}/api/v1/supervisor/status", args.server))
                .send()
                .await?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(ExitCode::SUCCESS)
        }
        RunnerCommands::Stop(args) => {
            let response = client.post(format!("{}/api/v1/supervisor/stop", args.server)).send().await?;
            report(response).await
        }
        RunnerCommands::Build(args) => {
            let response = client.post(format!("{}/api/v1/supervisor/build", args.server)).send().await?;
            report(response).await
        }
        RunnerCommands::Restart(args) => {
            let response = client
                .post(format!("{}/api/v1/supervisor/restart", args.server))
                .json(&serde_json::json!({ "build": args.build }))
                .send()
                .await?;
            report(response).await
        }
    }
}

async fn report(response: reqwest::Response) -> Result<ExitCode> {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!("server returned {status}: {text}");
    }
    if !text.is_empty() {
        println!("{text}");
    }
    Ok(ExitCode::SUCCESS)
}
