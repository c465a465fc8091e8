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

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "runnerd", about = "Task orchestration runner control plane")]
struct Cli {
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Enqueue a task into a namespace's queue.
    Enqueue(commands::enqueue::Args),
    /// Print a task's current record as JSON.
    Status(commands::status::Args),
    /// List every task in a namespace.
    List(commands::list::Args),
    /// Claim the next queued task for a namespace, without executing it.
    Claim(commands::claim::Args),
    /// Resume an AWAITING_RESPONSE task with a user reply.
    Resume(commands::resume::Args),
    /// Run a task to completion synchronously, exiting with a code that
    /// reflects the outcome (see EXIT CODES below).
    Exec(commands::exec::Args),
    /// Process Supervisor controls.
    Runner {
        #[command(subcommand)]
        command: commands::runner::RunnerCommands,
    },
    /// Run the long-lived dispatcher: claim loop, sweepers, and the
    /// supervised executor process, until interrupted.
    Run(commands::run::Args),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = match &cli.config {
        Some(path) => runnerd::RunnerConfig::load(path)?,
        None => runnerd::RunnerConfig::default(),
    };
    let database_url = cli.database_url.clone().unwrap_or(config.database_url.clone());

    let code = match cli.command {
        Commands::Enqueue(args) => commands::enqueue::run(&database_url, args).await?,
        Commands::Status(args) => commands::status::run(&database_url, args).await?,
        Commands::List(args) => commands::list::run(&database_url, args).await?,
        Commands::Claim(args) => commands::claim::run(&database_url, args).await?,
        Commands::Resume(args) => commands::resume::run(&database_url, args).await?,
        Commands::Exec(args) => commands::exec::run(&database_url, &config, args).await?,
        Commands::Runner { command } => commands::runner::run(&config, command).await?,
        Commands::Run(args) => commands::run::run(&database_url, &config, args).await?,
    };
    Ok(code)
}
