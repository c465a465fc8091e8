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

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use runnerd::queue::RunnerDAL;
use runnerd::{Database, OutputStream, ProcessSupervisor, QueueStore, RunnerConfig};
use runnerd_server::{build_router, AppState};

#[derive(Debug, Parser)]
#[command(name = "runnerd-server", about = "HTTP/SSE surface for the task orchestration runner")]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };

    let database = Database::connect(&config.database_url, 8)?;
    database.migrate().await?;

    let mut supervisor = ProcessSupervisor::new(
        config.supervisor.executor_binary.clone(),
        config.supervisor.executor_args.clone(),
    );
    if let Some(build_command) = &config.supervisor.build_command {
        if let Some((program, rest)) = build_command.split_first() {
            supervisor = supervisor.with_build_command(program.clone(), rest.to_vec());
        }
    }

    let state = AppState {
        queue: QueueStore::new(database.clone()),
        runners: RunnerDAL::new(database),
        output: OutputStream::new(),
        supervisor: Arc::new(supervisor),
    };

    let app = build_router(state).layer(CorsLayer::permissive()).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    tracing::info!(%addr, "runnerd-server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    tracing::info!("runnerd-server shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
}
