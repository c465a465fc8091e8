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

//! Route handlers for the queue, runner-heartbeat, and supervisor-control
//! surfaces.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use runnerd::database::RowId;
use runnerd::models::task::{Task, TaskType};

use crate::error::{ApiError, ApiResult};
use crate::sse::stream_task_output;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/{namespace}/tasks", post(enqueue_task).get(list_tasks))
        .route("/api/v1/{namespace}/tasks/{task_id}", get(get_task))
        .route("/api/v1/{namespace}/tasks/{task_id}/resume", post(resume_task))
        .route("/api/v1/{namespace}/claim", post(claim_tasks))
        .route("/api/v1/{namespace}/runners/{runner_id}/heartbeat", post(heartbeat))
        .route("/api/v1/{namespace}/runners", get(list_runners))
        .route("/api/v1/supervisor/status", get(supervisor_status))
        .route("/api/v1/supervisor/build", post(supervisor_build))
        .route("/api/v1/supervisor/restart", post(supervisor_restart))
        .route("/api/v1/supervisor/stop", post(supervisor_stop))
        .route("/api/v1/tasks/{task_id}/logs", get(stream_task_output))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct EnqueueRequest {
    session_id: String,
    task_group_id: String,
    prompt: String,
    task_type: String,
}

async fn enqueue_task(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Json(req): Json<EnqueueRequest>,
) -> ApiResult<Json<Task>> {
    let task_type = TaskType::parse(&req.task_type);
    let task = state
        .queue
        .enqueue(&namespace, &req.session_id, &req.task_group_id, &req.prompt, task_type)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(task))
}

async fn list_tasks(State(state): State<AppState>, Path(namespace): Path<String>) -> ApiResult<Json<Vec<Task>>> {
    Ok(Json(state.queue.list_namespace(&namespace).await?))
}

async fn get_task(
    State(state): State<AppState>,
    Path((namespace, task_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.queue.get_item(&namespace, RowId::from(task_id)).await?))
}

#[derive(Debug, Deserialize)]
struct ResumeRequest {
    response: String,
}

async fn resume_task(
    State(state): State<AppState>,
    Path((_namespace, task_id)): Path<(String, Uuid)>,
    Json(req): Json<ResumeRequest>,
) -> ApiResult<Json<Task>> {
    Ok(Json(
        state.queue.resume_with_response(RowId::from(task_id), req.response).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct ClaimRequest {
    #[serde(default = "default_batch_size")]
    batch_size: usize,
}

fn default_batch_size() -> usize {
    10
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome")]
enum ClaimResponse {
    Claimed { task: Task },
    NoneAvailable,
}

async fn claim_tasks(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Json(req): Json<ClaimRequest>,
) -> ApiResult<Json<ClaimResponse>> {
    use runnerd::queue::ClaimOutcome;
    let outcome = state.queue.claim(&namespace, req.batch_size as i64).await?;
    Ok(Json(match outcome {
        ClaimOutcome::Claimed(task) => ClaimResponse::Claimed { task },
        ClaimOutcome::NoneAvailable => ClaimResponse::NoneAvailable,
    }))
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    project_root: Option<String>,
}

async fn heartbeat(
    State(state): State<AppState>,
    Path((namespace, runner_id)): Path<(String, String)>,
    Json(req): Json<HeartbeatRequest>,
) -> ApiResult<Json<runnerd::models::runner::RunnerRecord>> {
    Ok(Json(state.runners.heartbeat(&namespace, &runner_id, req.project_root).await?))
}

async fn list_runners(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> ApiResult<Json<Vec<runnerd::models::runner::RunnerRecord>>> {
    Ok(Json(state.runners.list_namespace(&namespace).await?))
}

#[derive(Debug, Serialize)]
struct SupervisorStatusResponse {
    state: String,
    pid: Option<u32>,
    build_sha: String,
}

async fn supervisor_status(State(state): State<AppState>) -> Json<SupervisorStatusResponse> {
    let status = state.supervisor.status().await;
    Json(SupervisorStatusResponse {
        state: format!("{:?}", status.state),
        pid: status.pid,
        build_sha: status.build_meta.build_sha,
    })
}

async fn supervisor_build(State(state): State<AppState>) -> ApiResult<Json<SupervisorStatusResponse>> {
    state.supervisor.build().await.map_err(ApiError::from)?;
    Ok(supervisor_status(State(state)).await)
}

#[derive(Debug, Deserialize)]
struct RestartRequest {
    #[serde(default)]
    build: bool,
}

async fn supervisor_restart(
    State(state): State<AppState>,
    Json(req): Json<RestartRequest>,
) -> ApiResult<Json<SupervisorStatusResponse>> {
    state.supervisor.restart(Duration::from_secs(5), req.build).await.map_err(ApiError::from)?;
    Ok(supervisor_status(State(state)).await)
}

async fn supervisor_stop(State(state): State<AppState>) -> ApiResult<()> {
    state.supervisor.stop(Duration::from_secs(5)).await.map_err(ApiError::from)?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    pub since: Option<u64>,
}
