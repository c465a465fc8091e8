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

//! Server-Sent Events for live executor output: replays anything after
//! `?since=<sequence>`, then switches to the live broadcast feed,
//! interleaved with keep-alive comments.
//!
//! Both the replay and the live feed run every chunk through the
//! stale-chunk filter: a chunk carrying this task's id but a
//! `task_created_at` that predates the task's current incarnation is
//! output from a previous, cancelled-or-replaced task that reused the
//! same id, and must never reach the client. If the task itself can't be
//! found, there is no current incarnation to filter against, so nothing
//! is replayed — fail closed rather than guess.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use uuid::Uuid;

use runnerd::database::RowId;
use runnerd::stream::is_stale;

use crate::routes::SinceQuery;
use crate::state::AppState;

pub async fn stream_task_output(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Query(query): Query<SinceQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let task_id = RowId::from(task_id);
    let since = query.since.unwrap_or(0);

    let current_task_created_at = state
        .queue
        .get_item_any_namespace(task_id)
        .await
        .ok()
        .map(|task| task.created_at);

    let backlog = match current_task_created_at {
        Some(created_at) => state.output.get_by_task_id_filtered(task_id, created_at).await,
        // Unknown task context: no incarnation to filter against, so fail closed.
        None => Vec::new(),
    };
    let live = state.output.subscribe(task_id).await;

    let backlog_stream = stream::iter(
        backlog
            .into_iter()
            .filter(move |chunk| chunk.sequence > since)
            .map(|chunk| {
                Ok(Event::default()
                    .id(chunk.sequence.to_string())
                    .event("chunk")
                    .json_data(&chunk)
                    .unwrap_or_else(|_| Event::default()))
            }),
    );

    let live_stream = tokio_stream::wrappers::BroadcastStream::new(live).filter_map(move |result| async move {
        match result {
            Ok(chunk) if current_task_created_at.is_some_and(|t| !is_stale(&chunk, task_id, t)) => {
                Some(Ok(Event::default()
                    .id(chunk.sequence.to_string())
                    .event("chunk")
                    .json_data(&chunk)
                    .unwrap_or_else(|_| Event::default())))
            }
            _ => None,
        }
    });

    Sse::new(backlog_stream.chain(live_stream)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
