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

//! Durable task queue: atomic claim, state-machine-validated transitions,
//! and namespace-scoped listing.
//!
//! Every mutation is transactional: the status update and its append-only
//! event are written together, or neither is.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::SqliteConnection;
use tracing::{debug, info, warn};

use crate::database::schema::{conversation_messages, task_events, tasks};
use crate::database::types::{RowId, Timestamp};
use crate::database::Database;
use crate::error::QueueError;
use crate::models::task::{ConversationMessage, Task, TaskEvent, TaskStatus, TaskType};
use crate::queue::state_machine;

#[derive(Queryable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = tasks)]
struct TaskRow {
    task_id: RowId,
    namespace: String,
    task_group_id: String,
    session_id: String,
    status: String,
    task_type: String,
    prompt: String,
    created_at: Timestamp,
    updated_at: Timestamp,
    output: Option<String>,
    error_message: Option<String>,
    clarification: Option<String>,
}

#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = conversation_messages)]
struct MessageRow {
    id: RowId,
    task_id: RowId,
    role: String,
    content: String,
    created_at: Timestamp,
}

#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = task_events)]
struct EventRow {
    id: RowId,
    task_id: RowId,
    event_type: String,
    details: Option<String>,
    created_at: Timestamp,
}

fn row_to_task(row: TaskRow, messages: Vec<MessageRow>, events: Vec<EventRow>) -> Task {
    Task {
        namespace: row.namespace,
        task_id: row.task_id,
        task_group_id: row.task_group_id,
        session_id: row.session_id,
        status: TaskStatus::parse(&row.status).unwrap_or(TaskStatus::Error),
        task_type: TaskType::parse(&row.task_type),
        prompt: row.prompt,
        created_at: row.created_at,
        updated_at: row.updated_at,
        output: row.output,
        error_message: row.error_message,
        clarification: row.clarification,
        conversation_history: messages
            .into_iter()
            .map(|m| ConversationMessage {
                role: m.role,
                content: m.content,
                timestamp: m.created_at,
            })
            .collect(),
        events: events
            .into_iter()
            .map(|e| TaskEvent {
                event_type: e.event_type,
                details: e.details.and_then(|d| serde_json::from_str(&d).ok()),
                timestamp: e.created_at,
            })
            .collect(),
    }
}

/// Loads a task row plus its conversation history and events, within an
/// already-open connection/transaction.
fn load_full(conn: &mut SqliteConnection, id: RowId) -> Result<Task, diesel::result::Error> {
    let row: TaskRow = tasks::table.find(id).first(conn)?;
    let messages: Vec<MessageRow> = conversation_messages::table
        .filter(conversation_messages::task_id.eq(id))
        .order(conversation_messages::created_at.asc())
        .load(conn)?;
    let events: Vec<EventRow> = task_events::table
        .filter(task_events::task_id.eq(id))
        .order(task_events::created_at.asc())
        .load(conn)?;
    Ok(row_to_task(row, messages, events))
}

fn insert_event(
    conn: &mut SqliteConnection,
    task_id: RowId,
    event_type: &str,
    details: Option<serde_json::Value>,
) -> Result<(), diesel::result::Error> {
    let row = EventRow {
        id: RowId::new_v4(),
        task_id,
        event_type: event_type.to_string(),
        details: details.map(|d| d.to_string()),
        created_at: Timestamp::now(),
    };
    diesel::insert_into(task_events::table)
        .values(&row)
        .execute(conn)?;
    Ok(())
}

/// Runs `f` inside a SQLite `BEGIN IMMEDIATE` transaction: acquires the
/// write lock up front so concurrent callers serialize instead of
/// racing through a deferred-transaction TOCTOU window.
fn immediate_transaction<T>(
    conn: &mut SqliteConnection,
    f: impl FnOnce(&mut SqliteConnection) -> Result<T, diesel::result::Error>,
) -> Result<T, diesel::result::Error> {
    conn.batch_execute("BEGIN IMMEDIATE")?;
    match f(conn) {
        Ok(value) => {
            conn.batch_execute("COMMIT")?;
            Ok(value)
        }
        Err(e) => {
            let _ = conn.batch_execute("ROLLBACK");
            Err(e)
        }
    }
}

#[derive(Clone)]
pub struct QueueStore {
    database: Database,
}

/// Outcome of a single `claim()` call.
pub enum ClaimOutcome {
    Claimed(Task),
    NoneAvailable,
}

impl QueueStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub async fn enqueue(
        &self,
        namespace: &str,
        session_id: &str,
        task_group_id: &str,
        prompt: &str,
        task_type: TaskType,
    ) -> Result<Task, QueueError> {
        let conn = self.database.get().await?;
        let namespace = namespace.to_string();
        let session_id = session_id.to_string();
        let task_group_id = task_group_id.to_string();
        let prompt = prompt.to_string();

        let task = conn
            .interact(move |conn| -> Result<Task, diesel::result::Error> {
                let now = Timestamp::now();
                let row = TaskRow {
                    task_id: RowId::new_v4(),
                    namespace,
                    task_group_id,
                    session_id,
                    status: TaskStatus::Queued.as_str().to_string(),
                    task_type: task_type.as_str().to_string(),
                    prompt,
                    created_at: now,
                    updated_at: now,
                    output: None,
                    error_message: None,
                    clarification: None,
                };
                diesel::insert_into(tasks::table).values(&row).execute(conn)?;
                insert_event(conn, row.task_id, "task_created", None)?;
                load_full(conn, row.task_id)
            })
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))??;

        info!(task_id = %task.task_id, namespace = %task.namespace, "task enqueued");
        Ok(task)
    }

    pub async fn get_item(&self, namespace: &str, task_id: RowId) -> Result<Task, QueueError> {
        let conn = self.database.get().await?;
        let namespace = namespace.to_string();
        let task = conn
            .interact(move |conn| load_full(conn, task_id))
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
            .map_err(|e| match e {
                diesel::result::Error::NotFound => QueueError::NotFound,
                other => QueueError::StorageUnavailable(other.to_string()),
            })?;

        if task.namespace != namespace {
            return Err(QueueError::NotFound);
        }
        Ok(task)
    }

    /// Atomically claims the oldest QUEUED task for `namespace`.
    ///
    /// Fetches up to `batch_size` QUEUED candidates ordered by
    /// `created_at`, then walks them in order attempting the conditional
    /// `UPDATE ... WHERE status = 'QUEUED'` until one succeeds. Falling
    /// through to the next candidate on a lost race does useful work
    /// without weakening the single-winner guarantee: each row's update
    /// is still individually conditioned on its own current status.
    pub async fn claim(
        &self,
        namespace: &str,
        batch_size: i64,
    ) -> Result<ClaimOutcome, QueueError> {
        let conn = self.database.get().await?;
        let namespace = namespace.to_string();

        let result = conn
            .interact(move |conn| -> Result<Option<RowId>, diesel::result::Error> {
                immediate_transaction(conn, |conn| {
                    let candidates: Vec<RowId> = tasks::table
                        .filter(tasks::namespace.eq(&namespace))
                        .filter(tasks::status.eq(TaskStatus::Queued.as_str()))
                        .order(tasks::created_at.asc())
                        .limit(batch_size)
                        .select(tasks::task_id)
                        .load(conn)?;

                    let now = Timestamp::now();
                    for candidate in candidates {
                        let affected = diesel::update(
                            tasks::table
                                .filter(tasks::task_id.eq(candidate))
                                .filter(tasks::status.eq(TaskStatus::Queued.as_str())),
                        )
                        .set((tasks::status.eq(TaskStatus::Running.as_str()), tasks::updated_at.eq(now)))
                        .execute(conn)?;

                        if affected == 1 {
                            insert_event(conn, candidate, "task_claimed", None)?;
                            return Ok(Some(candidate));
                        }
                        // condition not met: raced by another worker, try next candidate.
                    }
                    Ok(None)
                })
            })
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?;

        match result {
            Some(task_id) => {
                let task = self.get_item_any_namespace(task_id).await?;
                debug!(task_id = %task_id, "task claimed");
                Ok(ClaimOutcome::Claimed(task))
            }
            None => Ok(ClaimOutcome::NoneAvailable),
        }
    }

    /// Looks a task up by id alone, without requiring its namespace. Used
    /// by callers (the claim path above, the stale chunk filter on the
    /// executor-logs SSE route) that only have a `task_id` in hand.
    pub async fn get_item_any_namespace(&self, task_id: RowId) -> Result<Task, QueueError> {
        let conn = self.database.get().await?;
        conn.interact(move |conn| load_full(conn, task_id))
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
            .map_err(|e| match e {
                diesel::result::Error::NotFound => QueueError::NotFound,
                other => QueueError::StorageUnavailable(other.to_string()),
            })
    }

    /// Validated status transition. Fails closed with `InvalidTransition`
    /// and leaves the record unchanged if `(from, to)` is not in the
    /// allowed table.
    pub async fn update_status_with_validation(
        &self,
        task_id: RowId,
        new_status: TaskStatus,
        error_message: Option<String>,
        output: Option<String>,
    ) -> Result<Task, QueueError> {
        let conn = self.database.get().await?;

        let result = conn
            .interact(move |conn| -> Result<Result<Task, (TaskStatus, TaskStatus)>, diesel::result::Error> {
                immediate_transaction(conn, |conn| {
                    let current: TaskRow = tasks::table.find(task_id).first(conn)?;
                    let from = TaskStatus::parse(&current.status).unwrap_or(TaskStatus::Error);

                    if !state_machine::allowed(from, new_status) {
                        return Ok(Err((from, new_status)));
                    }

                    let now = Timestamp::now();
                    diesel::update(tasks::table.find(task_id))
                        .set((
                            tasks::status.eq(new_status.as_str()),
                            tasks::updated_at.eq(now),
                            tasks::error_message.eq(error_message.clone()),
                            tasks::output.eq(output.clone()),
                        ))
                        .execute(conn)?;

                    insert_event(
                        conn,
                        task_id,
                        "status_changed",
                        Some(serde_json::json!({ "from": from.as_str(), "to": new_status.as_str() })),
                    )?;

                    Ok(Ok(load_full(conn, task_id)?))
                })
            })
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
            .map_err(|e| match e {
                diesel::result::Error::NotFound => QueueError::NotFound,
                other => QueueError::StorageUnavailable(other.to_string()),
            })?;

        match result {
            Ok(task) => Ok(task),
            Err((from, to)) => {
                warn!(task_id = %task_id, ?from, ?to, "rejected invalid status transition");
                Err(QueueError::InvalidTransition { from, to })
            }
        }
    }

    /// Attaches a clarification payload, preserving conversation history,
    /// and transitions RUNNING -> AWAITING_RESPONSE.
    pub async fn set_awaiting_response(
        &self,
        task_id: RowId,
        clarification: String,
        output: Option<String>,
    ) -> Result<Task, QueueError> {
        let conn = self.database.get().await?;

        let result = conn
            .interact(move |conn| -> Result<Result<Task, (TaskStatus, TaskStatus)>, diesel::result::Error> {
                immediate_transaction(conn, |conn| {
                    let current: TaskRow = tasks::table.find(task_id).first(conn)?;
                    let from = TaskStatus::parse(&current.status).unwrap_or(TaskStatus::Error);
                    let to = TaskStatus::AwaitingResponse;

                    if !state_machine::allowed(from, to) {
                        return Ok(Err((from, to)));
                    }

                    let now = Timestamp::now();
                    diesel::update(tasks::table.find(task_id))
                        .set((
                            tasks::status.eq(to.as_str()),
                            tasks::updated_at.eq(now),
                            tasks::clarification.eq(Some(clarification)),
                            tasks::output.eq(output.clone()),
                        ))
                        .execute(conn)?;

                    insert_event(conn, task_id, "awaiting_response", None)?;
                    Ok(Ok(load_full(conn, task_id)?))
                })
            })
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
            .map_err(|e| match e {
                diesel::result::Error::NotFound => QueueError::NotFound,
                other => QueueError::StorageUnavailable(other.to_string()),
            })?;

        result.map_err(|(from, to)| QueueError::InvalidTransition { from, to })
    }

    /// Appends a user-role message to `conversation_history` and
    /// transitions AWAITING_RESPONSE -> QUEUED so the dispatcher picks
    /// the task back up.
    pub async fn resume_with_response(
        &self,
        task_id: RowId,
        user_text: String,
    ) -> Result<Task, QueueError> {
        let conn = self.database.get().await?;

        let result = conn
            .interact(move |conn| -> Result<Result<Task, (TaskStatus, TaskStatus)>, diesel::result::Error> {
                immediate_transaction(conn, |conn| {
                    let current: TaskRow = tasks::table.find(task_id).first(conn)?;
                    let from = TaskStatus::parse(&current.status).unwrap_or(TaskStatus::Error);
                    let to = TaskStatus::Queued;

                    if !state_machine::allowed(from, to) {
                        return Ok(Err((from, to)));
                    }

                    let now = Timestamp::now();
                    let message = MessageRow {
                        id: RowId::new_v4(),
                        task_id,
                        role: "user".to_string(),
                        content: user_text,
                        created_at: now,
                    };
                    diesel::insert_into(conversation_messages::table)
                        .values(&message)
                        .execute(conn)?;

                    diesel::update(tasks::table.find(task_id))
                        .set((
                            tasks::status.eq(to.as_str()),
                            tasks::updated_at.eq(now),
                            tasks::clarification.eq(None::<String>),
                        ))
                        .execute(conn)?;

                    insert_event(conn, task_id, "resumed_with_response", None)?;
                    Ok(Ok(load_full(conn, task_id)?))
                })
            })
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
            .map_err(|e| match e {
                diesel::result::Error::NotFound => QueueError::NotFound,
                other => QueueError::StorageUnavailable(other.to_string()),
            })?;

        result.map_err(|(from, to)| QueueError::InvalidTransition { from, to })
    }

    pub async fn append_event(
        &self,
        task_id: RowId,
        event_type: &str,
        details: Option<serde_json::Value>,
    ) -> Result<(), QueueError> {
        let conn = self.database.get().await?;
        let event_type = event_type.to_string();
        conn.interact(move |conn| insert_event(conn, task_id, &event_type, details))
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))
    }

    /// Transitions RUNNING tasks whose `updated_at` is older than
    /// `max_age_ms` to ERROR. Idempotent.
    pub async fn recover_stale_tasks(&self, max_age_ms: i64) -> Result<usize, QueueError> {
        let conn = self.database.get().await?;

        let recovered = conn
            .interact(move |conn| -> Result<usize, diesel::result::Error> {
                immediate_transaction(conn, |conn| {
                    let now = Timestamp::now();
                    let cutoff = now.into_inner() - chrono::Duration::milliseconds(max_age_ms);
                    let cutoff = Timestamp::from(cutoff);

                    let stale: Vec<RowId> = tasks::table
                        .filter(tasks::status.eq(TaskStatus::Running.as_str()))
                        .filter(tasks::updated_at.lt(cutoff))
                        .select(tasks::task_id)
                        .load(conn)?;

                    for task_id in &stale {
                        let age_secs = max_age_ms / 1000;
                        let message = format!("Task stale: running for {}s without completion", age_secs);
                        diesel::update(
                            tasks::table
                                .filter(tasks::task_id.eq(task_id))
                                .filter(tasks::status.eq(TaskStatus::Running.as_str())),
                        )
                        .set((
                            tasks::status.eq(TaskStatus::Error.as_str()),
                            tasks::updated_at.eq(now),
                            tasks::error_message.eq(Some(message)),
                        ))
                        .execute(conn)?;
                        insert_event(conn, *task_id, "task_stale_recovered", None)?;
                    }

                    Ok(stale.len())
                })
            })
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?;

        if recovered > 0 {
            warn!(count = recovered, "recovered stale RUNNING tasks");
        }
        Ok(recovered)
    }

    /// Sweeps AWAITING_RESPONSE tasks older than `max_age_ms` to ERROR.
    /// Ownership resolved in DESIGN.md: a Dispatcher-level sweeper calls
    /// this, the Queue Store only exposes the scan+transition primitive.
    pub async fn recover_stale_awaiting_response(
        &self,
        max_age_ms: i64,
    ) -> Result<usize, QueueError> {
        let conn = self.database.get().await?;

        let recovered = conn
            .interact(move |conn| -> Result<usize, diesel::result::Error> {
                immediate_transaction(conn, |conn| {
                    let now = Timestamp::now();
                    let cutoff = Timestamp::from(now.into_inner() - chrono::Duration::milliseconds(max_age_ms));

                    let stale: Vec<RowId> = tasks::table
                        .filter(tasks::status.eq(TaskStatus::AwaitingResponse.as_str()))
                        .filter(tasks::updated_at.lt(cutoff))
                        .select(tasks::task_id)
                        .load(conn)?;

                    for task_id in &stale {
                        diesel::update(
                            tasks::table
                                .filter(tasks::task_id.eq(task_id))
                                .filter(tasks::status.eq(TaskStatus::AwaitingResponse.as_str())),
                        )
                        .set((
                            tasks::status.eq(TaskStatus::Error.as_str()),
                            tasks::updated_at.eq(now),
                            tasks::error_message.eq(Some("Awaiting response timed out".to_string())),
                        ))
                        .execute(conn)?;
                        insert_event(conn, *task_id, "awaiting_response_timed_out", None)?;
                    }

                    Ok(stale.len())
                })
            })
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?;

        Ok(recovered)
    }

    pub async fn list_namespace(&self, namespace: &str) -> Result<Vec<Task>, QueueError> {
        let conn = self.database.get().await?;
        let namespace = namespace.to_string();
        let ids: Vec<RowId> = conn
            .interact(move |conn| {
                tasks::table
                    .filter(tasks::namespace.eq(&namespace))
                    .order(tasks::created_at.asc())
                    .select(tasks::task_id)
                    .load(conn)
            })
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?;

        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            tasks.push(self.get_item_any_namespace(id).await?);
        }
        Ok(tasks)
    }

    pub async fn list_group(&self, namespace: &str, task_group_id: &str) -> Result<Vec<Task>, QueueError> {
        let conn = self.database.get().await?;
        let namespace = namespace.to_string();
        let task_group_id = task_group_id.to_string();
        let ids: Vec<RowId> = conn
            .interact(move |conn| {
                tasks::table
                    .filter(tasks::namespace.eq(&namespace))
                    .filter(tasks::task_group_id.eq(&task_group_id))
                    .order(tasks::created_at.asc())
                    .select(tasks::task_id)
                    .load(conn)
            })
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?;

        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            tasks.push(self.get_item_any_namespace(id).await?);
        }
        Ok(tasks)
    }

    /// Cross-namespace admin summary, listing every namespace with tasks.
    pub async fn get_all_namespaces(&self) -> Result<Vec<String>, QueueError> {
        let conn = self.database.get().await?;
        #[derive(QueryableByName)]
        struct Row {
            #[diesel(sql_type = Text)]
            namespace: String,
        }
        let rows: Vec<Row> = conn
            .interact(|conn| {
                diesel::sql_query("SELECT DISTINCT namespace FROM tasks ORDER BY namespace").load(conn)
            })
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?;
        Ok(rows.into_iter().map(|r| r.namespace).collect())
    }
}
