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

//! Runner heartbeat CRUD. A single writer per `runner_id`.

use diesel::prelude::*;

use crate::database::schema::runners;
use crate::database::types::Timestamp;
use crate::database::Database;
use crate::error::QueueError;
use crate::models::runner::{RunnerRecord, RunnerStatus};

#[derive(Queryable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = runners)]
struct RunnerRow {
    namespace: String,
    runner_id: String,
    started_at: Timestamp,
    last_heartbeat: Timestamp,
    status: String,
    project_root: Option<String>,
}

impl From<RunnerRow> for RunnerRecord {
    fn from(row: RunnerRow) -> Self {
        RunnerRecord {
            namespace: row.namespace,
            runner_id: row.runner_id,
            started_at: row.started_at,
            last_heartbeat: row.last_heartbeat,
            status: RunnerStatus::parse(&row.status).unwrap_or(RunnerStatus::Stopped),
            project_root: row.project_root,
        }
    }
}

#[derive(Clone)]
pub struct RunnerDAL {
    database: Database,
}

impl RunnerDAL {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Registers a runner or refreshes its heartbeat (upsert on the
    /// `(namespace, runner_id)` primary key).
    pub async fn heartbeat(
        &self,
        namespace: &str,
        runner_id: &str,
        project_root: Option<String>,
    ) -> Result<RunnerRecord, QueueError> {
        let conn = self.database.get().await?;
        let namespace = namespace.to_string();
        let runner_id = runner_id.to_string();

        conn.interact(move |conn| -> Result<RunnerRecord, diesel::result::Error> {
            let now = Timestamp::now();
            let existing: Option<RunnerRow> = runners::table
                .find((namespace.clone(), runner_id.clone()))
                .first(conn)
                .optional()?;

            let row = match existing {
                Some(mut row) => {
                    row.last_heartbeat = now;
                    row.status = RunnerStatus::Running.as_str().to_string();
                    if project_root.is_some() {
                        row.project_root = project_root.clone();
                    }
                    diesel::update(runners::table.find((namespace.clone(), runner_id.clone())))
                        .set(&row)
                        .execute(conn)?;
                    row
                }
                None => {
                    let row = RunnerRow {
                        namespace: namespace.clone(),
                        runner_id: runner_id.clone(),
                        started_at: now,
                        last_heartbeat: now,
                        status: RunnerStatus::Running.as_str().to_string(),
                        project_root,
                    };
                    diesel::insert_into(runners::table).values(&row).execute(conn)?;
                    row
                }
            };
            Ok(row.into())
        })
        .await
        .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
        .map_err(|e| QueueError::StorageUnavailable(e.to_string()))
    }

    pub async fn mark_stopped(&self, namespace: &str, runner_id: &str) -> Result<(), QueueError> {
        let conn = self.database.get().await?;
        let namespace = namespace.to_string();
        let runner_id = runner_id.to_string();
        conn.interact(move |conn| {
            diesel::update(runners::table.find((namespace, runner_id)))
                .set(runners::status.eq(RunnerStatus::Stopped.as_str()))
                .execute(conn)
        })
        .await
        .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
        .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }

    pub async fn list_namespace(&self, namespace: &str) -> Result<Vec<RunnerRecord>, QueueError> {
        let conn = self.database.get().await?;
        let namespace = namespace.to_string();
        let rows: Vec<RunnerRow> = conn
            .interact(move |conn| {
                runners::table
                    .filter(runners::namespace.eq(&namespace))
                    .load(conn)
            })
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connection::test_database;

    #[tokio::test]
    async fn heartbeat_upserts_and_refreshes() {
        let dal = RunnerDAL::new(test_database().await);
        let first = dal.heartbeat("ns", "runner-1", None).await.unwrap();
        assert_eq!(first.status, RunnerStatus::Running);

        let again = dal.heartbeat("ns", "runner-1", Some("/proj".into())).await.unwrap();
        assert_eq!(again.project_root.as_deref(), Some("/proj"));
        assert_eq!(dal.list_namespace("ns").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn aliveness_uses_heartbeat_timeout() {
        let dal = RunnerDAL::new(test_database().await);
        let record = dal.heartbeat("ns", "runner-1", None).await.unwrap();
        let now = Timestamp::from(record.last_heartbeat.into_inner() + chrono::Duration::milliseconds(100));
        assert!(record.is_alive(now, 5_000));
        assert!(!record.is_alive(now, 50));
    }
}
