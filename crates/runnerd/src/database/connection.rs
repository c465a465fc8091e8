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

//! Database connection pool management.
//!
//! Wraps a `deadpool-diesel` SQLite pool. The pool is cheap to clone and is
//! shared between the Queue Store, Retry Engine, and Supervisor; each
//! operation checks out a connection for the duration of a single
//! transaction.

use deadpool_diesel::sqlite::{Manager, Pool, Runtime};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::QueueError;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Opens (and migrates) a SQLite database at `path`, or `:memory:`.
    pub fn connect(path: &str, max_size: usize) -> Result<Self, QueueError> {
        let manager = Manager::new(path, Runtime::Tokio1);
        let pool = Pool::builder(manager)
            .max_size(max_size)
            .build()
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Runs embedded migrations synchronously against the pool.
    pub async fn migrate(&self) -> Result<(), QueueError> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?;

        conn.interact(|conn: &mut SqliteConnection| conn.run_pending_migrations(MIGRATIONS).map(|_| ()))
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?;

        Ok(())
    }

    pub async fn get(&self) -> Result<deadpool_diesel::sqlite::Connection, QueueError> {
        self.pool
            .get()
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))
    }
}

#[cfg(test)]
pub async fn test_database() -> Database {
    let db = Database::connect(":memory:", 1).expect("open in-memory sqlite");
    db.migrate().await.expect("run migrations");
    db
}
