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

pub mod claim;
pub mod enqueue;
pub mod exec;
pub mod list;
pub mod resume;
pub mod run;
pub mod runner;
pub mod status;

use anyhow::Result;
use runnerd::{Database, QueueStore};

pub(crate) async fn open_queue(database_url: &str) -> Result<QueueStore> {
    let database = Database::connect(database_url, 4)?;
    database.migrate().await?;
    Ok(QueueStore::new(database))
}
