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

//! Build fingerprint, updated atomically on every successful executor build.

use serde::{Deserialize, Serialize};

use crate::database::types::Timestamp;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildMeta {
    pub build_sha: String,
    pub build_timestamp: Timestamp,
}

impl BuildMeta {
    pub fn unknown() -> Self {
        Self {
            build_sha: "unbuilt00000".to_string(),
            build_timestamp: Timestamp::now(),
        }
    }
}
