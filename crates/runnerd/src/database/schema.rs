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

//! Diesel table definitions, hand-written to mirror
//! `migrations/2024-01-01-000000_init/up.sql`.

diesel::table! {
    tasks (task_id) {
        task_id -> Text,
        namespace -> Text,
        task_group_id -> Text,
        session_id -> Text,
        status -> Text,
        task_type -> Text,
        prompt -> Text,
        created_at -> Text,
        updated_at -> Text,
        output -> Nullable<Text>,
        error_message -> Nullable<Text>,
        clarification -> Nullable<Text>,
    }
}

diesel::table! {
    conversation_messages (id) {
        id -> Text,
        task_id -> Text,
        role -> Text,
        content -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    task_events (id) {
        id -> Text,
        task_id -> Text,
        event_type -> Text,
        details -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    retry_histories (id) {
        id -> Text,
        task_id -> Text,
        subtask_id -> Nullable<Text>,
        retry_count -> Integer,
    }
}

diesel::table! {
    retry_attempts (id) {
        id -> Text,
        retry_history_id -> Text,
        attempt_number -> Integer,
        timestamp -> Text,
        failure_type -> Nullable<Text>,
        status -> Text,
        error_message -> Nullable<Text>,
        duration_ms -> Integer,
    }
}

diesel::table! {
    runners (namespace, runner_id) {
        namespace -> Text,
        runner_id -> Text,
        started_at -> Text,
        last_heartbeat -> Text,
        status -> Text,
        project_root -> Nullable<Text>,
    }
}

diesel::table! {
    build_meta (id) {
        id -> Integer,
        build_sha -> Text,
        build_timestamp -> Text,
    }
}

diesel::table! {
    activity_events (id) {
        id -> Text,
        org_id -> Text,
        event_type -> Text,
        project_id -> Nullable<Text>,
        session_id -> Nullable<Text>,
        summary -> Text,
        importance -> Text,
        details -> Nullable<Text>,
        created_at -> Text,
    }
}
