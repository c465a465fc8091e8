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

//! Queue Store: durable task queue, atomic claim, namespace isolation,
//! and stale-task recovery.

pub mod runners;
pub mod state_machine;
pub mod store;

pub use runners::RunnerDAL;
pub use store::{ClaimOutcome, QueueStore};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connection::test_database;
    use crate::models::task::{TaskStatus, TaskType};
    use std::sync::Arc;

    async fn store() -> QueueStore {
        QueueStore::new(test_database().await)
    }

    #[tokio::test]
    async fn enqueue_then_claim_then_second_claim_fails() {
        let store = store().await;
        let task = store
            .enqueue("ns1", "sess", "group", "hi", TaskType::ReadInfo)
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Queued);

        match store.claim("ns1", 10).await.unwrap() {
            ClaimOutcome::Claimed(claimed) => {
                assert_eq!(claimed.task_id.to_string(), task.task_id.to_string());
            }
            ClaimOutcome::NoneAvailable => panic!("expected a claim"),
        }

        let reread = store.get_item("ns1", task.task_id).await.unwrap();
        assert_eq!(reread.status, TaskStatus::Running);

        match store.claim("ns1", 10).await.unwrap() {
            ClaimOutcome::Claimed(_) => panic!("second claim should find nothing"),
            ClaimOutcome::NoneAvailable => {}
        }
    }

    #[tokio::test]
    async fn namespace_isolation() {
        let store = store().await;
        store
            .enqueue("ns-a", "s", "g", "hi", TaskType::ReadInfo)
            .await
            .unwrap();
        store
            .enqueue("ns-b", "s", "g", "hi", TaskType::ReadInfo)
            .await
            .unwrap();

        assert_eq!(store.list_namespace("ns-a").await.unwrap().len(), 1);
        assert_eq!(store.list_namespace("ns-b").await.unwrap().len(), 1);

        // Claiming ns-a must never return ns-b's task.
        match store.claim("ns-a", 10).await.unwrap() {
            ClaimOutcome::Claimed(t) => assert_eq!(t.namespace, "ns-a"),
            ClaimOutcome::NoneAvailable => panic!("expected claim"),
        }
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected_and_record_unchanged() {
        let store = store().await;
        let task = store
            .enqueue("ns1", "s", "g", "hi", TaskType::ReadInfo)
            .await
            .unwrap();

        // QUEUED -> COMPLETE is not in the allowed table.
        let err = store
            .update_status_with_validation(task.task_id, TaskStatus::Complete, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::QueueError::InvalidTransition { .. }));

        let reread = store.get_item("ns1", task.task_id).await.unwrap();
        assert_eq!(reread.status, TaskStatus::Queued);
    }

    #[tokio::test]
    async fn terminal_state_rejects_further_mutation() {
        let store = store().await;
        let task = store
            .enqueue("ns1", "s", "g", "hi", TaskType::ReadInfo)
            .await
            .unwrap();
        store.claim("ns1", 10).await.unwrap();
        store
            .update_status_with_validation(task.task_id, TaskStatus::Complete, None, Some("done".into()))
            .await
            .unwrap();

        let err = store
            .update_status_with_validation(task.task_id, TaskStatus::Running, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::QueueError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn awaiting_response_round_trip() {
        let store = store().await;
        let task = store
            .enqueue("ns1", "s", "g", "hi", TaskType::ReadInfo)
            .await
            .unwrap();
        store.claim("ns1", 10).await.unwrap();

        let clarified = store
            .set_awaiting_response(task.task_id, "which file?".into(), None)
            .await
            .unwrap();
        assert_eq!(clarified.status, TaskStatus::AwaitingResponse);
        assert_eq!(clarified.clarification.as_deref(), Some("which file?"));

        let resumed = store
            .resume_with_response(task.task_id, "main.rs".into())
            .await
            .unwrap();
        assert_eq!(resumed.status, TaskStatus::Queued);
        assert_eq!(resumed.conversation_history.len(), 1);
        assert_eq!(resumed.conversation_history[0].content, "main.rs");
    }

    #[tokio::test]
    async fn stale_running_tasks_are_recovered() {
        let store = store().await;
        let task = store
            .enqueue("ns1", "s", "g", "hi", TaskType::ReadInfo)
            .await
            .unwrap();
        store.claim("ns1", 10).await.unwrap();

        // max_age_ms=0 means "anything not updated in the last instant" is stale.
        let recovered = store.recover_stale_tasks(0).await.unwrap();
        assert_eq!(recovered, 1);

        let reread = store.get_item("ns1", task.task_id).await.unwrap();
        assert_eq!(reread.status, TaskStatus::Error);
        assert!(reread.error_message.unwrap().contains("stale"));

        // Idempotent: nothing left to recover.
        assert_eq!(store.recover_stale_tasks(0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn no_double_execution_under_concurrent_claims() {
        let store = Arc::new(store().await);
        store
            .enqueue("ns1", "s", "g", "hi", TaskType::ReadInfo)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.claim("ns1", 10).await.unwrap() }));
        }

        let mut claimed_count = 0;
        for h in handles {
            if let ClaimOutcome::Claimed(_) = h.await.unwrap() {
                claimed_count += 1;
            }
        }
        assert_eq!(claimed_count, 1, "exactly one concurrent claim() should win");
    }
}
