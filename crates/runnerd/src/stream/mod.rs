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

//! Executor Output Stream: an in-memory ring buffer of output chunks
//! per task, with live subscribers fed through `tokio::sync::broadcast`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::database::types::{RowId, Timestamp};

/// Which pipe (or internal source) a chunk of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
    System,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputChunk {
    pub task_id: RowId,
    /// The creation time of the task this chunk was appended under. Used
    /// by the stale-chunk filter: a chunk whose `task_id` matches the
    /// caller's task but whose `task_created_at` predates it came from a
    /// previous task that reused the same id, and must be dropped.
    pub task_created_at: Timestamp,
    pub session_id: String,
    pub sequence: u64,
    pub stream: StreamKind,
    pub content: String,
    pub timestamp: Timestamp,
}

/// True if `chunk` is stale relative to a task context created at
/// `current_task_created_at`: same task id, but appended under an older
/// incarnation of that id. Fails closed — callers should drop, not keep,
/// whatever this returns `true` for.
pub fn is_stale(chunk: &OutputChunk, task_id: RowId, current_task_created_at: Timestamp) -> bool {
    chunk.task_id == task_id && chunk.task_created_at < current_task_created_at
}

struct TaskBuffer {
    chunks: VecDeque<OutputChunk>,
    next_sequence: u64,
    sender: broadcast::Sender<OutputChunk>,
}

impl TaskBuffer {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            chunks: VecDeque::new(),
            next_sequence: 0,
            sender,
        }
    }
}

/// Caps how many chunks are retained per task before the oldest are
/// evicted (FIFO), so a long-running task can't grow the buffer without
/// bound.
const MAX_CHUNKS_PER_TASK: usize = 10_000;

#[derive(Clone)]
pub struct OutputStream {
    buffers: Arc<RwLock<HashMap<String, TaskBuffer>>>,
}

impl OutputStream {
    pub fn new() -> Self {
        Self {
            buffers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn append(
        &self,
        task_id: RowId,
        task_created_at: Timestamp,
        session_id: &str,
        stream: StreamKind,
        content: String,
    ) -> OutputChunk {
        let mut buffers = self.buffers.write().await;
        let buffer = buffers
            .entry(task_id.to_string())
            .or_insert_with(TaskBuffer::new);

        let chunk = OutputChunk {
            task_id,
            task_created_at,
            session_id: session_id.to_string(),
            sequence: buffer.next_sequence,
            stream,
            content,
            timestamp: Timestamp::now(),
        };
        buffer.next_sequence += 1;
        buffer.chunks.push_back(chunk.clone());
        if buffer.chunks.len() > MAX_CHUNKS_PER_TASK {
            buffer.chunks.pop_front();
        }

        // No active subscribers is not an error; the chunk is still buffered.
        let _ = buffer.sender.send(chunk.clone());
        chunk
    }

    pub async fn subscribe(&self, task_id: RowId) -> broadcast::Receiver<OutputChunk> {
        let mut buffers = self.buffers.write().await;
        let buffer = buffers
            .entry(task_id.to_string())
            .or_insert_with(TaskBuffer::new);
        buffer.sender.subscribe()
    }

    pub async fn get_subscriber_count(&self, task_id: RowId) -> usize {
        let buffers = self.buffers.read().await;
        buffers
            .get(&task_id.to_string())
            .map(|b| b.sender.receiver_count())
            .unwrap_or(0)
    }

    pub async fn get_all(&self, task_id: RowId) -> Vec<OutputChunk> {
        let buffers = self.buffers.read().await;
        buffers
            .get(&task_id.to_string())
            .map(|b| b.chunks.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn get_recent(&self, task_id: RowId, n: usize) -> Vec<OutputChunk> {
        let all = self.get_all(task_id).await;
        let skip = all.len().saturating_sub(n);
        all.into_iter().skip(skip).collect()
    }

    /// Chunks with `sequence > since`, used for SSE resume-from-last-seen.
    pub async fn get_since(&self, task_id: RowId, since: u64) -> Vec<OutputChunk> {
        self.get_all(task_id)
            .await
            .into_iter()
            .filter(|c| c.sequence > since)
            .collect()
    }

    /// Chunks for `task_id`, with any chunk `is_stale` against
    /// `current_task_created_at` dropped fail-closed.
    pub async fn get_by_task_id_filtered(&self, task_id: RowId, current_task_created_at: Timestamp) -> Vec<OutputChunk> {
        self.get_all(task_id)
            .await
            .into_iter()
            .filter(|c| !is_stale(c, task_id, current_task_created_at))
            .collect()
    }

    pub async fn clear_task(&self, task_id: RowId) {
        let mut buffers = self.buffers.write().await;
        buffers.remove(&task_id.to_string());
    }

    pub async fn clear(&self) {
        let mut buffers = self.buffers.write().await;
        buffers.clear();
    }

    pub async fn get_active_tasks(&self) -> Vec<RowId> {
        let buffers = self.buffers.read().await;
        buffers
            .iter()
            .filter(|(_, b)| b.sender.receiver_count() > 0)
            .filter_map(|(key, _)| uuid::Uuid::parse_str(key).ok().map(RowId::from))
            .collect()
    }

    pub async fn session_id(&self, task_id: RowId) -> Option<String> {
        self.get_all(task_id).await.last().map(|c| c.session_id.clone())
    }
}

impl Default for OutputStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next_timestamp(t: Timestamp) -> Timestamp {
        Timestamp(t.into_inner() + chrono::Duration::milliseconds(1))
    }

    #[tokio::test]
    async fn append_assigns_increasing_sequence_numbers() {
        let stream = OutputStream::new();
        let task_id = RowId::new_v4();
        let created_at = Timestamp::now();
        let first = stream.append(task_id, created_at, "sess", StreamKind::Stdout, "a".into()).await;
        let second = stream.append(task_id, created_at, "sess", StreamKind::Stdout, "b".into()).await;
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
    }

    #[tokio::test]
    async fn subscriber_receives_live_chunks() {
        let stream = OutputStream::new();
        let task_id = RowId::new_v4();
        let mut rx = stream.subscribe(task_id).await;
        stream
            .append(task_id, Timestamp::now(), "sess", StreamKind::Stdout, "hello".into())
            .await;
        let chunk = rx.recv().await.unwrap();
        assert_eq!(chunk.content, "hello");
    }

    #[tokio::test]
    async fn get_since_filters_already_seen_chunks() {
        let stream = OutputStream::new();
        let task_id = RowId::new_v4();
        let created_at = Timestamp::now();
        for i in 0..5 {
            stream
                .append(task_id, created_at, "sess", StreamKind::Stdout, format!("chunk-{i}"))
                .await;
        }
        let tail = stream.get_since(task_id, 2).await;
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].sequence, 3);
    }

    #[tokio::test]
    async fn clear_task_drops_its_buffer_only() {
        let stream = OutputStream::new();
        let a = RowId::new_v4();
        let b = RowId::new_v4();
        let created_at = Timestamp::now();
        stream.append(a, created_at, "sess", StreamKind::Stdout, "a".into()).await;
        stream.append(b, created_at, "sess", StreamKind::Stdout, "b".into()).await;
        stream.clear_task(a).await;
        assert!(stream.get_all(a).await.is_empty());
        assert_eq!(stream.get_all(b).await.len(), 1);
    }

    #[tokio::test]
    async fn fifo_eviction_caps_buffer_size() {
        let stream = OutputStream::new();
        let task_id = RowId::new_v4();
        let created_at = Timestamp::now();
        for i in 0..(MAX_CHUNKS_PER_TASK + 10) {
            stream
                .append(task_id, created_at, "sess", StreamKind::Stdout, format!("{i}"))
                .await;
        }
        let all = stream.get_all(task_id).await;
        assert_eq!(all.len(), MAX_CHUNKS_PER_TASK);
        assert_eq!(all.front().unwrap().content, "10");
    }

    #[tokio::test]
    async fn stale_chunk_is_dropped_by_filtered_lookup() {
        let stream = OutputStream::new();
        let task_id = RowId::new_v4();
        let old_created_at = Timestamp::now();
        let new_created_at = next_timestamp(old_created_at);

        // Output from a previous incarnation of this task id.
        stream
            .append(task_id, old_created_at, "sess", StreamKind::Stdout, "stale".into())
            .await;
        // Output from the current incarnation.
        stream
            .append(task_id, new_created_at, "sess", StreamKind::Stdout, "fresh".into())
            .await;

        let visible = stream.get_by_task_id_filtered(task_id, new_created_at).await;
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].content, "fresh");
    }

    #[tokio::test]
    async fn chunk_from_the_current_incarnation_is_never_stale() {
        let stream = OutputStream::new();
        let task_id = RowId::new_v4();
        let created_at = Timestamp::now();
        stream
            .append(task_id, created_at, "sess", StreamKind::Stdout, "fresh".into())
            .await;

        let visible = stream.get_by_task_id_filtered(task_id, created_at).await;
        assert_eq!(visible.len(), 1);
    }

    #[test]
    fn is_stale_only_matches_same_task_id_with_older_incarnation() {
        let a = RowId::new_v4();
        let b = RowId::new_v4();
        let old_created_at = Timestamp::now();
        let new_created_at = next_timestamp(old_created_at);

        let chunk = OutputChunk {
            task_id: a,
            task_created_at: old_created_at,
            session_id: "sess".to_string(),
            sequence: 0,
            stream: StreamKind::Stdout,
            content: "x".to_string(),
            timestamp: Timestamp::now(),
        };

        assert!(is_stale(&chunk, a, new_created_at));
        assert!(!is_stale(&chunk, a, old_created_at));
        assert!(!is_stale(&chunk, b, new_created_at));
    }
}
