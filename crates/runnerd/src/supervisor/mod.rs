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

//! Process Supervisor: manages the lifecycle of the executor binary —
//! build, (re)start, stop, and status reporting.
//!
//! Mutating operations (`build`, `restart`, `stop`) serialize through a
//! single `tokio::sync::Mutex` so two callers can never race a build
//! against a restart. `status()` takes a `try_lock` instead: a status
//! check must never block behind a long-running build.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::database::types::Timestamp;
use crate::error::SupervisorError;
use crate::models::build_meta::BuildMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Running,
    Building,
}

#[derive(Debug, Clone)]
pub struct SupervisorStatus {
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub build_meta: BuildMeta,
}

struct Managed {
    child: Option<Child>,
    state: ProcessState,
    build_meta: BuildMeta,
}

/// Supervises a single long-running child process, identified by the
/// binary path and the arguments used to start it.
///
/// Stdin/stdout are line-delimited: the Dispatcher writes one JSON task
/// per line and reads one JSON `OutputChunk` per line back. These pipes
/// are guarded separately from `inner` so a blocked read never prevents
/// a concurrent `stop`/`status` from acquiring the process lock.
pub struct ProcessSupervisor {
    binary_path: String,
    args: Vec<String>,
    build_command: Option<(String, Vec<String>)>,
    inner: Arc<Mutex<Managed>>,
    stdin: Arc<Mutex<Option<tokio::process::ChildStdin>>>,
    stdout_lines: Arc<Mutex<Option<Lines<BufReader<ChildStdout>>>>>,
}

impl ProcessSupervisor {
    pub fn new(binary_path: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            args,
            build_command: None,
            inner: Arc::new(Mutex::new(Managed {
                child: None,
                state: ProcessState::Stopped,
                build_meta: BuildMeta::unknown(),
            })),
            stdin: Arc::new(Mutex::new(None)),
            stdout_lines: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_build_command(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.build_command = Some((program.into(), args));
        self
    }

    /// Non-blocking status read. If a mutation is in flight, reports the
    /// last known state rather than waiting for the lock.
    pub async fn status(&self) -> SupervisorStatus {
        match self.inner.try_lock() {
            Ok(guard) => SupervisorStatus {
                state: guard.state,
                pid: guard.child.as_ref().and_then(|c| c.id()),
                build_meta: guard.build_meta.clone(),
            },
            Err(_) => SupervisorStatus {
                state: ProcessState::Building,
                pid: None,
                build_meta: BuildMeta::unknown(),
            },
        }
    }

    pub async fn start(&self) -> Result<u32, SupervisorError> {
        let mut guard = self.inner.lock().await;
        self.start_locked(&mut guard).await
    }

    async fn start_locked(&self, guard: &mut Managed) -> Result<u32, SupervisorError> {
        if guard.child.is_some() {
            return Err(SupervisorError::ProcessError("already running".into()));
        }

        let mut child = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::ProcessError(e.to_string()))?;

        let pid = child.id().ok_or_else(|| SupervisorError::ProcessError("process exited immediately".into()))?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take().map(|out| BufReader::new(out).lines());
        *self.stdin.lock().await = stdin;
        *self.stdout_lines.lock().await = stdout;

        guard.child = Some(child);
        guard.state = ProcessState::Running;
        info!(pid, "supervisor started process");
        Ok(pid)
    }

    /// Writes one line to the managed process's stdin. Used by the
    /// Dispatcher to hand a task to an already-running executor.
    pub async fn send_line(&self, line: &str) -> Result<(), SupervisorError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| SupervisorError::ProcessError("executor stdin unavailable".into()))?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SupervisorError::ProcessError(e.to_string()))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| SupervisorError::ProcessError(e.to_string()))?;
        stdin.flush().await.map_err(|e| SupervisorError::ProcessError(e.to_string()))
    }

    /// Reads one line from the managed process's stdout, or `Ok(None)`
    /// on EOF (the process closed its output).
    pub async fn read_line(&self) -> Result<Option<String>, SupervisorError> {
        let mut guard = self.stdout_lines.lock().await;
        let lines = guard
            .as_mut()
            .ok_or_else(|| SupervisorError::ProcessError("executor stdout unavailable".into()))?;
        lines.next_line().await.map_err(|e| SupervisorError::ProcessError(e.to_string()))
    }

    pub async fn stop(&self, grace_period: Duration) -> Result<(), SupervisorError> {
        let mut guard = self.inner.lock().await;
        self.stop_locked(&mut guard, grace_period).await
    }

    async fn stop_locked(&self, guard: &mut Managed, grace_period: Duration) -> Result<(), SupervisorError> {
        *self.stdin.lock().await = None;
        *self.stdout_lines.lock().await = None;

        let Some(mut child) = guard.child.take() else {
            guard.state = ProcessState::Stopped;
            return Ok(());
        };

        #[cfg(unix)]
        if let Some(pid) = child.id() {
            // SIGTERM first, SIGKILL only if it ignores the grace period.
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }

        let waited = tokio::time::timeout(grace_period, child.wait()).await;
        if waited.is_err() {
            warn!("process ignored SIGTERM within grace period, killing");
            child.kill().await.map_err(|e| SupervisorError::ProcessError(e.to_string()))?;
        }

        guard.state = ProcessState::Stopped;
        Ok(())
    }

    /// Resolves `binary_path` to an actual file on disk: used as-is if it
    /// already names a path, otherwise searched for on `PATH`, the way a
    /// shell would resolve a bare command name.
    fn resolve_binary_path(&self) -> Option<PathBuf> {
        let candidate = Path::new(&self.binary_path);
        if candidate.components().count() > 1 {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }
        let paths = std::env::var_os("PATH")?;
        std::env::split_paths(&paths).find_map(|dir| {
            let full = dir.join(&self.binary_path);
            full.is_file().then_some(full)
        })
    }

    /// Computes a fresh 12-hex-character build fingerprint from the
    /// content of the binary the supervisor runs, mixed with the build
    /// command's own stdout so two builds of byte-identical binaries
    /// from different build commands still produce distinct shas. Falls
    /// back to hashing the binary path and args when the binary can't be
    /// located (e.g. it has not been placed on `PATH` yet).
    fn compute_build_sha(&self, build_output: &[u8]) -> String {
        let mut hasher = DefaultHasher::new();
        match self.resolve_binary_path().and_then(|path| std::fs::read(path).ok()) {
            Some(bytes) => bytes.hash(&mut hasher),
            None => {
                self.binary_path.hash(&mut hasher);
                self.args.hash(&mut hasher);
            }
        }
        build_output.hash(&mut hasher);
        format!("{:012x}", hasher.finish() & 0xFFFF_FFFF_FFFF)
    }

    /// Runs the configured build command, if any, and records its result
    /// in `build_meta` regardless of success so a failed build is still
    /// visible in status output. The fingerprint is always computed here,
    /// never accepted from a caller, so a client can't spoof `build_sha`.
    pub async fn build(&self) -> Result<BuildMeta, SupervisorError> {
        let mut guard = self.inner.lock().await;
        guard.state = ProcessState::Building;

        let Some((program, args)) = self.build_command.clone() else {
            let meta = BuildMeta {
                build_sha: self.compute_build_sha(&[]),
                build_timestamp: Timestamp::now(),
            };
            guard.build_meta = meta.clone();
            guard.state = if guard.child.is_some() { ProcessState::Running } else { ProcessState::Stopped };
            return Ok(meta);
        };

        let output = Command::new(&program)
            .args(&args)
            .output()
            .await
            .map_err(|e| SupervisorError::BuildFailed(e.to_string()))?;

        guard.state = if guard.child.is_some() { ProcessState::Running } else { ProcessState::Stopped };

        if !output.status.success() {
            return Err(SupervisorError::BuildFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        let meta = BuildMeta {
            build_sha: self.compute_build_sha(&output.stdout),
            build_timestamp: Timestamp::now(),
        };
        guard.build_meta = meta.clone();
        Ok(meta)
    }

    /// Stops the current process (if any) and starts a new one, guaranteeing
    /// the returned PID differs from whatever was running before. When
    /// `build` is set, a build runs between stop and start; if it fails,
    /// the old process is left stopped rather than started back up with a
    /// stale binary, and the previous `build_meta` is preserved untouched.
    pub async fn restart(&self, grace_period: Duration, build: bool) -> Result<u32, SupervisorError> {
        let mut guard = self.inner.lock().await;
        let previous_pid = guard.child.as_ref().and_then(|c| c.id());

        self.stop_locked(&mut guard, grace_period).await?;

        if build {
            if let Some((program, args)) = self.build_command.clone() {
                guard.state = ProcessState::Building;
                let output = Command::new(&program)
                    .args(&args)
                    .output()
                    .await
                    .map_err(|e| SupervisorError::BuildFailed(e.to_string()))?;
                if !output.status.success() {
                    guard.state = ProcessState::Stopped;
                    return Err(SupervisorError::BuildFailed(format!(
                        "{}; old process (pid {:?}) was stopped and left that way rather than \
                         restarted with a broken build",
                        String::from_utf8_lossy(&output.stderr),
                        previous_pid
                    )));
                }
                guard.build_meta = BuildMeta {
                    build_sha: self.compute_build_sha(&output.stdout),
                    build_timestamp: Timestamp::now(),
                };
            }
        }

        let new_pid = self.start_locked(&mut guard).await?;

        if previous_pid == Some(new_pid) {
            return Err(SupervisorError::ProcessError(
                "restart produced the same pid as before".into(),
            ));
        }
        Ok(new_pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleeper() -> ProcessSupervisor {
        ProcessSupervisor::new("sleep", vec!["30".to_string()])
    }

    #[tokio::test]
    async fn start_then_status_reports_running() {
        let supervisor = sleeper();
        let pid = supervisor.start().await.unwrap();
        assert!(pid > 0);
        let status = supervisor.status().await;
        assert_eq!(status.state, ProcessState::Running);
        assert_eq!(status.pid, Some(pid));
        supervisor.stop(Duration::from_millis(500)).await.unwrap();
    }

    #[tokio::test]
    async fn stop_when_not_running_is_a_noop() {
        let supervisor = sleeper();
        supervisor.stop(Duration::from_millis(100)).await.unwrap();
        assert_eq!(supervisor.status().await.state, ProcessState::Stopped);
    }

    #[tokio::test]
    async fn restart_changes_pid() {
        let supervisor = sleeper();
        let first = supervisor.start().await.unwrap();
        let second = supervisor.restart(Duration::from_millis(500), false).await.unwrap();
        assert_ne!(first, second);
        supervisor.stop(Duration::from_millis(500)).await.unwrap();
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let supervisor = sleeper();
        supervisor.start().await.unwrap();
        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, SupervisorError::ProcessError(_)));
        supervisor.stop(Duration::from_millis(500)).await.unwrap();
    }

    #[tokio::test]
    async fn build_without_command_computes_a_stable_fingerprint() {
        let supervisor = sleeper();
        let meta = supervisor.build().await.unwrap();
        assert_eq!(meta.build_sha.len(), 12);
        assert!(meta.build_sha.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(supervisor.status().await.build_meta.build_sha, meta.build_sha);

        // Same binary, same content, same fingerprint.
        let second = supervisor.build().await.unwrap();
        assert_eq!(meta.build_sha, second.build_sha);
    }

    #[tokio::test]
    async fn restart_with_build_runs_the_build_command_first() {
        let supervisor = ProcessSupervisor::new("sleep", vec!["30".to_string()])
            .with_build_command("true", vec![]);
        supervisor.start().await.unwrap();
        let pid = supervisor.restart(Duration::from_millis(500), true).await.unwrap();
        assert!(pid > 0);
        assert_ne!(supervisor.status().await.build_meta.build_sha, BuildMeta::unknown().build_sha);
        supervisor.stop(Duration::from_millis(500)).await.unwrap();
    }

    #[tokio::test]
    async fn restart_with_failing_build_leaves_process_stopped_and_build_meta_unchanged() {
        let supervisor =
            ProcessSupervisor::new("sleep", vec!["30".to_string()]).with_build_command("false", vec![]);
        supervisor.start().await.unwrap();
        let before = supervisor.status().await.build_meta.build_sha;

        let err = supervisor.restart(Duration::from_millis(500), true).await.unwrap_err();
        assert!(matches!(err, SupervisorError::BuildFailed(_)));

        let status = supervisor.status().await;
        assert_eq!(status.state, ProcessState::Stopped);
        assert_eq!(status.pid, None);
        assert_eq!(status.build_meta.build_sha, before);
    }
}
