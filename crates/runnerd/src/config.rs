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

//! Runtime configuration, loaded from a TOML file and overridable by
//! environment variables at the CLI/server boundary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::retry::{BackoffConfig, BackoffStrategy};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub state_dir: PathBuf,
    pub database_url: String,
    pub default_namespace: String,
    pub heartbeat_timeout_ms: u64,
    pub stale_task_max_age_ms: u64,
    pub awaiting_response_timeout_ms: u64,
    pub claim_batch_size: usize,
    pub retry: RetryConfigFile,
    pub supervisor: SupervisorConfig,
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfigFile {
    pub default_max_retries: u32,
    pub default_base_delay_ms: u64,
    pub default_max_delay_ms: u64,
    pub default_strategy: String,
    pub default_jitter: f64,
}

impl Default for RetryConfigFile {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            default_base_delay_ms: 1_000,
            default_max_delay_ms: 30_000,
            default_strategy: "exponential".to_string(),
            default_jitter: 0.1,
        }
    }
}

impl RetryConfigFile {
    pub fn to_backoff_config(&self) -> BackoffConfig {
        let strategy = match self.default_strategy.as_str() {
            "fixed" => BackoffStrategy::Fixed,
            "linear" => BackoffStrategy::Linear,
            _ => BackoffStrategy::Exponential,
        };
        BackoffConfig {
            strategy,
            base_delay_ms: self.default_base_delay_ms,
            max_delay_ms: self.default_max_delay_ms,
            multiplier: 2.0,
            jitter: self.default_jitter,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Binary invoked per claimed task over the line-delimited stdio
    /// protocol (see `crate::executor`).
    pub executor_binary: String,
    pub executor_args: Vec<String>,
    pub grace_period_ms: u64,
    pub build_command: Option<Vec<String>>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            executor_binary: "runnerd-executor".to_string(),
            executor_args: Vec::new(),
            grace_period_ms: 5_000,
            build_command: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub max_chunks_per_task: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_chunks_per_task: 10_000,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let state_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("runnerd");
        Self {
            database_url: format!("{}/runnerd.sqlite3", state_dir.display()),
            state_dir,
            default_namespace: "default".to_string(),
            heartbeat_timeout_ms: 30_000,
            stale_task_max_age_ms: 15 * 60 * 1_000,
            awaiting_response_timeout_ms: 24 * 60 * 60 * 1_000,
            claim_batch_size: 10,
            retry: RetryConfigFile::default(),
            supervisor: SupervisorConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl RunnerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = RunnerConfig::default();
        assert!(config.claim_batch_size > 0);
        assert!(config.heartbeat_timeout_ms > 0);
    }

    #[test]
    fn retry_config_file_maps_to_backoff_config() {
        let file = RetryConfigFile::default();
        let backoff = file.to_backoff_config();
        assert_eq!(backoff.strategy, BackoffStrategy::Exponential);
        assert_eq!(backoff.base_delay_ms, 1_000);
    }

    #[test]
    fn load_missing_file_errors() {
        let err = RunnerConfig::load(Path::new("/nonexistent/runnerd.toml"));
        assert!(err.is_err());
    }

    #[test]
    fn load_parses_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runnerd.toml");
        std::fs::write(&path, "claim_batch_size = 25\n").unwrap();
        let config = RunnerConfig::load(&path).unwrap();
        assert_eq!(config.claim_batch_size, 25);
    }
}
