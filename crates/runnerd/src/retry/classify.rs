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

//! Failure classification: turns an executor's `TaskResult` into one of
//! a fixed set of failure causes the retry engine knows how to act on.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The fixed set of causes a failed `TaskResult` is sorted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureType {
    Incomplete,
    QualityFailure,
    Timeout,
    TransientError,
    RateLimit,
    FatalError,
    EscalateRequired,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::Incomplete => "INCOMPLETE",
            FailureType::QualityFailure => "QUALITY_FAILURE",
            FailureType::Timeout => "TIMEOUT",
            FailureType::TransientError => "TRANSIENT_ERROR",
            FailureType::RateLimit => "RATE_LIMIT",
            FailureType::FatalError => "FATAL_ERROR",
            FailureType::EscalateRequired => "ESCALATE_REQUIRED",
        }
    }

    /// `{INCOMPLETE, QUALITY_FAILURE, TIMEOUT, TRANSIENT_ERROR, RATE_LIMIT}`.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureType::FatalError | FailureType::EscalateRequired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    Pass,
    Fail,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityResult {
    pub criterion: String,
    pub passed: bool,
}

/// The outcome of one executor attempt, as handed to the Retry Engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: ResultStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub quality_results: Vec<QualityResult>,
    #[serde(default)]
    pub detected_issues: Vec<String>,
}

impl TaskResult {
    pub fn pass() -> Self {
        Self {
            status: ResultStatus::Pass,
            output: None,
            error: None,
            quality_results: Vec::new(),
            detected_issues: Vec::new(),
        }
    }
}

static OMISSION_MARKERS: &[&str] = &["...", "/* ... */", "省略", "등등"];
static ETC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\betc\.?\b").unwrap());

static FATAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(401|403)\b|auth|permission|denied").unwrap());
static TRANSIENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b5\d{2}\b|ECONNREFUSED|ETIMEDOUT|network|connection").unwrap());
static RATE_LIMIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b429\b|rate.?limit").unwrap());

fn contains_omission_marker(output: &str) -> bool {
    OMISSION_MARKERS.iter().any(|m| output.contains(m)) || ETC_RE.is_match(output)
}

/// Classifies a `TaskResult` into exactly one `FailureType`, checking in
/// this order: status=TIMEOUT -> quality_results failure -> omission
/// marker in output -> error-substring matches (fatal, then transient,
/// then rate-limit) -> detected_issues non-empty -> generic FAIL/ERROR.
///
/// Only called when `result.status != PASS`; callers should check PASS
/// first (see `decide_retry`).
pub fn classify(result: &TaskResult) -> FailureType {
    if result.status == ResultStatus::Timeout {
        return FailureType::Timeout;
    }

    if result.quality_results.iter().any(|q| !q.passed) {
        return FailureType::QualityFailure;
    }

    if let Some(output) = &result.output {
        if contains_omission_marker(output) {
            return FailureType::Incomplete;
        }
    }

    if let Some(error) = &result.error {
        if FATAL_RE.is_match(error) {
            return FailureType::FatalError;
        }
        if TRANSIENT_RE.is_match(error) {
            return FailureType::TransientError;
        }
        if RATE_LIMIT_RE.is_match(error) {
            return FailureType::RateLimit;
        }
    }

    if !result.detected_issues.is_empty() {
        // Unclassifiable structured failure: fail closed, never silently retried.
        return FailureType::EscalateRequired;
    }

    // Generic FAIL/ERROR with nothing more specific to go on.
    FailureType::EscalateRequired
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(error: &str) -> TaskResult {
        TaskResult {
            status: ResultStatus::Fail,
            output: None,
            error: Some(error.to_string()),
            quality_results: Vec::new(),
            detected_issues: Vec::new(),
        }
    }

    #[test]
    fn classifies_timeout_before_anything_else() {
        let mut result = failed("401 unauthorized");
        result.status = ResultStatus::Timeout;
        assert_eq!(classify(&result), FailureType::Timeout);
    }

    #[test]
    fn classifies_quality_failure() {
        let mut result = TaskResult::pass();
        result.status = ResultStatus::Fail;
        result.quality_results.push(QualityResult {
            criterion: "has_tests".into(),
            passed: false,
        });
        assert_eq!(classify(&result), FailureType::QualityFailure);
    }

    #[test]
    fn classifies_incomplete_output() {
        let mut result = failed("no error here");
        result.output = Some("fn foo() { /* ... */ }".to_string());
        assert_eq!(classify(&result), FailureType::Incomplete);
    }

    #[test]
    fn classifies_fatal_before_transient_before_rate_limit() {
        assert_eq!(classify(&failed("401 unauthorized")), FailureType::FatalError);
        assert_eq!(classify(&failed("HTTP 503 Service Unavailable")), FailureType::TransientError);
        assert_eq!(classify(&failed("HTTP 429 rate limit")), FailureType::RateLimit);
    }

    #[test]
    fn fatal_wins_even_if_rate_limit_substring_also_present() {
        let result = failed("401 unauthorized, also got rate limited earlier");
        assert_eq!(classify(&result), FailureType::FatalError);
    }

    #[test]
    fn unclassifiable_failure_escalates() {
        let result = failed("the model refused without explanation");
        assert_eq!(classify(&result), FailureType::EscalateRequired);
    }

    #[test]
    fn retryable_set_matches_spec() {
        assert!(FailureType::Incomplete.is_retryable());
        assert!(FailureType::QualityFailure.is_retryable());
        assert!(FailureType::Timeout.is_retryable());
        assert!(FailureType::TransientError.is_retryable());
        assert!(FailureType::RateLimit.is_retryable());
        assert!(!FailureType::FatalError.is_retryable());
        assert!(!FailureType::EscalateRequired.is_retryable());
    }
}
