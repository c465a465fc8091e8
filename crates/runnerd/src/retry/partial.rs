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

//! Partial-recovery strategy for multi-subtask task groups: decide
//! whether to commit the succeeded subset, roll everything back, retry
//! only the failures, or escalate.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryStrategy {
    PartialCommit,
    RollbackAndRetry,
    RetryFailedOnly,
    Escalate,
}

/// Decides how to recover a task group given which subtasks failed,
/// which succeeded, and which succeeded subtasks depend on which others.
///
/// - No failures: commit whatever succeeded.
/// - A succeeded subtask depends (transitively, via `dependency_map`) on a
///   failed one: its output is unsound, roll everything back and retry.
/// - Otherwise the failures are independent of what succeeded: keep the
///   successes, retry only what failed.
///
/// `Escalate` is never returned automatically; callers apply it as an
/// override once retry budgets for the failed subtasks are exhausted.
pub fn partial_recovery_strategy(
    failed: &[String],
    succeeded: &[String],
    dependency_map: &HashMap<String, Vec<String>>,
) -> RecoveryStrategy {
    if failed.is_empty() {
        return RecoveryStrategy::PartialCommit;
    }

    let failed_set: HashSet<&str> = failed.iter().map(String::as_str).collect();

    for subtask in succeeded {
        if depends_on_any(subtask, &failed_set, dependency_map) {
            return RecoveryStrategy::RollbackAndRetry;
        }
    }

    RecoveryStrategy::RetryFailedOnly
}

fn depends_on_any(subtask: &str, failed: &HashSet<&str>, dependency_map: &HashMap<String, Vec<String>>) -> bool {
    let mut seen = HashSet::new();
    let mut stack = match dependency_map.get(subtask) {
        Some(deps) => deps.clone(),
        None => return false,
    };

    while let Some(dep) = stack.pop() {
        if !seen.insert(dep.clone()) {
            continue;
        }
        if failed.contains(dep.as_str()) {
            return true;
        }
        if let Some(transitive) = dependency_map.get(&dep) {
            stack.extend(transitive.clone());
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_failures_commits() {
        let deps = HashMap::new();
        assert_eq!(
            partial_recovery_strategy(&[], &["a".into()], &deps),
            RecoveryStrategy::PartialCommit
        );
    }

    #[test]
    fn independent_failure_retries_only_the_failure() {
        let deps = HashMap::new();
        let result = partial_recovery_strategy(&["b".into()], &["a".into()], &deps);
        assert_eq!(result, RecoveryStrategy::RetryFailedOnly);
    }

    #[test]
    fn dependent_success_forces_rollback() {
        let mut deps = HashMap::new();
        deps.insert("a".to_string(), vec!["b".to_string()]);
        let result = partial_recovery_strategy(&["b".into()], &["a".into()], &deps);
        assert_eq!(result, RecoveryStrategy::RollbackAndRetry);
    }

    #[test]
    fn transitive_dependency_is_followed() {
        let mut deps = HashMap::new();
        deps.insert("a".to_string(), vec!["b".to_string()]);
        deps.insert("b".to_string(), vec!["c".to_string()]);
        let result = partial_recovery_strategy(&["c".into()], &["a".into()], &deps);
        assert_eq!(result, RecoveryStrategy::RollbackAndRetry);
    }
}
