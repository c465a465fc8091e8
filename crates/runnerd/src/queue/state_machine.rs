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

//! The `Task.status` state machine.
//!
//! Kept as a pure function so both the DAL and property tests can check
//! `allowed(from, to)` without touching storage.

use crate::models::task::TaskStatus;
use TaskStatus::*;

/// Returns whether `from -> to` is one of the allowed transitions.
/// Terminal states (COMPLETE/ERROR/CANCELLED) never allow a next state.
pub fn allowed(from: TaskStatus, to: TaskStatus) -> bool {
    matches!(
        (from, to),
        (Queued, Running)
            | (Queued, Cancelled)
            | (Running, Complete)
            | (Running, Error)
            | (Running, Cancelled)
            | (Running, AwaitingResponse)
            | (AwaitingResponse, Queued)
            | (AwaitingResponse, Running)
            | (AwaitingResponse, Cancelled)
            | (AwaitingResponse, Error)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TaskStatus; 6] = [
        Queued,
        Running,
        AwaitingResponse,
        Complete,
        Error,
        Cancelled,
    ];

    #[test]
    fn terminal_states_allow_nothing() {
        for terminal in [Complete, Error, Cancelled] {
            for to in ALL {
                assert!(!allowed(terminal, to), "{:?} -> {:?} should be closed", terminal, to);
            }
        }
    }

    #[test]
    fn queued_transitions() {
        assert!(allowed(Queued, Running));
        assert!(allowed(Queued, Cancelled));
        assert!(!allowed(Queued, Complete));
        assert!(!allowed(Queued, Error));
        assert!(!allowed(Queued, AwaitingResponse));
        assert!(!allowed(Queued, Queued));
    }

    #[test]
    fn running_transitions() {
        for to in [Complete, Error, Cancelled, AwaitingResponse] {
            assert!(allowed(Running, to));
        }
        assert!(!allowed(Running, Queued));
        assert!(!allowed(Running, Running));
    }

    #[test]
    fn awaiting_response_transitions() {
        for to in [Queued, Running, Cancelled, Error] {
            assert!(allowed(AwaitingResponse, to));
        }
        assert!(!allowed(AwaitingResponse, Complete));
        assert!(!allowed(AwaitingResponse, AwaitingResponse));
    }

    #[test]
    fn state_machine_closure_exhaustive() {
        // For all (from, to) pairs, `allowed` matches exactly the expected transition table.
        let expected: &[(TaskStatus, TaskStatus)] = &[
            (Queued, Running),
            (Queued, Cancelled),
            (Running, Complete),
            (Running, Error),
            (Running, Cancelled),
            (Running, AwaitingResponse),
            (AwaitingResponse, Queued),
            (AwaitingResponse, Running),
            (AwaitingResponse, Cancelled),
            (AwaitingResponse, Error),
        ];
        for from in ALL {
            for to in ALL {
                let should = expected.contains(&(from, to));
                assert_eq!(allowed(from, to), should, "{:?} -> {:?}", from, to);
            }
        }
    }
}
