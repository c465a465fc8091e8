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

//! Retry backoff strategies: fixed, linear, and exponential, all capped
//! and optionally jittered.

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub strategy: BackoffStrategy,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Multiplier applied per attempt under `Exponential`. Spec default is 2.
    pub multiplier: f64,
    /// Symmetric jitter fraction in `[0, 1]`; 0 disables jitter.
    pub jitter: f64,
}

impl BackoffConfig {
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            base_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    pub fn exponential(base_delay_ms: u64, max_delay_ms: u64, jitter: f64) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base_delay_ms,
            max_delay_ms,
            multiplier: 2.0,
            jitter,
        }
    }

    /// Delay before the given attempt number (1-indexed: the delay before
    /// the *first* retry is `delay_for(1)`), capped at `max_delay_ms` and
    /// then jittered.
    pub fn delay_for(&self, attempt_number: u32) -> u64 {
        let raw = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay_ms as f64,
            BackoffStrategy::Linear => self.base_delay_ms as f64 * attempt_number as f64,
            BackoffStrategy::Exponential => {
                self.base_delay_ms as f64 * self.multiplier.powi(attempt_number as i32 - 1)
            }
        };
        let capped = raw.min(self.max_delay_ms as f64);
        apply_jitter(capped, self.jitter, self.max_delay_ms as f64)
    }
}

/// Jitters `delay` by `+/- jitter` fraction, then re-clamps to
/// `max_delay_ms` so a positive jitter draw can never push the result
/// back above the cap.
fn apply_jitter(delay: f64, jitter: f64, max_delay_ms: f64) -> u64 {
    if jitter <= 0.0 {
        return delay.round() as u64;
    }
    let factor = rand::thread_rng().gen_range(-1.0..=1.0);
    let jittered = delay + factor * delay * jitter;
    jittered.max(0.0).min(max_delay_ms).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_never_changes() {
        let cfg = BackoffConfig::fixed(5_000);
        assert_eq!(cfg.delay_for(1), 5_000);
        assert_eq!(cfg.delay_for(10), 5_000);
    }

    #[test]
    fn linear_grows_by_base_delay() {
        let cfg = BackoffConfig {
            strategy: BackoffStrategy::Linear,
            base_delay_ms: 1_000,
            max_delay_ms: 100_000,
            multiplier: 1.0,
            jitter: 0.0,
        };
        assert_eq!(cfg.delay_for(1), 1_000);
        assert_eq!(cfg.delay_for(3), 3_000);
    }

    #[test]
    fn exponential_doubles_by_default() {
        let cfg = BackoffConfig::exponential(1_000, 1_000_000, 0.0);
        assert_eq!(cfg.delay_for(1), 1_000);
        assert_eq!(cfg.delay_for(2), 2_000);
        assert_eq!(cfg.delay_for(3), 4_000);
    }

    #[test]
    fn exponential_caps_at_max_delay() {
        let cfg = BackoffConfig::exponential(1_000, 5_000, 0.0);
        assert_eq!(cfg.delay_for(10), 5_000);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let cfg = BackoffConfig::exponential(4_000, 60_000, 0.5);
        for attempt in 1..=3 {
            for _ in 0..50 {
                let delay = cfg.delay_for(attempt);
                let base = cfg.delay_for_unjittered(attempt);
                let lower = (base as f64 * 0.5).floor() as u64;
                let upper = (base as f64 * 1.5).ceil() as u64;
                assert!(delay >= lower && delay <= upper, "delay {delay} out of [{lower}, {upper}]");
            }
        }
    }
}

#[cfg(test)]
impl BackoffConfig {
    fn delay_for_unjittered(&self, attempt_number: u32) -> u64 {
        let mut unjittered = *self;
        unjittered.jitter = 0.0;
        unjittered.delay_for(attempt_number)
    }
}
