// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

/// Delay schedule for polling workers.
///
/// The delay starts at `initial_delay`, grows by `factor` after every idle
/// round and is capped at `max_delay`. Any productive round resets it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay:     Duration,
    pub factor:        f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(20),
            max_delay:     Duration::from_secs(5),
            factor:        1.5,
        }
    }
}

impl BackoffPolicy {
    pub(crate) fn start(self) -> Backoff {
        Backoff {
            current: self.initial_delay,
            policy:  self,
        }
    }
}

/// Running state of a [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    policy:  BackoffPolicy,
    current: Duration,
}

impl Backoff {
    #[cfg(test)]
    pub(crate) fn current(&self) -> Duration { self.current }

    /// Grows the delay after an idle round and returns it.
    pub(crate) fn idle(&mut self) -> Duration {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let grown = Duration::from_nanos((self.current.as_nanos() as f64 * self.policy.factor) as u64);
        self.current = std::cmp::min(grown, self.policy.max_delay);
        self.current
    }

    pub(crate) fn reset(&mut self) -> Duration {
        self.current = self.policy.initial_delay;
        self.current
    }
}
