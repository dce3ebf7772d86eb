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

use bytes::Bytes;

/// Current wall clock as unix epoch milliseconds.
pub fn now_millis() -> i64 { chrono::Utc::now().timestamp_millis() }

/// A single queued payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Absolute expiry in unix epoch milliseconds, `None` never expires.
    pub expire_at: Option<i64>,
    pub payload:   Bytes,
}

impl QueueEntry {
    pub fn new(expire_at: Option<i64>, payload: impl Into<Bytes>) -> Self {
        Self {
            expire_at,
            payload: payload.into(),
        }
    }

    /// An entry is expired once `now_ms` has reached its expiry.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expire_at, Some(expire_at) if expire_at <= now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_boundaries() {
        let never = QueueEntry::new(None, "a");
        assert!(!never.is_expired(i64::MAX));

        let entry = QueueEntry::new(Some(1_000), "b");
        assert!(!entry.is_expired(999));
        assert!(entry.is_expired(1_000));
        assert!(entry.is_expired(1_001));
    }
}
