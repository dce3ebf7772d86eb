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

use tokio_util::sync::CancellationToken;

/// Context passed to each worker instance.
#[derive(Clone)]
pub struct WorkerContext {
    cancel_token: CancellationToken,
}

impl WorkerContext {
    pub(crate) const fn new(cancel_token: CancellationToken) -> Self { WorkerContext { cancel_token } }

    pub fn is_cancelled(&self) -> bool { self.cancel_token.is_cancelled() }

    pub async fn cancelled(&self) { self.cancel_token.cancelled().await }

    /// Get a child cancellation token for sub-tasks.
    pub fn child_token(&self) -> CancellationToken { self.cancel_token.child_token() }

    /// Sleeps for `duration` unless cancelled first. Returns false when
    /// cancelled.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(duration) => true,
            () = self.cancel_token.cancelled() => false,
        }
    }
}
