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

use crate::{backoff::BackoffPolicy, context::WorkerContext, err::Result};

/// What a single `work()` round achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Progress {
    /// Something was processed, poll again soon.
    #[default]
    Busy,
    /// Nothing to do.
    Idle,
}

/// Core worker trait for background tasks.
///
/// Implementors only need to define single-shot execution logic in `work()`.
/// The framework polls it on a [`BackoffPolicy`] schedule: the delay grows
/// while `work()` reports [`Progress::Idle`] and resets on [`Progress::Busy`].
#[async_trait::async_trait]
pub trait Worker: Send + 'static {
    /// Worker name for logging and metrics labels.
    fn name() -> &'static str
    where
        Self: Sized;

    fn backoff() -> BackoffPolicy
    where
        Self: Sized,
    {
        BackoffPolicy::default()
    }

    /// Called once before the first `work()` execution.
    async fn on_start(&mut self, _ctx: &WorkerContext) -> Result<()> { Ok(()) }

    /// Single execution unit, called each time the delay runs out.
    ///
    /// A transient error is logged and the worker keeps going, a fatal one
    /// stops it.
    async fn work(&mut self, ctx: &WorkerContext) -> Result<Progress>;

    /// Called once after the last `work()` execution, even if it failed.
    async fn on_shutdown(&mut self, _ctx: &WorkerContext) -> Result<()> { Ok(()) }
}
