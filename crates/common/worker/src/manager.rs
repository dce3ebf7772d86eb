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

use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    backoff::BackoffPolicy,
    config::WorkerConfig,
    context::WorkerContext,
    err::Result,
    metrics::{
        WORKER_ACTIVE, WORKER_ERRORS, WORKER_EXECUTION_DURATION_SECONDS, WORKER_EXECUTION_ERRORS,
        WORKER_EXECUTIONS, WORKER_IDLE_ROUNDS, WORKER_SHUTDOWN_ERRORS, WORKER_START_ERRORS,
        WORKER_STARTED, WORKER_STOPPED,
    },
    worker::{Progress, Worker},
};

/// Manages lifecycle of multiple background workers.
pub struct Manager {
    cancel_token:     CancellationToken,
    shutdown_timeout: Duration,
    joins:            JoinSet<Result<()>>,
}

impl Manager {
    /// Creates a manager. Workers run on the current tokio runtime.
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            cancel_token:     CancellationToken::new(),
            shutdown_timeout: config.shutdown_timeout(),
            joins:            JoinSet::new(),
        }
    }

    /// Number of registered workers, finished ones included until shutdown.
    pub fn len(&self) -> usize { self.joins.len() }

    pub fn is_empty(&self) -> bool { self.joins.is_empty() }

    /// Register a new worker.
    ///
    /// The worker starts immediately in a background task.
    pub fn register<W>(&mut self, mut worker: W)
    where
        W: Worker,
    {
        let name = W::name();
        let policy = W::backoff();
        let ctx = WorkerContext::new(self.cancel_token.child_token());

        self.joins.spawn(async move {
            info!(worker = name, backoff = ?policy, "Worker starting");
            WORKER_STARTED.with_label_values(&[name]).inc();
            WORKER_ACTIVE.with_label_values(&[name]).set(1);

            if let Err(e) = worker.on_start(&ctx).await {
                error!(worker = name, error = %e, "Worker failed during on_start");
                WORKER_START_ERRORS.with_label_values(&[name]).inc();
                WORKER_ACTIVE.with_label_values(&[name]).set(0);
                return Err(e);
            }

            let result = Self::run_loop(&mut worker, &ctx, policy, name).await;

            // Always call on_shutdown, even if work failed
            if let Err(e) = worker.on_shutdown(&ctx).await {
                error!(worker = name, error = %e, "Worker failed during on_shutdown");
                WORKER_SHUTDOWN_ERRORS.with_label_values(&[name]).inc();
            }

            match &result {
                Ok(()) => {
                    info!(worker = name, "Worker stopped gracefully");
                    WORKER_STOPPED.with_label_values(&[name]).inc();
                }
                Err(e) => {
                    error!(worker = name, error = %e, "Worker failed");
                    WORKER_ERRORS.with_label_values(&[name]).inc();
                }
            }
            WORKER_ACTIVE.with_label_values(&[name]).set(0);
            result
        });
    }

    async fn run_loop<W>(
        worker: &mut W,
        ctx: &WorkerContext,
        policy: BackoffPolicy,
        name: &'static str,
    ) -> Result<()>
    where
        W: Worker,
    {
        let mut backoff = policy.start();
        while !ctx.is_cancelled() {
            let delay = match Self::execute(worker, ctx, name).await? {
                Some(Progress::Busy) => backoff.reset(),
                Some(Progress::Idle) | None => backoff.idle(),
            };
            if !ctx.sleep(delay).await {
                break;
            }
        }
        Ok(())
    }

    /// Runs one `work()` round. `Ok(None)` is a transient failure that has
    /// already been logged.
    async fn execute<W>(
        worker: &mut W,
        ctx: &WorkerContext,
        name: &'static str,
    ) -> Result<Option<Progress>>
    where
        W: Worker,
    {
        let start = Instant::now();
        match worker.work(ctx).await {
            Ok(progress) => {
                WORKER_EXECUTIONS.with_label_values(&[name]).inc();
                WORKER_EXECUTION_DURATION_SECONDS
                    .with_label_values(&[name])
                    .observe(start.elapsed().as_secs_f64());
                if progress == Progress::Idle {
                    WORKER_IDLE_ROUNDS.with_label_values(&[name]).inc();
                }
                Ok(Some(progress))
            }
            Err(e) if e.is_transient() => {
                warn!(worker = name, error = %e, "Worker execution failed, will retry");
                WORKER_EXECUTION_ERRORS.with_label_values(&[name]).inc();
                Ok(None)
            }
            Err(e) => {
                error!(worker = name, error = %e, "Worker execution failed");
                WORKER_EXECUTION_ERRORS.with_label_values(&[name]).inc();
                Err(e)
            }
        }
    }

    /// Gracefully shutdown all workers.
    ///
    /// Cancels all workers and waits for them to finish within the configured
    /// timeout. Workers not responding in time will be aborted.
    pub async fn shutdown(mut self) {
        info!("Shutting down worker manager");
        self.cancel_token.cancel();

        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        let mut aborted_count = 0;
        let mut total_count = 0;

        loop {
            tokio::select! {
                result = self.joins.join_next() => {
                    match result {
                        Some(Ok(Ok(()))) => {
                            total_count += 1;
                        }
                        Some(Ok(Err(e))) => {
                            total_count += 1;
                            error!(error = %e, "Worker error during shutdown");
                        }
                        Some(Err(e)) => {
                            total_count += 1;
                            if e.is_cancelled() {
                                aborted_count += 1;
                            } else {
                                error!(error = ?e, "Join error during shutdown");
                            }
                        }
                        None => break,
                    }
                }
                () = tokio::time::sleep_until(deadline) => {
                    error!(
                        timeout = ?self.shutdown_timeout,
                        "Shutdown timeout reached, aborting remaining workers"
                    );
                    self.joins.abort_all();

                    while let Some(result) = self.joins.join_next().await {
                        total_count += 1;
                        if let Err(e) = result && e.is_cancelled() {
                            aborted_count += 1;
                        }
                    }
                    break;
                }
            }
        }

        if aborted_count > 0 {
            error!(
                stopped = total_count - aborted_count,
                aborted = aborted_count,
                "Worker manager shutdown complete"
            );
        } else {
            info!(stopped = total_count, "Worker manager shutdown complete");
        }
    }
}
