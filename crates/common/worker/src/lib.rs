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

//! Background workers for redqueue.
//!
//! - [`Worker`]: trait defining work logic with lifecycle hooks
//! - [`Manager`]: spawns workers on the current runtime and stops them with a
//!   bounded graceful shutdown
//! - [`BackoffPolicy`]: adaptive polling delay for workers that poll a queue
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use redqueue_common_worker::{Manager, Progress, Result, Worker, WorkerConfig, WorkerContext};
//!
//! struct Poller;
//!
//! #[async_trait::async_trait]
//! impl Worker for Poller {
//!     fn name() -> &'static str { "poller" }
//!
//!     async fn work(&mut self, _ctx: &WorkerContext) -> Result<Progress> { Ok(Progress::Idle) }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut manager = Manager::new(&WorkerConfig::default());
//!     manager.register(Poller);
//!     manager.shutdown().await;
//! }
//! ```

mod backoff;
mod config;
mod context;
mod err;
mod manager;
mod metrics;
mod worker;

pub use backoff::BackoffPolicy;
pub use config::WorkerConfig;
pub use context::WorkerContext;
pub use err::{ErrorSeverity, Result, WorkError};
pub use manager::Manager;
pub use worker::{Progress, Worker};
