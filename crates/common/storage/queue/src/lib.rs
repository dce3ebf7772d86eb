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

//! Journaled per-key FIFO queues.
//!
//! A [`QueueFactory`] owns one [`Queue`] per key. Every queue keeps its
//! ready entries in memory and records each state change in an append-only
//! journal file, which is replayed by [`QueueFactory::recover`] on startup.
//! Consumers can borrow entries under a [`SessionId`] and later ack or give
//! them back.

pub mod builder;
pub mod config;
pub mod entry;
pub mod error;
pub mod factory;
pub mod id;
pub mod journal;
pub mod path;
pub mod queue;
pub mod record;
pub mod recovery;

pub use builder::QueueFactoryBuilder;
pub use config::{DEFAULT_ROTATE_THRESHOLD, DurabilityMode, QueueConfig, RotationPolicy};
pub use entry::{QueueEntry, now_millis};
pub use error::{QueueError, Result};
pub use factory::{QueueFactory, RecoverySummary};
pub use id::SessionId;
pub use path::JournalFile;
pub use queue::Queue;
pub use record::JournalRecord;
pub use recovery::RecoveryInfo;
