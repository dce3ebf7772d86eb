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

//! Memcache text protocol front end of the redqueue broker.
//!
//! [`memcache::start_memcache_server`] binds a TCP listener and serves every
//! connection through a [`codec::MemcacheCodec`] framed stream and a
//! [`session::Session`] over the shared [`QueueFactory`].

pub mod codec;
pub mod command;
pub mod error;
pub mod memcache;
pub mod metrics;
pub mod session;

use std::{net::SocketAddr, sync::Arc};

pub use error::{Error, NetworkError, ProtocolError, Result};
pub use memcache::{MemcacheServerConfig, start_memcache_server};
use parking_lot::Mutex;
use redqueue_common_storage_queue::QueueFactory;
use snafu::{OptionExt, ResultExt};
use tokio::{sync::oneshot::Receiver, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::error::{JoinSnafu, StartSignalConsumedSnafu, StartSignalSnafu};

/// The factory shared by every connection and the background tasks.
///
/// Each command takes the lock once and never holds it across an `.await`.
pub type SharedFactory = Arc<Mutex<QueueFactory>>;

/// Handle for managing a running memcache service.
///
/// This handle provides control over a running service, allowing you to:
/// - Wait for the service to start accepting connections
/// - Signal graceful shutdown
/// - Wait for the service to fully stop
/// - Check if the service task has completed
pub struct ServiceHandler {
    /// Join handle for the accept loop
    join_handle:        JoinHandle<()>,
    /// Token for signalling shutdown to the accept loop and every connection
    cancellation_token: CancellationToken,
    /// Receiver for server start notification
    started_rx:         Option<Receiver<()>>,
    local_addr:         SocketAddr,
}

impl ServiceHandler {
    /// Waits for the server to start accepting connections.
    ///
    /// # Errors
    /// Fails if called twice or if the server task ended before starting.
    pub async fn wait_for_start(&mut self) -> Result<()> {
        self.started_rx
            .take()
            .context(StartSignalConsumedSnafu)?
            .await
            .context(StartSignalSnafu)?;
        Ok(())
    }

    /// Waits for the accept loop and every open connection to finish.
    ///
    /// Use this after calling `shutdown()` to ensure clean termination.
    pub async fn wait_for_stop(self) -> Result<()> {
        self.join_handle.await.context(JoinSnafu)?;
        Ok(())
    }

    /// Signals the server to begin graceful shutdown.
    ///
    /// Open connections are closed and return their reservations. Use
    /// `wait_for_stop()` to wait for the server to fully stop.
    pub fn shutdown(&self) { self.cancellation_token.cancel(); }

    /// Checks if the server task has completed.
    pub fn is_finished(&self) -> bool { self.join_handle.is_finished() }

    /// The address actually bound, useful when binding port 0.
    pub const fn local_addr(&self) -> SocketAddr { self.local_addr }
}
