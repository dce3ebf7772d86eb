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

pub mod tasks;

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bon::Builder;
use parking_lot::Mutex;
use redqueue_common_storage_queue::{QueueConfig, QueueFactoryBuilder};
use redqueue_common_telemetry::{self as telemetry, LoggingOptions};
use redqueue_common_worker::{Manager, WorkerConfig};
use redqueue_server::{MemcacheServerConfig, SharedFactory, start_memcache_server};
use smart_default::SmartDefault;
use snafu::{ResultExt, Whatever};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::tasks::{TaskConfig, UrlFetchTask};

/// Represents the main application with lifecycle management
#[derive(SmartDefault)]
pub struct App {
    /// Application configuration
    pub config:             AppConfig,
    /// Controls if the application should continue running
    #[default(_code = "Arc::new(AtomicBool::new(false))")]
    pub running:            Arc<AtomicBool>,
    /// Cancelled once the server and the task runner have fully stopped
    #[default(_code = "CancellationToken::new()")]
    pub cancellation_token: CancellationToken,
}

/// Configuration for the application
#[derive(Debug, Clone, SmartDefault, Builder)]
pub struct AppConfig {
    /// Memcache protocol server configuration
    #[builder(default)]
    pub memcache:                 MemcacheServerConfig,
    /// Journal directory, durability and rotation
    #[builder(default)]
    pub queue:                    QueueConfig,
    #[builder(default)]
    pub logging:                  LoggingOptions,
    /// Background task runner
    #[builder(default)]
    pub tasks:                    TaskConfig,
    /// Whether Ctrl+C and SIGTERM stop the application
    #[default = true]
    #[builder(default = true)]
    pub enable_graceful_shutdown: bool,
}

impl AppConfig {
    #[must_use]
    pub fn open(self) -> App {
        App {
            config: self,
            ..Default::default()
        }
    }
}

/// Handle for controlling a running application
pub struct AppHandle {
    /// Sender for triggering shutdown
    shutdown_tx:        Option<oneshot::Sender<()>>,
    /// Application running flag
    running:            Arc<AtomicBool>,
    /// Cancelled once everything has stopped
    cancellation_token: CancellationToken,
    local_addr:         SocketAddr,
    factory:            SharedFactory,
}

impl AppHandle {
    /// Asks the application to stop. Use `wait_for_shutdown` to wait for it.
    pub fn shutdown(&mut self) {
        info!("Initiating graceful shutdown");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Check if the application is still running
    #[must_use]
    pub fn is_running(&self) -> bool { self.running.load(Ordering::SeqCst) }

    /// Wait until the server and the task runner have stopped
    pub async fn wait_for_shutdown(&self) { self.cancellation_token.cancelled().await; }

    /// Address the memcache server is bound to
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr { self.local_addr }

    /// The queues served by this application
    #[must_use]
    pub fn factory(&self) -> SharedFactory { Arc::clone(&self.factory) }
}

impl App {
    /// Recovers the journals, then starts the server and the task runner.
    ///
    /// Recovery finishes before the server binds, so no client ever sees a
    /// partially replayed queue.
    pub async fn start(&self) -> Result<AppHandle, Whatever> {
        info!(journal_dir = ?self.config.queue.journal_dir, "Starting redqueue");

        let mut factory = QueueFactoryBuilder::from_config(self.config.queue.clone())
            .build()
            .whatever_context("Failed to open queue factory")?;
        let summary = factory
            .recover()
            .whatever_context("Failed to recover journals")?;
        info!(
            queues = summary.queues,
            entries = summary.entries,
            orphaned = summary.orphaned,
            "Journals recovered"
        );
        let factory: SharedFactory = Arc::new(Mutex::new(factory));

        let mut server = start_memcache_server(self.config.memcache.clone(), Arc::clone(&factory))
            .await
            .whatever_context("Failed to start memcache server")?;
        server
            .wait_for_start()
            .await
            .whatever_context("Memcache server did not start")?;
        let local_addr = server.local_addr();

        let mut manager = Manager::new(
            &WorkerConfig::builder()
                .shutdown_timeout(self.config.tasks.shutdown_timeout)
                .build(),
        );
        if self.config.tasks.enabled {
            let task = UrlFetchTask::new(Arc::clone(&factory), &self.config.tasks)
                .whatever_context("Failed to build HTTP client")?;
            manager.register(task);
        }

        self.running.store(true, Ordering::SeqCst);
        info!(%local_addr, tasks = manager.len(), "Application started successfully");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let running = Arc::clone(&self.running);
        let cancellation_token = self.cancellation_token.clone();
        let enable_graceful_shutdown = self.config.enable_graceful_shutdown;

        tokio::spawn(async move {
            if enable_graceful_shutdown {
                shutdown_signal(shutdown_rx).await;
            } else {
                // Only an explicit handle shutdown stops the application
                let _ = shutdown_rx.await;
            }

            info!("Shutting down memcache server");
            server.shutdown();
            if let Err(e) = server.wait_for_stop().await {
                error!(error = %e, "Memcache server did not stop cleanly");
            }
            info!("Shutting down task runner");
            manager.shutdown().await;

            running.store(false, Ordering::SeqCst);
            cancellation_token.cancel();
            info!("Application shutdown complete");
        });

        Ok(AppHandle {
            shutdown_tx: Some(shutdown_tx),
            running: Arc::clone(&self.running),
            cancellation_token: self.cancellation_token.clone(),
            local_addr,
            factory,
        })
    }

    /// Run the application blocking until it's shut down
    pub async fn run(self) -> Result<(), Whatever> {
        let _guards = telemetry::init_global_logging("redqueue", &self.config.logging)
            .whatever_context("Failed to initialize logging")?;
        telemetry::set_panic_hook();

        let handle = self.start().await?;
        handle.wait_for_shutdown().await;
        Ok(())
    }
}

async fn shutdown_signal(shutdown_rx: oneshot::Receiver<()>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C signal"); },
        () = terminate => { info!("Received terminate signal"); },
        _ = shutdown_rx => { info!("Received shutdown signal"); },
    }
}
