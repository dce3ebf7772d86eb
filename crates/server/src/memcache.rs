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

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use redqueue_error::ErrorExt;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ResultExt;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::JoinSet,
};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{debug, info, warn};

use crate::{
    ServiceHandler, SharedFactory,
    codec::{DEFAULT_MAX_ITEM_SIZE, DEFAULT_MAX_LINE_LENGTH, Frame, MemcacheCodec},
    command::Reply,
    error::{BindSnafu, ParseAddressSnafu, Result},
    metrics::{CONNECTIONS_ACCEPTED, ERROR_REPLIES},
    session::Session,
};

/// Configuration options for the memcache protocol server
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, bon::Builder)]
#[serde(default)]
pub struct MemcacheServerConfig {
    /// The address to bind the server to
    #[default = "0.0.0.0:11211"]
    #[builder(default = "0.0.0.0:11211".to_string())]
    pub bind_address:    String,
    /// Longest command line before the connection is dropped
    #[default(_code = "DEFAULT_MAX_LINE_LENGTH")]
    #[builder(default = DEFAULT_MAX_LINE_LENGTH)]
    pub max_line_length: usize,
    /// Largest payload a `set` may carry
    #[default(_code = "DEFAULT_MAX_ITEM_SIZE")]
    #[builder(default = DEFAULT_MAX_ITEM_SIZE)]
    pub max_item_size:   usize,
}

/// Binds the listener and spawns the accept loop.
///
/// Binding happens before this returns, so a port conflict is reported to
/// the caller instead of inside the background task. Every accepted
/// connection gets its own [`Session`] over the shared factory.
///
/// # Errors
/// Returns an error if the bind address cannot be parsed or bound.
pub async fn start_memcache_server(
    config: MemcacheServerConfig,
    factory: SharedFactory,
) -> Result<ServiceHandler> {
    let bind_addr = config
        .bind_address
        .parse::<SocketAddr>()
        .context(ParseAddressSnafu {
            addr: config.bind_address.clone(),
        })?;
    let listener = TcpListener::bind(bind_addr).await.context(BindSnafu {
        addr: config.bind_address.clone(),
    })?;
    let local_addr = listener.local_addr().context(BindSnafu {
        addr: config.bind_address.clone(),
    })?;

    let cancellation_token = CancellationToken::new();
    let (started_tx, started_rx) = oneshot::channel::<()>();
    let join_handle = tokio::spawn(accept_loop(
        listener,
        factory,
        config,
        cancellation_token.clone(),
        started_tx,
    ));

    Ok(ServiceHandler {
        join_handle,
        cancellation_token,
        started_rx: Some(started_rx),
        local_addr,
    })
}

async fn accept_loop(
    listener: TcpListener,
    factory: SharedFactory,
    config: MemcacheServerConfig,
    cancellation_token: CancellationToken,
    started_tx: oneshot::Sender<()>,
) {
    let local_addr = listener.local_addr().ok();
    info!(addr = ?local_addr, "Memcache server started");
    let _ = started_tx.send(());

    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            () = cancellation_token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    CONNECTIONS_ACCEPTED.inc();
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
                    }
                    let codec = MemcacheCodec::new(config.max_line_length, config.max_item_size);
                    connections.spawn(handle_connection(
                        stream,
                        peer,
                        factory.clone(),
                        codec,
                        cancellation_token.clone(),
                    ));
                }
                Err(e) => warn!(error = %e, "Failed to accept connection"),
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "Connection task failed");
                }
            }
        }
    }

    info!(addr = ?local_addr, open = connections.len(), "Memcache server received shutdown signal");
    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Connection task failed");
        }
    }
    info!(addr = ?local_addr, "Memcache server stopped");
}

/// Serves one client until it disconnects, sends an unrecoverable frame or
/// the server shuts down. Held reservations go back when the session drops.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    factory: SharedFactory,
    codec: MemcacheCodec,
    cancellation_token: CancellationToken,
) {
    let mut framed = Framed::new(stream, codec);
    let mut session = Session::new(factory);
    debug!(%peer, session = %session.id(), "Connection opened");

    loop {
        let frame = tokio::select! {
            () = cancellation_token.cancelled() => break,
            frame = framed.next() => frame,
        };
        let (reply, close) = match frame {
            None => break,
            Some(Ok(Frame::Command(command))) => (session.execute(command), false),
            Some(Ok(Frame::Invalid(e))) => {
                debug!(%peer, session = %session.id(), error = %e, "Protocol error");
                ERROR_REPLIES
                    .with_label_values(&[e.status_code().as_str()])
                    .inc();
                (Reply::Error(e.reply_line()), e.closes_connection())
            }
            Some(Err(e)) => {
                debug!(%peer, session = %session.id(), error = %e, "Connection read failed");
                break;
            }
        };
        if let Err(e) = framed.send(reply).await {
            debug!(%peer, session = %session.id(), error = %e, "Connection write failed");
            break;
        }
        if close {
            break;
        }
    }

    debug!(%peer, session = %session.id(), "Connection closed");
}
