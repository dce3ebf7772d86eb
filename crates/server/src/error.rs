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

use std::any::Any;

use redqueue_error::{ErrorExt, StackError, StatusCode};
use snafu::Snafu;

/// Errors of the memcache wire protocol.
///
/// Every variant renders as a single reply line through
/// [`ErrorExt::reply_line`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProtocolError {
    #[snafu(display("bad command line format"))]
    BadCommandLine {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("line too long"))]
    LineTooLong {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("bad data chunk"))]
    BadDataChunk {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("object too large for cache"))]
    TooLarge {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(context(false), display("Connection I/O failed"))]
    Io { source: std::io::Error },
}

impl ProtocolError {
    /// Whether the connection must be closed once the reply is sent.
    pub const fn closes_connection(&self) -> bool {
        matches!(self, Self::LineTooLong { .. } | Self::Io { .. })
    }
}

impl StackError for ProtocolError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
        match self {
            Self::BadCommandLine { loc }
            | Self::LineTooLong { loc }
            | Self::BadDataChunk { loc }
            | Self::TooLarge { loc } => buf.push(format!("{layer}: {self}, at {loc}")),
            Self::Io { .. } => buf.push(format!("{layer}: {self}")),
        }
    }

    fn next(&self) -> Option<&dyn StackError> { None }
}

impl ErrorExt for ProtocolError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadCommandLine { .. } | Self::LineTooLong { .. } | Self::BadDataChunk { .. } => {
                StatusCode::InvalidArgument
            }
            Self::TooLarge { .. } => StatusCode::TooLarge,
            Self::Io { .. } => StatusCode::Internal,
        }
    }

    fn as_any(&self) -> &dyn Any { self as _ }
}

/// Errors of the TCP service itself.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(transparent)]
    Network { source: NetworkError },
}

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum NetworkError {
    #[snafu(display("Failed to bind {addr}"))]
    Bind {
        addr:   String,
        #[snafu(source)]
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Failed to parse address {addr}"))]
    ParseAddress {
        addr:   String,
        #[snafu(source)]
        source: std::net::AddrParseError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Server start signal was already consumed"))]
    StartSignalConsumed {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Server task ended before it started accepting connections"))]
    StartSignal {
        source: tokio::sync::oneshot::error::RecvError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Server task failed"))]
    Join {
        source: tokio::task::JoinError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
