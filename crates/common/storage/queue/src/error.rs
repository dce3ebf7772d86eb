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

use std::{any::Any, io, path::PathBuf};

use redqueue_error::{ErrorExt, StackError, StatusCode};
use snafu::Snafu;

use crate::SessionId;

/// Queue operation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueueError {
    /// The configured journal directory is absent.
    #[snafu(display("Journal directory {} does not exist", path.display()))]
    JournalDirMissing {
        path: PathBuf,
        #[snafu(implicit)]
        loc:  snafu::Location,
    },

    /// Filesystem I/O failure.
    #[snafu(display("I/O error on {}", path.display()))]
    Io {
        path:   PathBuf,
        source: io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// An earlier journal write failed, the queue refuses further writes.
    #[snafu(display("Journal of queue {key} is unusable after a failed write"))]
    Poisoned {
        key: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    /// A session tried to borrow twice from the same queue.
    #[snafu(display("Session {session} already holds a borrowed entry of queue {key}"))]
    DoubleBorrow {
        key:     String,
        session: SessionId,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    #[snafu(display("Invalid session id {id:?}"))]
    InvalidSessionId {
        id:  String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },
}

/// Result type for queue operations.
pub type Result<T, E = QueueError> = std::result::Result<T, E>;

impl StackError for QueueError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
        let loc = match self {
            Self::JournalDirMissing { loc, .. }
            | Self::Io { loc, .. }
            | Self::Poisoned { loc, .. }
            | Self::DoubleBorrow { loc, .. }
            | Self::InvalidSessionId { loc, .. } => loc,
        };
        buf.push(format!("{layer}: {self}, at {loc}"));
    }

    fn next(&self) -> Option<&dyn StackError> { None }
}

impl ErrorExt for QueueError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::JournalDirMissing { .. } | Self::Io { .. } | Self::Poisoned { .. } => {
                StatusCode::StorageUnavailable
            }
            Self::DoubleBorrow { .. } => StatusCode::Internal,
            Self::InvalidSessionId { .. } => StatusCode::InvalidArgument,
        }
    }

    fn as_any(&self) -> &dyn Any { self as _ }
}
