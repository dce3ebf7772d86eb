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

//! Error classification shared by the redqueue crates.
//!
//! Every error that can reach a client implements [`ErrorExt`]. Its
//! [`StatusCode`] decides which memcache reply class is used on the wire, and
//! [`ErrorExt::output_msg`] renders the human readable part of the reply.

use std::{any::Any, error::Error as StdError, sync::Arc};

use serde::Serialize;
use strum::EnumProperty;

#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    strum_macros::EnumProperty,
    strum_macros::EnumString,
    strum_macros::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusCode {
    /// The client sent something the protocol does not accept.
    #[strum(props(reply = "CLIENT_ERROR"))]
    InvalidArgument,
    /// A payload exceeded the configured item size.
    #[strum(props(reply = "SERVER_ERROR"))]
    TooLarge,
    /// The journal backing a queue cannot be written.
    #[strum(props(reply = "SERVER_ERROR"))]
    StorageUnavailable,
    #[strum(props(reply = "SERVER_ERROR"))]
    Internal,
    #[strum(props(reply = "SERVER_ERROR"))]
    Unknown,
}

impl StatusCode {
    /// The memcache reply prefix for this code.
    pub fn reply_kind(self) -> &'static str { self.get_str("reply").unwrap_or("SERVER_ERROR") }

    pub fn is_client_error(self) -> bool { self.reply_kind() == "CLIENT_ERROR" }

    pub fn as_str(self) -> &'static str { self.into() }
}

pub trait StackError: StdError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>);

    fn next(&self) -> Option<&dyn StackError>;

    fn last(&self) -> &dyn StackError
    where
        Self: Sized,
    {
        let Some(mut result) = self.next() else {
            return self;
        };
        while let Some(err) = result.next() {
            result = err;
        }
        result
    }

    fn transparent(&self) -> bool { false }
}

pub trait ErrorExt: StackError {
    fn status_code(&self) -> StatusCode { StatusCode::Unknown }

    fn as_any(&self) -> &dyn Any;

    /// Message safe to send to a client.
    ///
    /// Internal failures are masked, everything else is rendered as the
    /// innermost stack error followed by its root cause.
    fn output_msg(&self) -> String
    where
        Self: Sized,
    {
        match self.status_code() {
            StatusCode::Unknown | StatusCode::Internal => {
                format!("Internal error: {}", self.status_code() as u32)
            }
            _ => {
                let error = self.last();
                if let Some(external_error) = error.source() {
                    let mut root = external_error;
                    while let Some(source) = root.source() {
                        root = source;
                    }
                    if error.transparent() {
                        format!("{root}")
                    } else {
                        format!("{error}: {root}")
                    }
                } else {
                    format!("{error}")
                }
            }
        }
    }

    /// Full memcache error line without the trailing CRLF, e.g.
    /// `CLIENT_ERROR bad data chunk`.
    fn reply_line(&self) -> String
    where
        Self: Sized,
    {
        format!("{} {}", self.status_code().reply_kind(), self.output_msg())
    }

    fn root_cause(&self) -> Option<&dyn StdError>
    where
        Self: Sized,
    {
        let error = self.last();
        let mut source = error.source()?;
        while let Some(next) = source.source() {
            source = next;
        }
        Some(source)
    }
}

impl<T: ?Sized + StackError> StackError for Arc<T> {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) { self.as_ref().debug_fmt(layer, buf) }

    fn next(&self) -> Option<&dyn StackError> { self.as_ref().next() }
}

impl<T: StackError> StackError for Box<T> {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) { self.as_ref().debug_fmt(layer, buf) }

    fn next(&self) -> Option<&dyn StackError> { self.as_ref().next() }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use snafu::{ResultExt, Snafu};

    use super::*;

    #[derive(Debug, Snafu)]
    enum TestError {
        #[snafu(display("bad data chunk"))]
        BadChunk,

        #[snafu(display("journal write failed"))]
        Journal { source: std::io::Error },

        #[snafu(display("borrow table corrupted"))]
        Corrupted,
    }

    impl StackError for TestError {
        fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
            buf.push(format!("{layer}: {self}"));
        }

        fn next(&self) -> Option<&dyn StackError> { None }
    }

    impl ErrorExt for TestError {
        fn status_code(&self) -> StatusCode {
            match self {
                Self::BadChunk => StatusCode::InvalidArgument,
                Self::Journal { .. } => StatusCode::StorageUnavailable,
                Self::Corrupted => StatusCode::Internal,
            }
        }

        fn as_any(&self) -> &dyn Any { self as _ }
    }

    #[test]
    fn reply_kind_follows_status() {
        assert_eq!(StatusCode::InvalidArgument.reply_kind(), "CLIENT_ERROR");
        assert_eq!(StatusCode::StorageUnavailable.reply_kind(), "SERVER_ERROR");
        assert_eq!(StatusCode::TooLarge.reply_kind(), "SERVER_ERROR");
        assert!(StatusCode::InvalidArgument.is_client_error());
        assert!(!StatusCode::Unknown.is_client_error());
    }

    #[test]
    fn status_code_parses_from_snake_case() {
        assert_eq!(
            StatusCode::from_str("storage_unavailable").unwrap(),
            StatusCode::StorageUnavailable
        );
        assert_eq!(StatusCode::InvalidArgument.as_str(), "invalid_argument");
    }

    #[test]
    fn reply_line_for_client_error() {
        assert_eq!(TestError::BadChunk.reply_line(), "CLIENT_ERROR bad data chunk");
    }

    #[test]
    fn output_msg_appends_root_cause() {
        let err = Err::<(), _>(std::io::Error::other("disk full"))
            .context(JournalSnafu)
            .unwrap_err();
        assert_eq!(err.output_msg(), "journal write failed: disk full");
        assert_eq!(err.root_cause().unwrap().to_string(), "disk full");
    }

    #[test]
    fn internal_errors_are_masked() {
        let line = TestError::Corrupted.reply_line();
        assert!(line.starts_with("SERVER_ERROR Internal error: "));
        assert!(!line.contains("borrow table"));
    }
}
