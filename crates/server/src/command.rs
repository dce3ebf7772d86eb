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

//! Commands of the memcache text protocol and their replies.

use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use snafu::{OptionExt, ensure};

use crate::error::{BadCommandLineSnafu, ProtocolError};

/// Longest key accepted, as in memcached.
pub const MAX_KEY_LENGTH: usize = 250;

/// `exptime` values up to this many seconds are relative to now.
pub const RELATIVE_EXPIRY_LIMIT: i64 = 60 * 60 * 24 * 30;

/// A fully received command.
#[derive(Debug, Clone, PartialEq, Eq, strum_macros::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Command {
    Set {
        key:     String,
        flags:   u32,
        exptime: i64,
        payload: Bytes,
        noreply: bool,
    },
    Get {
        keys: Vec<String>,
    },
    /// Like `get`, but stops at the first key that yields an item.
    Gets {
        keys: Vec<String>,
    },
    Delete {
        key:     String,
        noreply: bool,
    },
}

impl Command {
    pub fn name(&self) -> &'static str { self.into() }
}

/// Header of a storage command, waiting for its data block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHeader {
    pub key:     String,
    pub flags:   u32,
    pub exptime: i64,
    pub bytes:   usize,
    pub noreply: bool,
}

impl StoreHeader {
    pub fn into_command(self, payload: Bytes) -> Command {
        Command::Set {
            key: self.key,
            flags: self.flags,
            exptime: self.exptime,
            payload,
            noreply: self.noreply,
        }
    }
}

/// Result of parsing one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Complete(Command),
    Store(StoreHeader),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
enum Verb {
    Set,
    Get,
    Gets,
    Delete,
}

/// Parses a command line without its line terminator.
pub fn parse_line(line: &[u8]) -> Result<Request, ProtocolError> {
    let line = std::str::from_utf8(line).ok().context(BadCommandLineSnafu)?;
    let mut args = line.split_ascii_whitespace();
    let verb = args
        .next()
        .and_then(|name| Verb::from_str(name).ok())
        .context(BadCommandLineSnafu)?;

    match verb {
        Verb::Set => parse_store(args).map(Request::Store),
        Verb::Get | Verb::Gets => {
            let keys = args
                .map(|key| validate_key(key).map(str::to_owned))
                .collect::<Result<Vec<_>, _>>()?;
            ensure!(!keys.is_empty(), BadCommandLineSnafu);
            Ok(Request::Complete(if verb == Verb::Get {
                Command::Get { keys }
            } else {
                Command::Gets { keys }
            }))
        }
        Verb::Delete => {
            let key = validate_key(args.next().context(BadCommandLineSnafu)?)?.to_owned();
            let mut noreply = false;
            // memcached still tolerates a legacy numeric hold time here.
            for (i, arg) in args.enumerate() {
                match arg {
                    "noreply" if !noreply => noreply = true,
                    time if i == 0 && time.parse::<i64>().is_ok() => {}
                    _ => return BadCommandLineSnafu.fail(),
                }
            }
            Ok(Request::Complete(Command::Delete { key, noreply }))
        }
    }
}

fn parse_store<'a>(mut args: impl Iterator<Item = &'a str>) -> Result<StoreHeader, ProtocolError> {
    let key = args.next().context(BadCommandLineSnafu)?.to_owned();
    let flags = parse_number(args.next())?;
    let exptime = parse_number(args.next())?;
    let bytes = parse_number(args.next())?;
    let noreply = match args.next() {
        None => false,
        Some("noreply") => true,
        Some(_) => return BadCommandLineSnafu.fail(),
    };
    ensure!(args.next().is_none(), BadCommandLineSnafu);

    Ok(StoreHeader {
        key,
        flags,
        exptime,
        bytes,
        noreply,
    })
}

fn parse_number<T: FromStr>(arg: Option<&str>) -> Result<T, ProtocolError> {
    arg.context(BadCommandLineSnafu)?
        .parse()
        .ok()
        .context(BadCommandLineSnafu)
}

/// Checks the memcache key rules: 1 to 250 bytes, no control characters.
pub fn validate_key(key: &str) -> Result<&str, ProtocolError> {
    ensure!(
        !key.is_empty()
            && key.len() <= MAX_KEY_LENGTH
            && !key.bytes().any(|b| b.is_ascii_control() || b == b' '),
        BadCommandLineSnafu
    );
    Ok(key)
}

/// Turns a memcache `exptime` into an absolute expiry in unix millis.
///
/// `0` never expires, a negative value is already expired, values up to 30
/// days are relative seconds and anything larger is a unix timestamp.
pub fn resolve_expiry(exptime: i64, now_ms: i64) -> Option<i64> {
    match exptime {
        0 => None,
        e if e < 0 => Some(now_ms),
        e if e <= RELATIVE_EXPIRY_LIMIT => Some(now_ms.saturating_add(e * 1000)),
        e => Some(e.saturating_mul(1000)),
    }
}

/// A reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Stored,
    Deleted,
    NotDeleted,
    /// Items found by `get`/`gets`, terminated by `END` or by an error line
    /// when a queue failed part way.
    Values {
        items: Vec<(String, Bytes)>,
        error: Option<String>,
    },
    Error(String),
    /// `noreply` was requested.
    Silent,
}

impl Reply {
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Self::Stored => dst.put_slice(b"STORED\r\n"),
            Self::Deleted => dst.put_slice(b"DELETED\r\n"),
            Self::NotDeleted => dst.put_slice(b"NOT_DELETED\r\n"),
            Self::Values { items, error } => {
                for (key, payload) in items {
                    dst.put_slice(format!("VALUE {key} 0 {}\r\n", payload.len()).as_bytes());
                    dst.put_slice(payload);
                    dst.put_slice(b"\r\n");
                }
                match error {
                    Some(line) => put_line(dst, line),
                    None => dst.put_slice(b"END\r\n"),
                }
            }
            Self::Error(line) => put_line(dst, line),
            Self::Silent => {}
        }
    }
}

fn put_line(dst: &mut BytesMut, line: &str) {
    dst.put_slice(line.as_bytes());
    dst.put_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn store(line: &str) -> StoreHeader {
        match parse_line(line.as_bytes()).unwrap() {
            Request::Store(header) => header,
            other => panic!("expected a store header, got {other:?}"),
        }
    }

    fn complete(line: &str) -> Command {
        match parse_line(line.as_bytes()).unwrap() {
            Request::Complete(command) => command,
            other => panic!("expected a command, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_set() {
        assert_eq!(store("set abc 0 0 5"), StoreHeader {
            key:     "abc".into(),
            flags:   0,
            exptime: 0,
            bytes:   5,
            noreply: false,
        });
        let header = store("SET abc 7 -1 0 noreply");
        assert_eq!(header.flags, 7);
        assert_eq!(header.exptime, -1);
        assert!(header.noreply);
    }

    #[test]
    fn test_parse_retrieval() {
        assert_eq!(complete("get a b"), Command::Get {
            keys: vec!["a".into(), "b".into()],
        });
        assert_eq!(complete("GeTs  a"), Command::Gets {
            keys: vec!["a".into()],
        });
        assert_eq!(complete("delete a noreply"), Command::Delete {
            key:     "a".into(),
            noreply: true,
        });
        assert_eq!(complete("delete a 0"), Command::Delete {
            key:     "a".into(),
            noreply: false,
        });
    }

    #[test_case("" ; "empty line")]
    #[test_case("stats" ; "unknown command")]
    #[test_case("get" ; "get without keys")]
    #[test_case("set k 0 0" ; "set without length")]
    #[test_case("set k x 0 1" ; "non numeric flags")]
    #[test_case("set k 0 0 -1" ; "negative length")]
    #[test_case("set k 0 0 1 yes" ; "unknown trailing token")]
    #[test_case("delete" ; "delete without key")]
    #[test_case("delete k later" ; "delete with junk")]
    fn test_bad_command_lines(line: &str) {
        assert!(matches!(
            parse_line(line.as_bytes()),
            Err(ProtocolError::BadCommandLine { .. })
        ));
    }

    #[test]
    fn test_key_length_limit() {
        let key = "k".repeat(MAX_KEY_LENGTH);
        assert!(validate_key(&key).is_ok());
        let key = "k".repeat(MAX_KEY_LENGTH + 1);
        assert!(parse_line(format!("get {key}").as_bytes()).is_err());
    }

    #[test_case(0, None ; "never")]
    #[test_case(-1, Some(1_000_000) ; "already expired")]
    #[test_case(60, Some(1_060_000) ; "relative seconds")]
    #[test_case(RELATIVE_EXPIRY_LIMIT + 1, Some((RELATIVE_EXPIRY_LIMIT + 1) * 1000) ; "absolute timestamp")]
    fn test_resolve_expiry(exptime: i64, expected: Option<i64>) {
        assert_eq!(resolve_expiry(exptime, 1_000_000), expected);
    }

    #[test]
    fn test_encode_values() {
        let mut buf = BytesMut::new();
        Reply::Values {
            items: vec![
                ("abc".into(), Bytes::from_static(b"I")),
                ("empty".into(), Bytes::new()),
            ],
            error: None,
        }
        .encode(&mut buf);
        assert_eq!(&buf[..], b"VALUE abc 0 1\r\nI\r\nVALUE empty 0 0\r\n\r\nEND\r\n");
    }

    #[test]
    fn test_encode_partial_values_with_error() {
        let mut buf = BytesMut::new();
        Reply::Values {
            items: vec![("a".into(), Bytes::from_static(b"x"))],
            error: Some("SERVER_ERROR disk full".into()),
        }
        .encode(&mut buf);
        assert_eq!(&buf[..], b"VALUE a 0 1\r\nx\r\nSERVER_ERROR disk full\r\n");
    }

    #[test]
    fn test_command_names() {
        assert_eq!(complete("get a").name(), "get");
        assert_eq!(complete("delete a").name(), "delete");
    }
}
