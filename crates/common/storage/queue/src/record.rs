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

//! Text encoding of journal records.
//!
//! ```text
//! S <expire_at> <len>\r\n<payload>\r\n   store
//! G\r\n                                  dequeue
//! B <session>\r\n                        borrow
//! U <session>\r\n                        ack (use)
//! R <session>\r\n                        return
//! ```
//!
//! `expire_at` is unix epoch milliseconds, `0` meaning "never".

use bytes::{BufMut, Bytes, BytesMut};
use snafu::{OptionExt, ResultExt, Snafu, ensure};

use crate::{QueueEntry, SessionId};

const CRLF: &[u8] = b"\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    Store {
        expire_at: Option<i64>,
        payload:   Bytes,
    },
    Dequeue,
    Borrow(SessionId),
    Ack(SessionId),
    Return(SessionId),
}

/// Reasons a journal line cannot be decoded.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RecordError {
    #[snafu(display("Record line is not valid UTF-8"))]
    NotUtf8 {
        source: std::str::Utf8Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Unknown record tag {tag:?}"))]
    UnknownTag {
        tag: String,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Record {tag} is missing field {field}"))]
    MissingField {
        tag:   &'static str,
        field: &'static str,
        #[snafu(implicit)]
        loc:   snafu::Location,
    },

    #[snafu(display("Record {tag} has invalid {field} {value:?}"))]
    InvalidField {
        tag:   &'static str,
        field: &'static str,
        value: String,
        #[snafu(implicit)]
        loc:   snafu::Location,
    },

    #[snafu(display("Store payload is not terminated by CRLF"))]
    MissingTerminator {
        #[snafu(implicit)]
        loc: snafu::Location,
    },
}

impl JournalRecord {
    pub fn store(entry: &QueueEntry) -> Self {
        Self::Store {
            expire_at: entry.expire_at,
            payload:   entry.payload.clone(),
        }
    }

    /// Appends the wire form of this record to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::Store { expire_at, payload } => {
                // 0 is reserved for "never", so past instants are clamped to 1.
                let expire_at = expire_at.map_or(0, |at| at.max(1));
                buf.reserve(payload.len() + 32);
                buf.put_slice(format!("S {expire_at} {}\r\n", payload.len()).as_bytes());
                buf.put_slice(payload);
                buf.put_slice(CRLF);
            }
            Self::Dequeue => buf.put_slice(b"G\r\n"),
            Self::Borrow(id) => put_session_line(buf, b'B', id),
            Self::Ack(id) => put_session_line(buf, b'U', id),
            Self::Return(id) => put_session_line(buf, b'R', id),
        }
    }

    /// Decodes one record from the front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` ends in the middle of a record, and the
    /// record together with the number of bytes it occupied otherwise.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, RecordError> {
        let Some(newline) = buf.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let line = buf[..newline].strip_suffix(b"\r").unwrap_or(&buf[..newline]);
        let line = std::str::from_utf8(line).context(NotUtf8Snafu)?;
        let consumed = newline + 1;

        let mut fields = line.split_ascii_whitespace();
        let tag = fields.next().unwrap_or_default();
        let record = match tag {
            "S" => {
                let expire_at: i64 = parse_field(fields.next(), "S", "expire_at")?;
                let len: usize = parse_field(fields.next(), "S", "length")?;
                let end = consumed + len;
                if buf.len() < end + CRLF.len() {
                    return Ok(None);
                }
                ensure!(&buf[end..end + CRLF.len()] == CRLF, MissingTerminatorSnafu);
                let record = Self::Store {
                    expire_at: (expire_at != 0).then_some(expire_at),
                    payload:   Bytes::copy_from_slice(&buf[consumed..end]),
                };
                return Ok(Some((record, end + CRLF.len())));
            }
            "G" => Self::Dequeue,
            "B" => Self::Borrow(parse_session(fields.next(), "B")?),
            "U" => Self::Ack(parse_session(fields.next(), "U")?),
            "R" => Self::Return(parse_session(fields.next(), "R")?),
            other => return UnknownTagSnafu { tag: other }.fail(),
        };
        Ok(Some((record, consumed)))
    }
}

fn put_session_line(buf: &mut BytesMut, tag: u8, id: &SessionId) {
    buf.reserve(id.as_str().len() + 4);
    buf.put_u8(tag);
    buf.put_u8(b' ');
    buf.put_slice(id.as_str().as_bytes());
    buf.put_slice(CRLF);
}

fn parse_field<T: std::str::FromStr>(
    value: Option<&str>,
    tag: &'static str,
    field: &'static str,
) -> Result<T, RecordError> {
    let value = value.context(MissingFieldSnafu { tag, field })?;
    value
        .parse()
        .ok()
        .context(InvalidFieldSnafu { tag, field, value })
}

fn parse_session(value: Option<&str>, tag: &'static str) -> Result<SessionId, RecordError> {
    let value = value.context(MissingFieldSnafu {
        tag,
        field: "session",
    })?;
    value.parse().ok().context(InvalidFieldSnafu {
        tag,
        field: "session",
        value,
    })
}

/// Iterates over the records of an in-memory journal image.
///
/// Iteration stops at the first torn or malformed record, see
/// [`RecordReader::stop`] for why it stopped.
pub struct RecordReader<'a> {
    buf:      &'a [u8],
    position: usize,
    stop:     Option<ReaderStop>,
}

/// Why a [`RecordReader`] stopped before the end of its input.
#[derive(Debug)]
pub enum ReaderStop {
    /// The input ends inside a record.
    Truncated { position: usize },
    /// A record could not be decoded.
    Malformed { position: usize, error: RecordError },
}

impl<'a> RecordReader<'a> {
    pub const fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            position: 0,
            stop: None,
        }
    }

    /// Byte offset of the next record.
    pub const fn position(&self) -> usize { self.position }

    pub const fn stop(&self) -> Option<&ReaderStop> { self.stop.as_ref() }
}

impl Iterator for RecordReader<'_> {
    type Item = JournalRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stop.is_some() || self.position >= self.buf.len() {
            return None;
        }
        match JournalRecord::decode(&self.buf[self.position..]) {
            Ok(Some((record, consumed))) => {
                self.position += consumed;
                Some(record)
            }
            Ok(None) => {
                self.stop = Some(ReaderStop::Truncated {
                    position: self.position,
                });
                None
            }
            Err(error) => {
                self.stop = Some(ReaderStop::Malformed {
                    position: self.position,
                    error,
                });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn encoded(record: &JournalRecord) -> Vec<u8> {
        let mut buf = BytesMut::new();
        record.encode(&mut buf);
        buf.to_vec()
    }

    fn sid(raw: &str) -> SessionId { raw.parse().unwrap() }

    #[test]
    fn store_line_layout() {
        let record = JournalRecord::Store {
            expire_at: None,
            payload:   Bytes::from_static(b"really"),
        };
        assert_eq!(encoded(&record), b"S 0 6\r\nreally\r\n");

        let record = JournalRecord::Store {
            expire_at: Some(1_700_000_000_123),
            payload:   Bytes::new(),
        };
        assert_eq!(encoded(&record), b"S 1700000000123 0\r\n\r\n");
    }

    #[test]
    fn past_expiry_is_not_confused_with_never() {
        let record = JournalRecord::Store {
            expire_at: Some(-5),
            payload:   Bytes::from_static(b"x"),
        };
        let bytes = encoded(&record);
        assert_eq!(bytes, b"S 1 1\r\nx\r\n");
        let (decoded, _) = JournalRecord::decode(&bytes).unwrap().unwrap();
        assert!(matches!(decoded, JournalRecord::Store { expire_at: Some(1), .. }));
    }

    #[test_case(JournalRecord::Dequeue, b"G\r\n" ; "dequeue")]
    #[test_case(JournalRecord::Borrow(sid("s1")), b"B s1\r\n" ; "borrow")]
    #[test_case(JournalRecord::Ack(sid("s1")), b"U s1\r\n" ; "ack")]
    #[test_case(JournalRecord::Return(sid("s1")), b"R s1\r\n" ; "give back")]
    fn session_lines(record: JournalRecord, expected: &[u8]) {
        assert_eq!(encoded(&record), expected);
        let (decoded, consumed) = JournalRecord::decode(expected).unwrap().unwrap();
        assert_eq!(decoded, record);
        assert_eq!(consumed, expected.len());
    }

    #[test]
    fn payload_may_contain_crlf() {
        let raw = b"S 0 4\r\na\r\nb\r\nG\r\n";
        let (record, consumed) = JournalRecord::decode(raw).unwrap().unwrap();
        assert_eq!(
            record,
            JournalRecord::Store {
                expire_at: None,
                payload:   Bytes::from_static(b"a\r\nb"),
            }
        );
        assert_eq!(&raw[consumed..], b"G\r\n");
    }

    #[test_case(b"S 0 6\r\nrea" ; "payload cut")]
    #[test_case(b"S 0 6\r\nreally" ; "terminator cut")]
    #[test_case(b"B abc" ; "line cut")]
    #[test_case(b"" ; "empty")]
    fn incomplete_records(raw: &[u8]) {
        assert!(JournalRecord::decode(raw).unwrap().is_none());
    }

    #[test]
    fn malformed_records() {
        assert!(matches!(
            JournalRecord::decode(b"X 1\r\n"),
            Err(RecordError::UnknownTag { .. })
        ));
        assert!(matches!(
            JournalRecord::decode(b"S zero 1\r\na\r\n"),
            Err(RecordError::InvalidField { field: "expire_at", .. })
        ));
        assert!(matches!(
            JournalRecord::decode(b"B\r\n"),
            Err(RecordError::MissingField { field: "session", .. })
        ));
        assert!(matches!(
            JournalRecord::decode(b"S 0 1\r\nab\r\n"),
            Err(RecordError::MissingTerminator { .. })
        ));
    }

    #[test]
    fn reader_stops_at_torn_tail() {
        let raw = b"S 0 1\r\nI\r\nG\r\nS 0 6\r\nrea";
        let mut reader = RecordReader::new(raw);
        let records: Vec<_> = reader.by_ref().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(reader.position(), 13);
        assert!(matches!(
            reader.stop(),
            Some(ReaderStop::Truncated { position: 13 })
        ));
    }

    #[test]
    fn reader_consumes_everything_when_clean() {
        let raw = b"S 0 1\r\nI\r\nB s1\r\nU s1\r\n";
        let mut reader = RecordReader::new(raw);
        assert_eq!(reader.by_ref().count(), 3);
        assert!(reader.stop().is_none());
        assert_eq!(reader.position(), raw.len());
    }
}
