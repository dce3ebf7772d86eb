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

//! Framing of the memcache text protocol.
//!
//! The decoder alternates between reading a command line and reading the
//! `nbytes + 2` data block of a storage command. Protocol errors are yielded
//! as [`Frame::Invalid`] so the connection can answer and keep going.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    command::{self, Reply, Request, StoreHeader},
    error::{
        BadCommandLineSnafu, BadDataChunkSnafu, LineTooLongSnafu, ProtocolError, TooLargeSnafu,
    },
};

/// Longest command line accepted, terminator excluded.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 2048;

/// Largest `set` payload accepted.
pub const DEFAULT_MAX_ITEM_SIZE: usize = 1024 * 1024;

/// One decoded unit of client input.
#[derive(Debug)]
pub enum Frame {
    Command(command::Command),
    Invalid(ProtocolError),
}

#[derive(Debug)]
enum State {
    Line,
    Data(StoreHeader),
    /// Discarding a data block that will be answered with an error.
    Swallow { remaining: usize, reason: Rejection },
}

#[derive(Debug, Clone, Copy)]
enum Rejection {
    BadKey,
    TooLarge,
}

impl Rejection {
    fn into_error(self) -> ProtocolError {
        match self {
            Self::BadKey => BadCommandLineSnafu.build(),
            Self::TooLarge => TooLargeSnafu.build(),
        }
    }
}

#[derive(Debug)]
pub struct MemcacheCodec {
    state:           State,
    max_line_length: usize,
    max_item_size:   usize,
}

impl Default for MemcacheCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_LINE_LENGTH, DEFAULT_MAX_ITEM_SIZE) }
}

impl MemcacheCodec {
    pub const fn new(max_line_length: usize, max_item_size: usize) -> Self {
        Self {
            state: State::Line,
            max_line_length,
            max_item_size,
        }
    }

    fn decode_line(&mut self, src: &mut BytesMut) -> Option<Frame> {
        let Some(newline) = src.iter().position(|b| *b == b'\n') else {
            if src.len() > self.max_line_length {
                src.clear();
                return Some(Frame::Invalid(LineTooLongSnafu.build()));
            }
            return None;
        };

        let raw = src.split_to(newline + 1);
        let line = raw[..newline].strip_suffix(b"\r").unwrap_or(&raw[..newline]);
        if line.len() > self.max_line_length {
            return Some(Frame::Invalid(LineTooLongSnafu.build()));
        }

        match command::parse_line(line) {
            Ok(Request::Complete(command)) => Some(Frame::Command(command)),
            Ok(Request::Store(header)) => {
                let block = header.bytes.saturating_add(2);
                self.state = if command::validate_key(&header.key).is_err() {
                    State::Swallow {
                        remaining: block,
                        reason:    Rejection::BadKey,
                    }
                } else if header.bytes > self.max_item_size {
                    State::Swallow {
                        remaining: block,
                        reason:    Rejection::TooLarge,
                    }
                } else {
                    src.reserve(block.saturating_sub(src.len()));
                    State::Data(header)
                };
                None
            }
            Err(e) => Some(Frame::Invalid(e)),
        }
    }
}

impl Decoder for MemcacheCodec {
    type Error = ProtocolError;
    type Item = Frame;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match std::mem::replace(&mut self.state, State::Line) {
                State::Line => {
                    if let Some(frame) = self.decode_line(src) {
                        return Ok(Some(frame));
                    }
                    if matches!(self.state, State::Line) {
                        return Ok(None);
                    }
                }
                State::Data(header) => {
                    let block = header.bytes + 2;
                    if src.len() < block {
                        self.state = State::Data(header);
                        return Ok(None);
                    }
                    let mut data = src.split_to(block);
                    if &data[header.bytes..] != b"\r\n" {
                        return Ok(Some(Frame::Invalid(BadDataChunkSnafu.build())));
                    }
                    data.truncate(header.bytes);
                    let payload: Bytes = data.freeze();
                    return Ok(Some(Frame::Command(header.into_command(payload))));
                }
                State::Swallow { remaining, reason } => {
                    let skipped = remaining.min(src.len());
                    src.advance(skipped);
                    if skipped < remaining {
                        self.state = State::Swallow {
                            remaining: remaining - skipped,
                            reason,
                        };
                        return Ok(None);
                    }
                    return Ok(Some(Frame::Invalid(reason.into_error())));
                }
            }
        }
    }
}

impl Encoder<Reply> for MemcacheCodec {
    type Error = ProtocolError;

    fn encode(&mut self, reply: Reply, dst: &mut BytesMut) -> Result<(), Self::Error> {
        reply.encode(dst);
        Ok(())
    }
}
