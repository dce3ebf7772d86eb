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

//! Journal replay.
//!
//! Replay walks the records of one live journal in file order and rebuilds
//! the ready sequence of its queue:
//! 1. `S` appends to the tail, `G` pops the head
//! 2. `B` moves the head into a scratch lent table, `U` drops it from there,
//!    `R` puts it back at the head
//! 3. Entries still lent at the end belonged to sessions that never finished
//!    and are folded back at the head in the order they were borrowed
//!
//! Inconsistent records (popping an empty queue, unknown sessions) are
//! logged and skipped. A torn or malformed record ends the replay, keeping
//! everything before it.

use std::{
    collections::{HashMap, VecDeque},
    path::Path,
};

use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::{
    JournalRecord, QueueEntry, Result, SessionId,
    error::IoSnafu,
    record::{ReaderStop, RecordReader},
};

/// State recovered from one journal file.
#[derive(Debug, Default)]
pub struct RecoveryInfo {
    /// Ready sequence, head first.
    pub ready:           VecDeque<QueueEntry>,
    /// Records applied.
    pub records:         u64,
    /// Borrowed entries without a matching ack or return.
    pub orphaned:        usize,
    /// Records skipped because they did not fit the state.
    pub inconsistencies: usize,
    /// Whether replay stopped before the end of the file.
    pub truncated:       bool,
    /// Bytes of the file that were replayed.
    pub replayed_bytes:  u64,
}

/// Reads and replays the journal at `path`.
pub fn replay(path: &Path) -> Result<RecoveryInfo> {
    let buf = std::fs::read(path).context(IoSnafu { path })?;
    let info = replay_bytes(&buf, path);
    info!(
        path = ?path,
        records = info.records,
        ready = info.ready.len(),
        orphaned = info.orphaned,
        inconsistencies = info.inconsistencies,
        truncated = info.truncated,
        "Journal replayed"
    );
    Ok(info)
}

/// Replays an in-memory journal image. `origin` is only used for logging.
pub fn replay_bytes(buf: &[u8], origin: &Path) -> RecoveryInfo {
    let mut info = RecoveryInfo::default();
    // Borrow sequence number alongside each lent entry, for fold-back order.
    let mut lent: HashMap<SessionId, (u64, QueueEntry)> = HashMap::new();
    let mut reader = RecordReader::new(buf);

    for record in reader.by_ref() {
        info.records += 1;
        match record {
            JournalRecord::Store { expire_at, payload } => {
                info.ready.push_back(QueueEntry { expire_at, payload });
            }
            JournalRecord::Dequeue => {
                if info.ready.pop_front().is_none() {
                    warn!(path = ?origin, record = info.records, "Dequeue from empty queue");
                    info.inconsistencies += 1;
                }
            }
            JournalRecord::Borrow(id) => {
                let Some(entry) = info.ready.pop_front() else {
                    warn!(path = ?origin, record = info.records, session = %id, "Borrow from empty queue");
                    info.inconsistencies += 1;
                    continue;
                };
                if let Some((_, previous)) = lent.insert(id.clone(), (info.records, entry)) {
                    warn!(path = ?origin, record = info.records, session = %id, "Session borrowed twice, returning the earlier entry");
                    info.inconsistencies += 1;
                    info.ready.push_front(previous);
                }
            }
            JournalRecord::Ack(id) => {
                if lent.remove(&id).is_none() {
                    warn!(path = ?origin, record = info.records, session = %id, "Ack for unknown borrow");
                    info.inconsistencies += 1;
                }
            }
            JournalRecord::Return(id) => match lent.remove(&id) {
                Some((_, entry)) => info.ready.push_front(entry),
                None => {
                    warn!(path = ?origin, record = info.records, session = %id, "Return for unknown borrow");
                    info.inconsistencies += 1;
                }
            },
        }
    }

    match reader.stop() {
        Some(ReaderStop::Truncated { position }) => {
            warn!(path = ?origin, position, "Torn record at end of journal, ignoring the tail");
            info.truncated = true;
        }
        Some(ReaderStop::Malformed { position, error }) => {
            warn!(path = ?origin, position, error = %error, "Malformed journal record, stopping replay here");
            info.truncated = true;
        }
        None => {}
    }
    info.replayed_bytes = reader.position() as u64;

    info.orphaned = lent.len();
    let mut orphans: Vec<_> = lent.into_iter().collect();
    orphans.sort_unstable_by_key(|(_, (seq, _))| std::cmp::Reverse(*seq));
    for (id, (_, entry)) in orphans {
        debug!(path = ?origin, session = %id, "Restoring entry of unfinished borrow");
        info.ready.push_front(entry);
    }

    info
}
