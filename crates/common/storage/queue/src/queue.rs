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

use std::{
    collections::{HashMap, VecDeque},
    path::Path,
};

use bytes::Bytes;
use snafu::ensure;
use tracing::{info, warn};

use crate::{
    JournalRecord, QueueEntry, Result, RotationPolicy, SessionId,
    entry::now_millis,
    error::DoubleBorrowSnafu,
    journal::Journal,
};

/// FIFO of one key plus the entries currently borrowed from it.
///
/// Every entry is either in `ready` or in `borrowed` under exactly one
/// session. Each operation appends its journal record before touching memory,
/// so a failed append leaves the queue unchanged.
#[derive(Debug)]
pub struct Queue {
    key:                    String,
    ready:                  VecDeque<QueueEntry>,
    borrowed:               HashMap<SessionId, QueueEntry>,
    journal:                Journal,
    rotation:               RotationPolicy,
    size_warning_threshold: usize,
    size_warned:            bool,
}

impl Queue {
    pub(crate) fn new(
        key: String,
        ready: VecDeque<QueueEntry>,
        journal: Journal,
        rotation: RotationPolicy,
        size_warning_threshold: usize,
    ) -> Self {
        Self {
            key,
            ready,
            borrowed: HashMap::new(),
            journal,
            rotation,
            size_warning_threshold,
            size_warned: false,
        }
    }

    pub fn key(&self) -> &str { &self.key }

    /// Entries waiting to be delivered, expired ones included.
    pub fn len(&self) -> usize { self.ready.len() }

    pub fn is_empty(&self) -> bool { self.ready.is_empty() }

    pub fn borrowed_len(&self) -> usize { self.borrowed.len() }

    /// Nothing ready and nothing borrowed.
    pub fn is_idle(&self) -> bool { self.ready.is_empty() && self.borrowed.is_empty() }

    /// Whether `session` currently holds a borrowed entry of this queue.
    pub fn holds(&self, session: &SessionId) -> bool { self.borrowed.contains_key(session) }

    pub const fn journal_size(&self) -> u64 { self.journal.size() }

    pub fn journal_path(&self) -> &Path { self.journal.path() }

    /// Appends an entry at the tail.
    pub fn enqueue(&mut self, expire_at: Option<i64>, payload: Bytes) -> Result<()> {
        let entry = QueueEntry { expire_at, payload };
        self.journal.append(&JournalRecord::store(&entry))?;
        self.ready.push_back(entry);
        self.after_mutation();
        Ok(())
    }

    /// Removes and returns the first live entry, discarding expired ones on
    /// the way.
    pub fn dequeue(&mut self) -> Result<Option<QueueEntry>> {
        self.discard_expired(now_millis())?;
        if self.ready.is_empty() {
            return Ok(None);
        }
        self.journal.append(&JournalRecord::Dequeue)?;
        let entry = self.ready.pop_front();
        self.after_mutation();
        Ok(entry)
    }

    /// Moves the first live entry into the borrow table under `session`.
    ///
    /// Fails with [`QueueError::DoubleBorrow`](crate::QueueError::DoubleBorrow)
    /// if `session` already holds an entry of this queue.
    pub fn reserve(&mut self, session: &SessionId) -> Result<Option<QueueEntry>> {
        ensure!(
            !self.borrowed.contains_key(session),
            DoubleBorrowSnafu {
                key:     &self.key,
                session: session.clone(),
            }
        );
        self.discard_expired(now_millis())?;
        if self.ready.is_empty() {
            return Ok(None);
        }
        self.journal
            .append(&JournalRecord::Borrow(session.clone()))?;
        let Some(entry) = self.ready.pop_front() else {
            return Ok(None);
        };
        self.borrowed.insert(session.clone(), entry.clone());
        Ok(Some(entry))
    }

    /// Commits the entry borrowed by `session`. Returns false if it holds none.
    pub fn ack(&mut self, session: &SessionId) -> Result<bool> {
        if !self.borrowed.contains_key(session) {
            return Ok(false);
        }
        self.journal.append(&JournalRecord::Ack(session.clone()))?;
        self.borrowed.remove(session);
        self.after_mutation();
        Ok(true)
    }

    /// Puts the entry borrowed by `session` back at the head. Returns false if
    /// it holds none.
    pub fn give_back(&mut self, session: &SessionId) -> Result<bool> {
        if !self.borrowed.contains_key(session) {
            return Ok(false);
        }
        self.journal
            .append(&JournalRecord::Return(session.clone()))?;
        if let Some(entry) = self.borrowed.remove(session) {
            self.ready.push_front(entry);
        }
        self.after_mutation();
        Ok(true)
    }

    /// Reserve and immediately ack, leaving the same journal trail as a
    /// reservation that was committed.
    ///
    /// If the ack cannot be journaled the entry goes back to the head, which
    /// is where replay of the unmatched borrow puts it too.
    pub fn take(&mut self, session: &SessionId) -> Result<Option<QueueEntry>> {
        let entry = self.reserve(session)?;
        if entry.is_some() {
            self.commit_take(session)?;
        }
        Ok(entry)
    }

    fn commit_take(&mut self, session: &SessionId) -> Result<()> {
        if let Err(e) = self.ack(session) {
            if let Some(entry) = self.borrowed.remove(session) {
                self.ready.push_front(entry);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Rewrites the journal so it holds exactly the ready entries.
    pub(crate) fn compact_journal(&mut self) -> Result<()> { self.journal.compact(&self.ready) }

    fn discard_expired(&mut self, now_ms: i64) -> Result<usize> {
        let mut discarded = 0;
        while self.ready.front().is_some_and(|e| e.is_expired(now_ms)) {
            self.journal.append(&JournalRecord::Dequeue)?;
            self.ready.pop_front();
            discarded += 1;
        }
        if discarded > 0 {
            info!(key = %self.key, discarded, "Dropped expired entries");
            self.after_mutation();
        }
        Ok(discarded)
    }

    /// Runs once an operation is journaled and applied. A failed rotation
    /// poisons the journal for later writes, the operation itself stands.
    fn after_mutation(&mut self) {
        let len = self.ready.len();
        if len > self.size_warning_threshold {
            if !self.size_warned {
                warn!(key = %self.key, len, threshold = self.size_warning_threshold, "Queue is growing large");
                self.size_warned = true;
            }
        } else {
            self.size_warned = false;
        }

        if !self
            .rotation
            .should_rotate(self.journal.size(), self.is_idle())
        {
            return;
        }
        if let Err(e) = self.journal.rotate(self.rotation.archive) {
            warn!(key = %self.key, error = %e, "Journal rotation failed");
        }
    }
}
