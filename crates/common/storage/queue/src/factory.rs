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
    collections::{BTreeMap, HashMap, VecDeque, hash_map::Entry},
    path::PathBuf,
};

use snafu::{ResultExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    JournalFile, Queue, QueueConfig, QueueEntry, Result,
    error::{IoSnafu, JournalDirMissingSnafu},
    journal::Journal,
    path, recovery,
};

/// Owner of every queue, keyed by name.
///
/// Queues are created on first reference and live for the rest of the
/// process.
#[derive(Debug)]
pub struct QueueFactory {
    config: QueueConfig,
    queues: HashMap<String, Queue>,
}

/// Totals of a [`QueueFactory::recover`] run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoverySummary {
    pub queues:          usize,
    pub entries:         usize,
    pub orphaned:        usize,
    pub inconsistencies: usize,
    pub truncated:       usize,
    pub temp_removed:    usize,
}

impl QueueFactory {
    pub(crate) fn new(config: QueueConfig) -> Self {
        Self {
            config,
            queues: HashMap::new(),
        }
    }

    pub const fn config(&self) -> &QueueConfig { &self.config }

    /// Looks up the queue of `key`, creating it when `auto_create` is set.
    pub fn get_queue(&mut self, key: &str, auto_create: bool) -> Result<Option<&mut Queue>> {
        if auto_create {
            return self.queue(key).map(Some);
        }
        Ok(self.queues.get_mut(key))
    }

    /// The queue of `key`, created on demand.
    pub fn queue(&mut self, key: &str) -> Result<&mut Queue> {
        match self.queues.entry(key.to_owned()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let queue = open_queue(&self.config, key, VecDeque::new())?;
                debug!(key, "Queue created");
                Ok(entry.insert(queue))
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> { self.queues.keys().map(String::as_str) }

    pub fn len(&self) -> usize { self.queues.len() }

    pub fn is_empty(&self) -> bool { self.queues.is_empty() }

    /// Rebuilds every queue that has a live journal in the journal directory.
    ///
    /// Each journal is replayed and then compacted so that it describes
    /// exactly the recovered ready sequence. Must run before any queue is
    /// used.
    pub fn recover(&mut self) -> Result<RecoverySummary> {
        let mut summary = RecoverySummary::default();
        if !self.config.durability.is_enabled() {
            info!("Journaling disabled, skipping recovery");
            return Ok(summary);
        }

        let dir = self.config.journal_dir.clone();
        ensure!(dir.is_dir(), JournalDirMissingSnafu { path: &dir });
        info!(dir = ?dir, "Scanning journals");

        let files = path::scan_journal_dir(&dir)?;
        let mut live: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for (kind, file) in files {
            match kind {
                JournalFile::Live { key } => live.entry(key).or_default().push(file),
                JournalFile::Temp { key } => {
                    warn!(key = %key, path = ?file, "Removing leftover of interrupted compaction");
                    std::fs::remove_file(&file).context(IoSnafu { path: &file })?;
                    summary.temp_removed += 1;
                }
                JournalFile::Archived { .. } => {}
            }
        }

        for (key, mut files) in live {
            if self.queues.contains_key(&key) {
                warn!(key = %key, paths = ?files, "Queue already loaded, ignoring journals");
                continue;
            }

            // Canonical journal first, then files of the same key under
            // another escaping in name order.
            let canonical = path::journal_path(&dir, &key);
            files.sort_by_key(|file| *file != canonical);

            info!(key = %key, journals = files.len(), "Restoring queue");
            let mut ready = VecDeque::new();
            for file in &files {
                let info = recovery::replay(file)?;
                summary.orphaned += info.orphaned;
                summary.inconsistencies += info.inconsistencies;
                summary.truncated += usize::from(info.truncated);
                ready.extend(info.ready);
            }

            let mut queue = open_queue(&self.config, &key, ready)?;
            queue.compact_journal()?;
            let live_path = queue.journal_path().to_path_buf();
            // Aliases are removed only once the canonical journal holds their
            // entries. A crash in between replays them again.
            for file in files.iter().filter(|file| **file != live_path) {
                warn!(key = %key, from = ?file, to = ?live_path, "Merged journal into canonical name");
                std::fs::remove_file(file).context(IoSnafu { path: file })?;
            }

            summary.queues += 1;
            summary.entries += queue.len();
            self.queues.insert(key, queue);
        }

        info!(
            queues = summary.queues,
            entries = summary.entries,
            orphaned = summary.orphaned,
            inconsistencies = summary.inconsistencies,
            "Recovery complete"
        );
        Ok(summary)
    }
}

fn open_queue(config: &QueueConfig, key: &str, ready: VecDeque<QueueEntry>) -> Result<Queue> {
    let journal = Journal::open(&config.journal_dir, key, config.durability)?;
    Ok(Queue::new(
        key.to_owned(),
        ready,
        journal,
        config.rotation,
        config.size_warning_threshold,
    ))
}
