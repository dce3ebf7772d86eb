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

//! Append-only journal file of a single queue.

use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use bytes::BytesMut;
use snafu::{ResultExt, ensure};
use tracing::{debug, error, info};

use crate::{
    DurabilityMode, JournalRecord, QueueEntry, Result,
    error::{IoSnafu, PoisonedSnafu, QueueError},
    path,
};

/// Write side of a queue journal.
///
/// Once any write fails the journal is poisoned and rejects every later
/// append, so no operation is acknowledged without being journaled.
#[derive(Debug)]
pub struct Journal {
    key:        String,
    path:       PathBuf,
    file:       Option<File>,
    durability: DurabilityMode,
    size:       u64,
    poisoned:   bool,
    scratch:    BytesMut,
}

impl Journal {
    /// Opens (creating if needed) the live journal of `key` in append mode.
    ///
    /// With [`DurabilityMode::None`] no file is touched.
    pub fn open(dir: &Path, key: &str, durability: DurabilityMode) -> Result<Self> {
        let path = path::journal_path(dir, key);
        if !durability.is_enabled() {
            return Ok(Self::detached(key, path, durability));
        }

        let file = open_append(&path)?;
        let size = file.metadata().context(IoSnafu { path: &path })?.len();
        debug!(key, path = ?path, size, "Journal opened");

        Ok(Self {
            key: key.to_owned(),
            path,
            file: Some(file),
            durability,
            size,
            poisoned: false,
            scratch: BytesMut::with_capacity(256),
        })
    }

    fn detached(key: &str, path: PathBuf, durability: DurabilityMode) -> Self {
        Self {
            key: key.to_owned(),
            path,
            file: None,
            durability,
            size: 0,
            poisoned: false,
            scratch: BytesMut::new(),
        }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Bytes in the live file.
    pub const fn size(&self) -> u64 { self.size }

    pub const fn is_poisoned(&self) -> bool { self.poisoned }

    pub const fn is_enabled(&self) -> bool { self.file.is_some() }

    /// Appends one record according to the durability mode.
    pub fn append(&mut self, record: &JournalRecord) -> Result<()> {
        ensure!(!self.poisoned, PoisonedSnafu { key: &self.key });
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        self.scratch.clear();
        record.encode(&mut self.scratch);
        let durability = self.durability;
        let written = file.write_all(&self.scratch).and_then(|()| {
            file.flush()?;
            if durability == DurabilityMode::Sync {
                file.sync_data()?;
            }
            Ok(())
        });

        match written.context(IoSnafu { path: &self.path }) {
            Ok(()) => {
                self.size += self.scratch.len() as u64;
                Ok(())
            }
            Err(e) => Err(self.poison(e)),
        }
    }

    /// Starts a new, empty live file.
    ///
    /// The old file is archived next to it or deleted. Callers must only
    /// rotate when the queue holds no entries at all.
    pub fn rotate(&mut self, archive: bool) -> Result<Option<PathBuf>> {
        ensure!(!self.poisoned, PoisonedSnafu { key: &self.key });
        if self.file.take().is_none() {
            return Ok(None);
        }

        match self.swap_out(archive) {
            Ok(archived) => {
                info!(key = %self.key, archived = ?archived, size = self.size, "Journal rotated");
                self.size = 0;
                Ok(archived)
            }
            Err(e) => Err(self.poison(e)),
        }
    }

    fn swap_out(&mut self, archive: bool) -> Result<Option<PathBuf>> {
        let archived = if archive {
            let target = path::archive_path(&self.path, chrono::Utc::now());
            std::fs::rename(&self.path, &target).context(IoSnafu { path: &target })?;
            Some(target)
        } else {
            std::fs::remove_file(&self.path).context(IoSnafu { path: &self.path })?;
            None
        };
        self.file = Some(open_append(&self.path)?);
        Ok(archived)
    }

    /// Atomically replaces the live file with one `Store` record per entry.
    ///
    /// The new content is written to a temp file, synced, and renamed over the
    /// live file, so a crash leaves either the old or the new journal.
    pub fn compact<'a, I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a QueueEntry>,
    {
        ensure!(!self.poisoned, PoisonedSnafu { key: &self.key });
        if self.file.is_none() {
            return Ok(());
        }

        match self.rewrite(entries) {
            Ok(size) => {
                debug!(key = %self.key, before = self.size, after = size, "Journal compacted");
                self.size = size;
                Ok(())
            }
            Err(e) => Err(self.poison(e)),
        }
    }

    fn rewrite<'a, I>(&mut self, entries: I) -> Result<u64>
    where
        I: IntoIterator<Item = &'a QueueEntry>,
    {
        let temp = path::temp_path(&self.path);
        let file = File::create(&temp).context(IoSnafu { path: &temp })?;
        let mut writer = BufWriter::new(file);
        let mut size = 0u64;
        for entry in entries {
            self.scratch.clear();
            JournalRecord::store(entry).encode(&mut self.scratch);
            writer
                .write_all(&self.scratch)
                .context(IoSnafu { path: &temp })?;
            size += self.scratch.len() as u64;
        }
        let file = writer
            .into_inner()
            .map_err(std::io::IntoInnerError::into_error)
            .context(IoSnafu { path: &temp })?;
        file.sync_all().context(IoSnafu { path: &temp })?;
        drop(file);

        self.file = None;
        std::fs::rename(&temp, &self.path).context(IoSnafu { path: &self.path })?;
        self.file = Some(open_append(&self.path)?);
        Ok(size)
    }

    pub(crate) fn poison(&mut self, error: QueueError) -> QueueError {
        error!(key = %self.key, path = ?self.path, error = %error, "Journal write failed, queue is now read-only");
        self.poisoned = true;
        error
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context(IoSnafu { path })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::*;

    fn store(payload: &'static [u8]) -> JournalRecord {
        JournalRecord::Store {
            expire_at: None,
            payload:   Bytes::from_static(payload),
        }
    }

    #[test]
    fn append_writes_through() {
        let temp_dir = TempDir::new().unwrap();
        let mut journal = Journal::open(temp_dir.path(), "jobs", DurabilityMode::Sync).unwrap();
        journal.append(&store(b"I")).unwrap();
        journal.append(&JournalRecord::Dequeue).unwrap();

        let on_disk = std::fs::read(journal.path()).unwrap();
        assert_eq!(on_disk, b"S 0 1\r\nI\r\nG\r\n");
        assert_eq!(journal.size(), on_disk.len() as u64);
    }

    #[test]
    fn reopen_appends_after_existing_content() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut journal =
                Journal::open(temp_dir.path(), "jobs", DurabilityMode::Buffered).unwrap();
            journal.append(&store(b"a")).unwrap();
        }
        let mut journal = Journal::open(temp_dir.path(), "jobs", DurabilityMode::Buffered).unwrap();
        assert_eq!(journal.size(), 10);
        journal.append(&store(b"b")).unwrap();
        assert_eq!(
            std::fs::read(journal.path()).unwrap(),
            b"S 0 1\r\na\r\nS 0 1\r\nb\r\n"
        );
    }

    #[test]
    fn disabled_journal_touches_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut journal = Journal::open(temp_dir.path(), "jobs", DurabilityMode::None).unwrap();
        journal.append(&store(b"a")).unwrap();
        assert!(!journal.is_enabled());
        assert_eq!(journal.size(), 0);
        assert!(journal.rotate(true).unwrap().is_none());
        assert!(!journal.path().exists());
    }

    #[test]
    fn rotate_archives_old_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut journal = Journal::open(temp_dir.path(), "jobs", DurabilityMode::Buffered).unwrap();
        journal.append(&store(b"a")).unwrap();
        journal.append(&JournalRecord::Dequeue).unwrap();

        let archived = journal.rotate(true).unwrap().unwrap();
        assert_eq!(std::fs::read(&archived).unwrap(), b"S 0 1\r\na\r\nG\r\n");
        assert_eq!(journal.size(), 0);
        assert_eq!(std::fs::read(journal.path()).unwrap(), b"");

        journal.append(&store(b"b")).unwrap();
        assert_eq!(std::fs::read(journal.path()).unwrap(), b"S 0 1\r\nb\r\n");
    }

    #[test]
    fn rotate_without_archive_deletes() {
        let temp_dir = TempDir::new().unwrap();
        let mut journal = Journal::open(temp_dir.path(), "jobs", DurabilityMode::Buffered).unwrap();
        journal.append(&store(b"a")).unwrap();
        assert!(journal.rotate(false).unwrap().is_none());
        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("jobs.log")]);
    }

    #[test]
    fn compact_rewrites_state() {
        let temp_dir = TempDir::new().unwrap();
        let mut journal = Journal::open(temp_dir.path(), "jobs", DurabilityMode::Buffered).unwrap();
        for payload in [&b"a"[..], b"b", b"c"] {
            journal
                .append(&JournalRecord::Store {
                    expire_at: None,
                    payload:   Bytes::copy_from_slice(payload),
                })
                .unwrap();
        }
        journal.append(&JournalRecord::Dequeue).unwrap();

        let remaining = [
            QueueEntry::new(None, "b"),
            QueueEntry::new(Some(1_700_000_000_000), "c"),
        ];
        journal.compact(&remaining).unwrap();

        let expected: &[u8] = b"S 0 1\r\nb\r\nS 1700000000000 1\r\nc\r\n";
        assert_eq!(std::fs::read(journal.path()).unwrap(), expected);
        assert_eq!(journal.size(), expected.len() as u64);
        assert!(!path::temp_path(journal.path()).exists());

        journal.append(&JournalRecord::Dequeue).unwrap();
        assert!(std::fs::read(journal.path()).unwrap().ends_with(b"G\r\n"));
    }

    #[test]
    fn poisoned_journal_rejects_writes() {
        let temp_dir = TempDir::new().unwrap();
        let mut journal = Journal::open(temp_dir.path(), "jobs", DurabilityMode::Buffered).unwrap();
        let err = journal.poison(
            PoisonedSnafu {
                key: "jobs".to_string(),
            }
            .build(),
        );
        assert!(matches!(err, QueueError::Poisoned { .. }));
        assert!(journal.is_poisoned());
        assert!(matches!(
            journal.append(&JournalRecord::Dequeue),
            Err(QueueError::Poisoned { .. })
        ));
        assert!(journal.rotate(true).is_err());
    }
}
