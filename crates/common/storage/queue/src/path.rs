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

//! Journal file naming.
//!
//! A queue key maps to `<escaped>.log`, where `<escaped>` is the key with
//! every byte outside `[A-Za-z0-9_.~-]` percent-encoded and spaces written as
//! `+`. Rotated journals are archived as `<escaped>.log.<unix-millis>` and
//! compaction writes through `<escaped>.log.tmp`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use snafu::ResultExt;

use crate::{Result, error::IoSnafu};

pub const JOURNAL_SUFFIX: &str = ".log";
const TEMP_SUFFIX: &str = ".log.tmp";

const KEY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b' ');

/// Escapes a queue key into a file name stem.
pub fn escape_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ESCAPE)
        .to_string()
        .replace(' ', "+")
}

/// Inverse of [`escape_key`]. Invalid UTF-8 sequences are replaced.
pub fn unescape_key(stem: &str) -> String {
    let spaced = stem.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Returns `dir/<escaped>.log`.
pub fn journal_path<P: AsRef<Path>>(dir: P, key: &str) -> PathBuf {
    dir.as_ref()
        .join(format!("{}{JOURNAL_SUFFIX}", escape_key(key)))
}

/// Returns the compaction scratch file of a live journal.
pub fn temp_path(live: &Path) -> PathBuf { append_suffix(live, ".tmp") }

/// Returns a free archive name `<live>.<unix-millis>` for a rotation at `time`.
pub fn archive_path(live: &Path, time: DateTime<Utc>) -> PathBuf {
    let mut generation = time.timestamp_millis();
    loop {
        let candidate = append_suffix(live, &format!(".{generation}"));
        if !candidate.exists() {
            return candidate;
        }
        generation += 1;
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Role of a file found in the journal directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalFile {
    /// The file currently appended to for `key`.
    Live { key: String },
    /// A rotated journal, never replayed.
    Archived { key: String, generation: i64 },
    /// Leftover of an interrupted compaction.
    Temp { key: String },
}

impl JournalFile {
    /// Classifies a file name, returning `None` for unrelated files.
    pub fn classify(file_name: &str) -> Option<Self> {
        if let Some(stem) = file_name.strip_suffix(TEMP_SUFFIX) {
            return Some(Self::Temp {
                key: unescape_key(stem),
            });
        }
        if let Some(stem) = file_name.strip_suffix(JOURNAL_SUFFIX) {
            return Some(Self::Live {
                key: unescape_key(stem),
            });
        }
        let (rest, generation) = file_name.rsplit_once('.')?;
        let stem = rest.strip_suffix(JOURNAL_SUFFIX)?;
        let generation = generation.parse().ok()?;
        Some(Self::Archived {
            key: unescape_key(stem),
            generation,
        })
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Live { key } | Self::Archived { key, .. } | Self::Temp { key } => key,
        }
    }
}

/// Lists the journal files directly under `dir`, sorted by path.
pub fn scan_journal_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<(JournalFile, PathBuf)>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).context(IoSnafu { path: dir })? {
        let entry = entry.context(IoSnafu { path: dir })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(kind) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(JournalFile::classify)
        else {
            continue;
        };
        files.push((kind, path));
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use test_case::test_case;

    use super::*;

    #[test_case("jobs", "jobs" ; "plain")]
    #[test_case("abc/def", "abc%2Fdef" ; "slash")]
    #[test_case("task:url", "task%3Aurl" ; "colon")]
    #[test_case("a b", "a+b" ; "space")]
    #[test_case("a+b", "a%2Bb" ; "plus")]
    #[test_case("v1.2_x-y~z", "v1.2_x-y~z" ; "unreserved")]
    #[test_case("队列", "%E9%98%9F%E5%88%97" ; "utf8")]
    fn escaping(key: &str, escaped: &str) {
        assert_eq!(escape_key(key), escaped);
        assert_eq!(unescape_key(escaped), key);
    }

    #[test]
    fn journal_path_uses_escaped_key() {
        assert_eq!(
            journal_path("/var/journal", "abc/def"),
            PathBuf::from("/var/journal/abc%2Fdef.log")
        );
    }

    #[test]
    fn classify_names() {
        assert_eq!(
            JournalFile::classify("task%3Aurl.log"),
            Some(JournalFile::Live {
                key: "task:url".to_string(),
            })
        );
        assert_eq!(
            JournalFile::classify("jobs.log.1700000000123"),
            Some(JournalFile::Archived {
                key:        "jobs".to_string(),
                generation: 1_700_000_000_123,
            })
        );
        assert_eq!(
            JournalFile::classify("jobs.log.tmp"),
            Some(JournalFile::Temp {
                key: "jobs".to_string(),
            })
        );
        assert_eq!(JournalFile::classify("notes.txt"), None);
        assert_eq!(JournalFile::classify("jobs.log.old"), None);
    }

    #[test]
    fn dotted_keys_stay_live() {
        let name = format!("{}{JOURNAL_SUFFIX}", escape_key("events.log"));
        assert_eq!(
            JournalFile::classify(&name),
            Some(JournalFile::Live {
                key: "events.log".to_string(),
            })
        );
    }

    #[test]
    fn archive_path_skips_taken_names() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let live = journal_path(temp_dir.path(), "jobs");
        let time = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        let first = archive_path(&live, time);
        assert_eq!(first, temp_dir.path().join("jobs.log.1700000000000"));
        std::fs::File::create(&first).unwrap();

        let second = archive_path(&live, time);
        assert_eq!(second, temp_dir.path().join("jobs.log.1700000000001"));
    }

    #[test]
    fn test_scan_journal_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let base = temp_dir.path();
        for name in ["b.log", "a.log", "a.log.17", "a.log.tmp", "readme.md"] {
            std::fs::File::create(base.join(name)).unwrap();
        }
        std::fs::create_dir(base.join("nested.log")).unwrap();

        let files = scan_journal_dir(base).unwrap();
        let kinds: Vec<_> = files.into_iter().map(|(kind, _)| kind).collect();
        assert_eq!(
            kinds,
            vec![
                JournalFile::Live {
                    key: "a".to_string(),
                },
                JournalFile::Archived {
                    key:        "a".to_string(),
                    generation: 17,
                },
                JournalFile::Temp {
                    key: "a".to_string(),
                },
                JournalFile::Live {
                    key: "b".to_string(),
                },
            ]
        );
    }
}
