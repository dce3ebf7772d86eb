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

use std::path::PathBuf;

use snafu::ensure;

use crate::{
    DurabilityMode, QueueConfig, QueueFactory, Result, RotationPolicy,
    error::JournalDirMissingSnafu,
};

pub struct QueueFactoryBuilder {
    config: QueueConfig,
}

impl QueueFactoryBuilder {
    pub fn new<P: Into<PathBuf>>(journal_dir: P) -> Self {
        Self {
            config: QueueConfig {
                journal_dir: journal_dir.into(),
                ..Default::default()
            },
        }
    }

    pub fn from_config(config: QueueConfig) -> Self { Self { config } }

    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.config.durability = mode;
        self
    }

    pub fn rotation(mut self, rotation: RotationPolicy) -> Self {
        self.config.rotation = rotation;
        self
    }

    pub fn rotate_threshold(mut self, bytes: u64) -> Self {
        self.config.rotation.threshold = bytes;
        self
    }

    pub fn archive_rotated(mut self, archive: bool) -> Self {
        self.config.rotation.archive = archive;
        self
    }

    pub fn size_warning_threshold(mut self, len: usize) -> Self {
        self.config.size_warning_threshold = len;
        self
    }

    /// Builds an empty factory. The journal directory must already exist
    /// unless journaling is disabled.
    pub fn build(self) -> Result<QueueFactory> {
        if self.config.durability.is_enabled() {
            ensure!(
                self.config.journal_dir.is_dir(),
                JournalDirMissingSnafu {
                    path: &self.config.journal_dir,
                }
            );
        }
        Ok(QueueFactory::new(self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QueueError;

    #[test]
    fn test_builder_default_config() {
        let builder = QueueFactoryBuilder::new("/tmp/test_journal");
        assert_eq!(builder.config.journal_dir, PathBuf::from("/tmp/test_journal"));
        assert_eq!(builder.config.durability, DurabilityMode::Buffered);
        assert_eq!(builder.config.rotation, RotationPolicy::default());
        assert_eq!(builder.config.size_warning_threshold, 128);
    }

    #[test]
    fn test_builder_custom_config() {
        let builder = QueueFactoryBuilder::new("/tmp/test_journal")
            .durability(DurabilityMode::Sync)
            .rotate_threshold(4096)
            .archive_rotated(false)
            .size_warning_threshold(10);

        assert_eq!(builder.config.durability, DurabilityMode::Sync);
        assert_eq!(builder.config.rotation.threshold, 4096);
        assert!(!builder.config.rotation.archive);
        assert_eq!(builder.config.size_warning_threshold, 10);
    }

    #[test]
    fn test_build_requires_journal_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let missing = temp_dir.path().join("absent");

        let err = QueueFactoryBuilder::new(&missing).build().unwrap_err();
        assert!(matches!(err, QueueError::JournalDirMissing { .. }));

        let factory = QueueFactoryBuilder::new(&missing)
            .durability(DurabilityMode::None)
            .build()
            .unwrap();
        assert!(factory.is_empty());
    }
}
