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

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Default journal size after which an idle queue rotates its journal.
pub const DEFAULT_ROTATE_THRESHOLD: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct QueueConfig {
    /// Directory holding one journal per queue. Must exist unless durability
    /// is [`DurabilityMode::None`].
    #[default(_code = "PathBuf::from(\"journal\")")]
    pub journal_dir:            PathBuf,
    pub durability:             DurabilityMode,
    pub rotation:               RotationPolicy,
    /// Ready length above which a warning is logged.
    #[default = 128]
    pub size_warning_threshold: usize,
}

/// How hard each journal append tries to reach stable storage.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::EnumString,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum DurabilityMode {
    /// Journaling disabled, state lives in memory only.
    #[strum(to_string = "none", serialize = "no")]
    None,
    /// Write and flush to the OS; survives a process crash.
    #[default]
    #[strum(to_string = "buffered", serialize = "yes")]
    Buffered,
    /// Write, flush and fsync; survives power loss.
    #[strum(to_string = "sync")]
    Sync,
}

impl DurabilityMode {
    pub const fn is_enabled(self) -> bool { !matches!(self, Self::None) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct RotationPolicy {
    /// Minimum journal size in bytes before rotation is considered.
    #[default(_code = "DEFAULT_ROTATE_THRESHOLD")]
    pub threshold: u64,
    /// Keep rotated journals under a timestamped name instead of deleting
    /// them.
    #[default = true]
    pub archive:   bool,
}

impl RotationPolicy {
    /// Rotation only ever happens on an idle queue, so the fresh journal
    /// starts from the empty state and replays on its own.
    pub const fn should_rotate(&self, journal_size: u64, idle: bool) -> bool {
        idle && journal_size >= self.threshold
    }
}
