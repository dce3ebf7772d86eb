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

use std::str::FromStr;

use snafu::ensure;
use uuid::Uuid;

use crate::error::{InvalidSessionIdSnafu, QueueError};

/// Identity of a consumer that can hold borrowed entries.
///
/// Session ids end up inside journal lines, so they never contain whitespace
/// or control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("{_0}")]
pub struct SessionId(String);

impl SessionId {
    /// A fresh random id.
    pub fn generate() -> Self { Self(Uuid::new_v4().simple().to_string()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl FromStr for SessionId {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ensure!(
            !s.is_empty() && !s.chars().any(|c| c.is_whitespace() || c.is_control()),
            InvalidSessionIdSnafu { id: s }
        );
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str { &self.0 }
}
