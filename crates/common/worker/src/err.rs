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

use std::fmt;

/// Result type for worker operations.
pub type Result<T, E = WorkError> = std::result::Result<T, E>;

/// Error severity level for worker operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ErrorSeverity {
    /// The worker logs the error and polls again after its next delay.
    ///
    /// Use this for things like an unreachable upstream or a queue that is
    /// temporarily unable to journal.
    #[display("transient")]
    Transient,

    /// The worker stops after running `on_shutdown()`.
    #[display("fatal")]
    Fatal,
}

/// Error returned from `work()`, `on_start()` and `on_shutdown()`.
///
/// # Example
///
/// ```rust
/// use redqueue_common_worker::{Progress, Result, WorkError};
///
/// fn poll(queue_ok: bool, config_ok: bool) -> Result<Progress> {
///     if !config_ok {
///         return Err(WorkError::fatal("Task key is not configured"));
///     }
///     if !queue_ok {
///         return Err(WorkError::transient("Queue unavailable"));
///     }
///     Ok(Progress::Idle)
/// }
/// # assert!(poll(false, true).unwrap_err().is_transient());
/// ```
#[derive(Debug)]
pub struct WorkError {
    severity: ErrorSeverity,
    message:  String,
    source:   Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl WorkError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorSeverity::Transient, message.into(), None)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorSeverity::Fatal, message.into(), None)
    }

    pub fn transient_with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::new(
            ErrorSeverity::Transient,
            message.into(),
            Some(Box::new(source)),
        )
    }

    pub fn fatal_with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::new(ErrorSeverity::Fatal, message.into(), Some(Box::new(source)))
    }

    const fn new(
        severity: ErrorSeverity,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            severity,
            message,
            source,
        }
    }

    pub const fn severity(&self) -> ErrorSeverity { self.severity }

    pub fn is_fatal(&self) -> bool { self.severity == ErrorSeverity::Fatal }

    pub fn is_transient(&self) -> bool { self.severity == ErrorSeverity::Transient }

    pub fn message(&self) -> &str { &self.message }
}

impl fmt::Display for WorkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)?;
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for WorkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_source() {
        let io = std::io::Error::other("connection reset");
        let err = WorkError::transient_with_source("Fetch failed", io);
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "[transient] Fetch failed: connection reset");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_fatal() {
        let err = WorkError::fatal("bad config");
        assert!(err.is_fatal());
        assert_eq!(err.severity(), ErrorSeverity::Fatal);
        assert_eq!(err.message(), "bad config");
    }
}
