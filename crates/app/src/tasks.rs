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

//! Background tasks fed through the queue itself.
//!
//! A task polls a well-known key with `take` under its own session and acts
//! on every payload it finds. Polling backs off while the key stays empty.

use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use bytes::Bytes;
use redqueue_common_storage_queue::SessionId;
use redqueue_common_worker::{Progress, Result, WorkError, Worker, WorkerContext};
use redqueue_server::SharedFactory;
use serde::Deserialize;
use smart_default::SmartDefault;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Key polled by [`UrlFetchTask`].
pub const URL_TASK_KEY: &str = "task:url";

#[derive(Debug, Clone, SmartDefault, Builder)]
pub struct TaskConfig {
    /// Run the background task runner at all.
    #[default = true]
    #[builder(default = true)]
    pub enabled:          bool,
    /// Upper bound of the random delay before the first poll.
    #[default(Duration::from_secs(2))]
    #[builder(default = Duration::from_secs(2))]
    pub max_start_jitter: Duration,
    #[default(Duration::from_secs(30))]
    #[builder(default = Duration::from_secs(30))]
    pub fetch_timeout:    Duration,
    /// How long stopping the runner may take before tasks are aborted.
    #[default(Duration::from_secs(10))]
    #[builder(default = Duration::from_secs(10))]
    pub shutdown_timeout: Duration,
}

/// Payload of a `task:url` entry: a bare JSON string or `{"url": ...}`.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
enum UrlPayload {
    Plain(String),
    Object { url: String },
}

fn parse_url(payload: &Bytes) -> std::result::Result<String, serde_json::Error> {
    Ok(match serde_json::from_slice(payload)? {
        UrlPayload::Plain(url) | UrlPayload::Object { url } => url,
    })
}

/// Random delay in `[0, max]` so several runners do not poll in lockstep.
fn start_jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let random = Uuid::new_v4().as_u64_pair().0;
    Duration::from_millis(random % (max_ms + 1))
}

/// Fetches every URL pushed to [`URL_TASK_KEY`] with an HTTP GET.
///
/// Each fetch runs detached so a slow server never delays the next poll.
/// Outcomes are only logged.
pub struct UrlFetchTask {
    factory: SharedFactory,
    session: SessionId,
    client:  reqwest::Client,
    jitter:  Duration,
}

impl UrlFetchTask {
    pub fn new(factory: SharedFactory, config: &TaskConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()?;
        Ok(Self {
            factory,
            session: SessionId::generate(),
            client,
            jitter: start_jitter(config.max_start_jitter),
        })
    }

    fn spawn_fetch(&self, url: String, cancel: CancellationToken) {
        let client = self.client.clone();
        tokio::spawn(async move {
            let response = tokio::select! {
                response = client.get(&url).send() => response,
                () = cancel.cancelled() => return,
            };
            match response.and_then(reqwest::Response::error_for_status) {
                Ok(response) => info!(url = %url, status = %response.status(), "URL fetched"),
                Err(e) => error!(url = %url, error = %e, "Failed to fetch URL"),
            }
        });
    }
}

#[async_trait]
impl Worker for UrlFetchTask {
    fn name() -> &'static str { "url_fetch" }

    async fn on_start(&mut self, ctx: &WorkerContext) -> Result<()> {
        debug!(session = %self.session, delay = ?self.jitter, "Delaying first poll");
        ctx.sleep(self.jitter).await;
        Ok(())
    }

    async fn work(&mut self, ctx: &WorkerContext) -> Result<Progress> {
        let taken = {
            let mut factory = self.factory.lock();
            factory
                .queue(URL_TASK_KEY)
                .and_then(|queue| queue.take(&self.session))
        }
        .map_err(|e| WorkError::transient_with_source("Failed to poll task queue", e))?;

        let Some(entry) = taken else {
            return Ok(Progress::Idle);
        };
        match parse_url(&entry.payload) {
            Ok(url) => self.spawn_fetch(url, ctx.child_token()),
            Err(e) => error!(
                key = URL_TASK_KEY,
                payload = %String::from_utf8_lossy(&entry.payload),
                error = %e,
                "Dropping malformed task payload"
            ),
        }
        Ok(Progress::Busy)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(br#""http://example.com/a""#, "http://example.com/a" ; "plain string")]
    #[test_case(br#"{"url": "http://example.com/b"}"#, "http://example.com/b" ; "object")]
    #[test_case(br#"{"url": "http://example.com/c", "retry": 3}"#, "http://example.com/c" ; "extra fields")]
    fn test_parse_url(raw: &'static [u8], expected: &str) {
        assert_eq!(parse_url(&Bytes::from_static(raw)).unwrap(), expected);
    }

    #[test_case(b"" ; "empty")]
    #[test_case(b"http://example.com" ; "not json")]
    #[test_case(br#"{"href": "http://example.com"}"# ; "missing url")]
    #[test_case(b"42" ; "number")]
    fn test_parse_url_rejects(raw: &'static [u8]) {
        assert!(parse_url(&Bytes::from_static(raw)).is_err());
    }

    #[test]
    fn test_start_jitter_bounds() {
        assert_eq!(start_jitter(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(start_jitter(Duration::from_secs(2)) <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_default_config() {
        let config = TaskConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_start_jitter, Duration::from_secs(2));
        assert_eq!(TaskConfig::builder().build().fetch_timeout, config.fetch_timeout);
    }
}
