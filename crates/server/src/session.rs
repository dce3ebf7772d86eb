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

//! Per-connection state: reservation mode and the keys it holds.

use std::{collections::HashSet, sync::Arc};

use bytes::Bytes;
use redqueue_common_storage_queue::{QueueError, QueueFactory, SessionId, now_millis};
use redqueue_error::ErrorExt;
use tracing::{debug, error, info};

use crate::{
    SharedFactory,
    command::{Command, Reply, resolve_expiry},
    metrics::{COMMANDS, CONNECTIONS_ACTIVE, ERROR_REPLIES},
};

/// Setting this key toggles reservation mode instead of enqueueing.
pub const RESERVATION_CONTROL_KEY: &str = "config:reserv";

/// One client connection's view of the broker.
///
/// In plain mode a read takes the head entry for good. In reservation mode a
/// read borrows it under this session's id until `delete` acknowledges it; on
/// drop every entry still held is returned to the head of its queue.
#[derive(Debug)]
pub struct Session {
    id:            SessionId,
    factory:       SharedFactory,
    reservation:   bool,
    reserved_keys: HashSet<String>,
}

impl Session {
    pub fn new(factory: SharedFactory) -> Self {
        CONNECTIONS_ACTIVE.inc();
        Self {
            id: SessionId::generate(),
            factory,
            reservation: false,
            reserved_keys: HashSet::new(),
        }
    }

    pub const fn id(&self) -> &SessionId { &self.id }

    pub const fn reservation(&self) -> bool { self.reservation }

    /// Keys this session currently holds a borrowed entry of.
    pub fn reserved_keys(&self) -> impl Iterator<Item = &str> {
        self.reserved_keys.iter().map(String::as_str)
    }

    /// Runs one command to completion, including its journal writes.
    pub fn execute(&mut self, command: Command) -> Reply {
        COMMANDS.with_label_values(&[command.name()]).inc();
        match command {
            Command::Set {
                key,
                exptime,
                payload,
                noreply,
                ..
            } => match self.set(&key, exptime, payload) {
                Ok(()) if noreply => Reply::Silent,
                Ok(()) => Reply::Stored,
                Err(e) => Reply::Error(self.error_line(&key, &e)),
            },
            Command::Get { keys } => self.get(&keys, false),
            Command::Gets { keys } => self.get(&keys, true),
            Command::Delete { key, noreply } => match self.delete(&key) {
                Ok(_) if noreply => Reply::Silent,
                Ok(true) => Reply::Deleted,
                Ok(false) => Reply::NotDeleted,
                Err(e) => Reply::Error(self.error_line(&key, &e)),
            },
        }
    }

    fn set(&mut self, key: &str, exptime: i64, payload: Bytes) -> Result<(), QueueError> {
        if key == RESERVATION_CONTROL_KEY {
            return self.set_reservation(matches!(payload.as_ref(), b"1" | b"true"));
        }
        let expire_at = resolve_expiry(exptime, now_millis());
        self.factory.lock().queue(key)?.enqueue(expire_at, payload)
    }

    /// Switching mode first commits everything held under the old mode. The
    /// mode only changes once every commit went through.
    fn set_reservation(&mut self, enabled: bool) -> Result<(), QueueError> {
        if enabled == self.reservation {
            return Ok(());
        }
        let factory = Arc::clone(&self.factory);
        let mut factory = factory.lock();
        let held: Vec<String> = self.reserved_keys.iter().cloned().collect();
        for key in held {
            if let Some(queue) = factory.get_queue(&key, false)? {
                queue.ack(&self.id)?;
            }
            self.reserved_keys.remove(&key);
        }
        self.reservation = enabled;
        info!(session = %self.id, reservation = enabled, "Reservation mode changed");
        Ok(())
    }

    /// `get` collects one item per key, `gets` stops at the first key that
    /// has one.
    fn get(&mut self, keys: &[String], first_only: bool) -> Reply {
        let factory = Arc::clone(&self.factory);
        let mut factory = factory.lock();
        let mut items = Vec::new();
        for key in keys {
            match self.fetch(&mut factory, key) {
                Ok(Some(payload)) => {
                    items.push((key.clone(), payload));
                    if first_only {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    return Reply::Values {
                        items,
                        error: Some(self.error_line(key, &e)),
                    };
                }
            }
        }
        Reply::Values { items, error: None }
    }

    fn fetch(
        &mut self,
        factory: &mut QueueFactory,
        key: &str,
    ) -> Result<Option<Bytes>, QueueError> {
        if self.reservation && self.reserved_keys.contains(key) {
            return Ok(None);
        }
        let Some(queue) = factory.get_queue(key, false)? else {
            return Ok(None);
        };
        let entry = if self.reservation {
            let entry = queue.reserve(&self.id)?;
            if entry.is_some() {
                self.reserved_keys.insert(key.to_owned());
            }
            entry
        } else {
            queue.take(&self.id)?
        };
        Ok(entry.map(|entry| entry.payload))
    }

    /// Acknowledges the entry held for `key`. False if none is held.
    fn delete(&mut self, key: &str) -> Result<bool, QueueError> {
        if !self.reserved_keys.contains(key) {
            return Ok(false);
        }
        let mut factory = self.factory.lock();
        let acked = match factory.get_queue(key, false)? {
            Some(queue) => queue.ack(&self.id)?,
            None => false,
        };
        self.reserved_keys.remove(key);
        Ok(acked)
    }

    /// Returns every held entry to the head of its queue, under a single
    /// lock acquisition.
    pub fn release(&mut self) {
        if self.reserved_keys.is_empty() {
            return;
        }
        let mut factory = self.factory.lock();
        for key in self.reserved_keys.drain() {
            match factory.get_queue(&key, false) {
                Ok(Some(queue)) => match queue.give_back(&self.id) {
                    Ok(returned) => {
                        debug!(session = %self.id, key = %key, returned, "Returned reservation");
                    }
                    Err(e) => {
                        error!(session = %self.id, key = %key, error = %e, "Failed to return reservation");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    error!(session = %self.id, key = %key, error = %e, "Failed to look up queue");
                }
            }
        }
    }

    fn error_line(&self, key: &str, err: &QueueError) -> String {
        error!(session = %self.id, key, error = %err, "Queue operation failed");
        ERROR_REPLIES
            .with_label_values(&[err.status_code().as_str()])
            .inc();
        err.reply_line()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
        CONNECTIONS_ACTIVE.dec();
    }
}
