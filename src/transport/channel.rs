/*
 * Copyright (c) 2025.
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Per-pair send bookkeeping.
//!
//! [`AppChannel`] tracks at most one pending send per (device, application)
//! pair and turns broker send-status reports into decisions: complete the
//! send, schedule a retry with linear backoff, or drop it once the retry
//! ceiling is reached. It performs no I/O and never awaits; the owning
//! session executes the decisions.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

use crate::device::PairKey;

/// Send status codes reported by the broker for an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Delivered.
    Success,
    /// Unspecified failure.
    FailureUnknown,
    /// The payload was rejected as malformed.
    InvalidFormat,
    /// The payload exceeded the broker's size limit.
    MessageTooLarge,
    /// The payload contained a value type the wire format cannot carry.
    UnsupportedType,
    /// Transfer started but did not complete.
    FailureDuringTransfer,
    /// The addressed device is unknown to the broker.
    InvalidDevice,
    /// The addressed device is not currently connected.
    DeviceNotConnected,
}

impl SendStatus {
    /// Maps a broker status code, falling back to `FailureUnknown`.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            2 => Self::InvalidFormat,
            3 => Self::MessageTooLarge,
            4 => Self::UnsupportedType,
            5 => Self::FailureDuringTransfer,
            6 => Self::InvalidDevice,
            7 => Self::DeviceNotConnected,
            _ => Self::FailureUnknown,
        }
    }

    /// Whether a resend of the same payload can plausibly succeed.
    ///
    /// Only transient conditions qualify: a transfer that broke off
    /// mid-flight or a device that is temporarily out of range.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::FailureDuringTransfer | Self::DeviceNotConnected)
    }
}

impl std::fmt::Display for SendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SendStatus::Success => "success",
            SendStatus::FailureUnknown => "failure unknown",
            SendStatus::InvalidFormat => "invalid format",
            SendStatus::MessageTooLarge => "message too large",
            SendStatus::UnsupportedType => "unsupported type",
            SendStatus::FailureDuringTransfer => "failure during transfer",
            SendStatus::InvalidDevice => "invalid device",
            SendStatus::DeviceNotConnected => "device not connected",
        };
        write!(f, "{name}")
    }
}

/// Decision returned by [`AppChannel::complete`] for a status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The send reached a terminal state; notify the owner. `None` means
    /// success, `Some` carries the error text.
    Completed {
        /// Error text, `None` on success.
        error: Option<String>,
    },
    /// Schedule a resend after `delay`; the resend must present `generation`
    /// back to [`AppChannel::retry_send`].
    Retry {
        /// How long to wait before resending.
        delay: Duration,
        /// Generation stamp the resend must match to still be current.
        generation: u8,
    },
    /// Retry ceiling reached; the send was dropped without notification.
    Dropped,
    /// No pending entry matched the report (duplicate or late status).
    Unmatched,
}

struct PendingSend {
    payload: Vec<u8>,
    retry_count: u8,
}

/// Send bookkeeping for one session.
///
/// The pending map holds at most one entry per pair. A fresh send always
/// overwrites the pair's entry, which is what makes a stale retry for older
/// data detectable: retries carry the generation stamp they were scheduled
/// with and are dropped when the entry no longer matches.
pub struct AppChannel {
    retry_wait: Duration,
    retry_limit: u8,
    pending: Mutex<HashMap<PairKey, PendingSend>>,
    registered: Mutex<HashSet<String>>,
    dropped_sends: AtomicU64,
}

impl AppChannel {
    /// Creates a channel with the given retry policy.
    #[must_use]
    pub fn new(retry_wait: Duration, retry_limit: u8) -> Self {
        Self {
            retry_wait,
            retry_limit,
            pending: Mutex::new(HashMap::new()),
            registered: Mutex::new(HashSet::new()),
            dropped_sends: AtomicU64::new(0),
        }
    }

    /// Records that inbound messages from `app_id` are wired up.
    ///
    /// Returns `true` the first time an application id is seen, so the
    /// caller registers the broker listener exactly once per connection.
    pub fn register(&self, app_id: &str) -> bool {
        self.registered
            .lock()
            .expect("registered set poisoned")
            .insert(app_id.to_string())
    }

    /// Records a fresh send for `key`, replacing any pending entry.
    pub fn fresh_send(&self, key: PairKey, payload: Vec<u8>) {
        let mut pending = self.pending.lock().expect("pending map poisoned");
        if pending
            .insert(
                key.clone(),
                PendingSend {
                    payload,
                    retry_count: 1,
                },
            )
            .is_some()
        {
            debug!("replacing pending send for {key}");
        }
    }

    /// Applies a broker status report to the pending entry for `key`.
    pub fn complete(&self, key: &PairKey, status: SendStatus) -> SendOutcome {
        let mut pending = self.pending.lock().expect("pending map poisoned");
        let Some(entry) = pending.get_mut(key) else {
            debug!("no pending send matches status '{status}' for {key}");
            return SendOutcome::Unmatched;
        };
        if status == SendStatus::Success {
            pending.remove(key);
            return SendOutcome::Completed { error: None };
        }
        if !status.is_retryable() {
            let code = entry_status_code(status);
            pending.remove(key);
            return SendOutcome::Completed {
                error: Some(format!("error {code}")),
            };
        }
        if entry.retry_count >= self.retry_limit {
            pending.remove(key);
            self.dropped_sends.fetch_add(1, Ordering::Relaxed);
            warn!("dropping send for {key} after {} attempts", self.retry_limit);
            return SendOutcome::Dropped;
        }
        let delay = self.retry_wait * u32::from(entry.retry_count);
        entry.retry_count += 1;
        SendOutcome::Retry {
            delay,
            generation: entry.retry_count,
        }
    }

    /// Claims the payload for a scheduled resend.
    ///
    /// Returns `None` when the entry is gone (completed in the meantime) or
    /// its generation no longer matches (overwritten by a fresh send), in
    /// which case the resend must not happen.
    pub fn retry_send(&self, key: &PairKey, generation: u8) -> Option<Vec<u8>> {
        let pending = self.pending.lock().expect("pending map poisoned");
        match pending.get(key) {
            Some(entry) if entry.retry_count == generation => Some(entry.payload.clone()),
            Some(_) => {
                debug!("skipping stale retry for {key}");
                None
            }
            None => {
                debug!("skipping retry for completed send {key}");
                None
            }
        }
    }

    /// Number of sends awaiting a terminal status.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending map poisoned").len()
    }

    /// Total sends dropped at the retry ceiling since creation.
    #[must_use]
    pub fn dropped_sends(&self) -> u64 {
        self.dropped_sends.load(Ordering::Relaxed)
    }

    /// Forgets the registered-listener set, keeping pending sends.
    ///
    /// Used on disconnect: listener registrations are per-connection, but a
    /// completed-elsewhere pending entry carries no live resources.
    pub fn clear_registrations(&self) {
        self.registered
            .lock()
            .expect("registered set poisoned")
            .clear();
    }

    /// Drops all bookkeeping. Used on dispose.
    pub fn clear(&self) {
        self.pending.lock().expect("pending map poisoned").clear();
        self.clear_registrations();
    }
}

const fn entry_status_code(status: SendStatus) -> i32 {
    match status {
        SendStatus::Success => 0,
        SendStatus::FailureUnknown => 1,
        SendStatus::InvalidFormat => 2,
        SendStatus::MessageTooLarge => 3,
        SendStatus::UnsupportedType => 4,
        SendStatus::FailureDuringTransfer => 5,
        SendStatus::InvalidDevice => 6,
        SendStatus::DeviceNotConnected => 7,
    }
}
