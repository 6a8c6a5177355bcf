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

//! Transport sessions.
//!
//! [`broker`] holds the marshalled boundary to the external broker service
//! and the session state machine built on it. [`channel`] is the pure send
//! bookkeeping (dedup, retry accounting) the broker session drives.
//! [`simulator`] is the loopback TCP stand-in used during development.

/// The broker boundary and the broker-backed session.
pub mod broker;

/// Per-pair send bookkeeping.
pub mod channel;

/// Loopback TCP simulator session.
pub mod simulator;

pub use broker::{
    BrokerArg, BrokerConnector, BrokerEvent, BrokerHandle, BrokerOp, BrokerReply, BrokerSession,
    ExtraValue, Extras,
};
pub use channel::{AppChannel, SendOutcome, SendStatus};
pub use simulator::SimulatorSession;
