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

/// Represents failures raised by the external broker boundary.
///
/// These never escape to senders of high-level messages: transacted-call
/// failures degrade to neutral defaults (`Unknown` status, `NotInstalled`
/// application info) and dead handles trigger a reconnect cycle instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerFault {
    /// The underlying transport handle is no longer live.
    Dead,
    /// The broker raised a remote exception for a transacted call.
    Remote(String),
    /// A lower-level I/O failure while talking to the broker.
    Io(String),
}

impl std::fmt::Display for BrokerFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerFault::Dead => write!(f, "broker handle is dead"),
            BrokerFault::Remote(msg) => write!(f, "remote broker exception: {msg}"),
            BrokerFault::Io(msg) => write!(f, "broker i/o failure: {msg}"),
        }
    }
}

impl std::error::Error for BrokerFault {}

/// Errors surfaced by transport setup paths that can legitimately fail,
/// such as binding the simulator's loopback listener.
#[derive(Debug)]
pub enum TransportError {
    /// Socket-level failure.
    Io(std::io::Error),
    /// Broker boundary failure.
    Broker(BrokerFault),
    /// Configuration could not be read or parsed.
    Config(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "transport i/o error: {e}"),
            TransportError::Broker(e) => write!(f, "transport broker error: {e}"),
            TransportError::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

impl From<BrokerFault> for TransportError {
    fn from(e: BrokerFault) -> Self {
        TransportError::Broker(e)
    }
}
