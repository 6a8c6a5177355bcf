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

#![forbid(unsafe_code)]
#![forbid(missing_docs)] // Keep this to enforce coverage

//! # Wristlink
//!
//! This crate is the communication layer between a host application and one
//! or more wearable companion devices. All traffic flows through an external
//! broker service reached over an asynchronous, frequently-interrupted
//! transport; a loopback TCP simulator stands in for the broker during
//! development.
//!
//! ## Key Concepts
//!
//! - **Sessions (`TransportSession`)**: One concrete binding to a broker.
//!   Two implementations exist: [`BrokerSession`](transport::BrokerSession)
//!   for the real out-of-process broker and
//!   [`SimulatorSession`](transport::SimulatorSession) for loopback TCP.
//! - **Supervisor (`SessionSupervisor`)**: Owns session lifecycles, restarts
//!   a failed primary session, onboards devices, and dispatches decoded
//!   inbound messages to a single subscriber.
//! - **Application channel (`AppChannel`)**: Per-(device, application) send
//!   bookkeeping: pending-message dedup and bounded retry with linear
//!   backoff.
//! - **Codecs**: A tagged-value codec for arbitrary message payloads
//!   ([`codec::tagged`]) and a delta/zigzag/varint codec for compact integer
//!   time series ([`codec::delta`]).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wristlink::prelude::*;
//!
//! let config = WristlinkConfig::default();
//! let supervisor = SessionSupervisor::start(
//!     config,
//!     Box::new(|| my_broker_connector()),
//!     Box::new(|device| println!("ready: {device}")),
//!     Box::new(|pair, value| println!("{pair}: {value:?}")),
//! );
//! supervisor.send_message(&Value::Str("hello".into())).await;
//! ```

/// Binary codecs for message payloads and time series.
pub mod codec;

/// Runtime configuration loaded from TOML.
pub mod config;

/// Device and application identities plus the known-device registry.
pub mod device;

/// Error types for the transport layer.
pub mod error;

/// Session lifecycle ownership and message dispatch.
pub mod supervisor;

/// Transport sessions: broker boundary, application channel, simulator.
pub mod transport;

/// Core traits: the session capability seam and its callback interface.
pub mod traits;

/// A prelude module for conveniently importing the most commonly used items.
pub mod prelude {
    pub use crate::codec::delta::DeltaEncodedSeries;
    pub use crate::codec::tagged::{deserialize, serialize, Value};
    pub use crate::config::WristlinkConfig;
    pub use crate::device::{
        Application, Device, DeviceApplication, DeviceRegistry, DeviceStatus, InstallStatus,
        PairKey,
    };
    pub use crate::error::{BrokerFault, TransportError};
    pub use crate::supervisor::{ConnectorFactory, DeviceReadyFn, MessageFn, SessionSupervisor};
    pub use crate::transport::{
        AppChannel, BrokerArg, BrokerConnector, BrokerEvent, BrokerHandle, BrokerOp, BrokerReply,
        BrokerSession, ExtraValue, Extras, SendOutcome, SendStatus, SimulatorSession,
    };
    pub use crate::traits::{SessionHandler, SessionState, TransportSession};
}
