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

//! Core traits of the communication layer.
//!
//! [`TransportSession`] is the capability seam over "one concrete binding to
//! a broker": the real out-of-process broker client and the loopback TCP
//! simulator both implement it, and the supervisor is written against the
//! trait, never a concrete session type. [`SessionHandler`] is the callback
//! interface a session owner implements to observe connection, device, and
//! message events.

use std::sync::Arc;

use async_trait::async_trait;

use crate::device::{Application, Device, DeviceApplication, DeviceStatus};

/// Shared reference to a transport session.
pub type SessionRef = Arc<dyn TransportSession>;

/// Connection state of a transport session.
///
/// `Disposed` is terminal: once entered it is unreachable from outside
/// itself and no further callbacks may mutate shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// A connect attempt is in flight.
    Binding,
    /// The broker acknowledged the binding; transacted calls are possible.
    Connected,
    /// Not bound; a (re)connect may follow.
    Disconnected,
    /// Terminal.
    Disposed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Binding => "binding",
            SessionState::Connected => "connected",
            SessionState::Disconnected => "disconnected",
            SessionState::Disposed => "disposed",
        };
        write!(f, "{name}")
    }
}

/// One concrete binding to a broker.
///
/// None of these operations block the calling task beyond the transacted
/// call itself, and none of them surface transport-level failures: a dead
/// binding degrades to neutral defaults and a reconnect cycle.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Short session name for logs.
    fn name(&self) -> &str;

    /// Current connection state.
    fn state(&self) -> SessionState;

    /// Whether the session has been disposed.
    fn is_disposed(&self) -> bool {
        self.state() == SessionState::Disposed
    }

    /// Devices currently reachable through this session.
    async fn connected_devices(&self) -> Vec<Device>;

    /// Devices this session has ever observed on the current connection.
    async fn known_devices(&self) -> Vec<Device>;

    /// Queries a device's status; lookup failures report `Unknown`.
    async fn device_status(&self, device: &Device) -> DeviceStatus;

    /// Requests install info for an application on a device.
    ///
    /// The result arrives asynchronously via
    /// [`SessionHandler::on_application_info`]; lookup failures report
    /// `NotInstalled`.
    async fn retrieve_application_info(&self, device: &Device, app_id: &str, app_name: &str);

    /// Sends an encoded payload to an application on a device.
    ///
    /// Completion arrives asynchronously via
    /// [`SessionHandler::on_send_message`] once the broker reports a
    /// terminal status; retryable failures are handled internally.
    async fn send_message(&self, pair: &DeviceApplication, data: Vec<u8>);

    /// Tears the session down. Terminal and idempotent.
    async fn dispose(&self);
}

/// Callback interface for a [`TransportSession`] owner.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// The session is bound and ready; fired once per connection, before the
    /// per-device notifications.
    async fn on_connect(&self, session: SessionRef);

    /// The session lost its binding. The session's listener registry is
    /// already empty when this fires.
    async fn on_disconnect(&self, session: SessionRef);

    /// A device is connected; fired for every already-connected device when
    /// the session comes up.
    async fn on_connect_device(&self, session: SessionRef, device: Device);

    /// A device went away.
    async fn on_disconnect_device(&self, session: SessionRef, device: Device);

    /// Install info arrived after a `retrieve_application_info` call.
    async fn on_application_info(&self, session: SessionRef, pair: DeviceApplication);

    /// An inbound message arrived from a device application.
    async fn on_receive_message(
        &self,
        session: SessionRef,
        device: Device,
        application: Application,
        data: Vec<u8>,
    );

    /// Terminal status of an earlier send: `None` for success, an error
    /// message otherwise. Retryable failures are invisible here while they
    /// are being retried.
    async fn on_send_message(
        &self,
        session: SessionRef,
        device_id: u64,
        app_id: String,
        error: Option<String>,
    );
}
