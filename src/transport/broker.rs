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

//! The broker boundary and the broker-backed session.
//!
//! [`BrokerHandle`] and [`BrokerConnector`] abstract the external broker
//! service: a connector establishes the binding and feeds [`BrokerEvent`]s
//! back, a handle carries marshalled transacted calls while the binding is
//! live. [`BrokerSession`] is the state machine on top: it correlates
//! asynchronous broadcast replies to their requests by token, drives send
//! retries through an [`AppChannel`], and turns a dead handle into a clean
//! disconnect so the supervisor can start a replacement.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::TransportConfig;
use crate::device::{
    Application, Device, DeviceApplication, DeviceRegistry, DeviceStatus, InstallStatus, PairKey,
};
use crate::error::BrokerFault;
use crate::traits::{SessionHandler, SessionRef, SessionState, TransportSession};
use crate::transport::channel::{AppChannel, SendOutcome, SendStatus};

/// Extras key carrying an application id string.
pub const EXTRA_APPLICATION_ID: &str = "application_id";
/// Extras key carrying an application version int.
pub const EXTRA_APPLICATION_VERSION: &str = "application_version";
/// Extras key carrying the originating device id.
pub const EXTRA_REMOTE_DEVICE: &str = "remote_device";
/// Extras key carrying a message payload.
pub const EXTRA_PAYLOAD: &str = "payload";
/// Extras key carrying a send status code.
pub const EXTRA_STATUS: &str = "status";

/// Operations of the broker's transacted-call interface.
///
/// The full wire vocabulary of the external service; this layer drives a
/// subset of it, but fakes and future callers marshal against the same set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerOp {
    /// Open the application store page for an application.
    OpenStore,
    /// List devices currently connected.
    GetConnectedDevices,
    /// List devices the broker has ever paired.
    GetKnownDevices,
    /// Query the status of one device.
    GetStatus,
    /// Request install info for an application; the reply arrives as a
    /// broadcast correlated by token.
    GetApplicationInfo,
    /// Launch an application on a device.
    OpenApplication,
    /// Send a message to an application on a device.
    SendMessage,
    /// Send an image payload to an application on a device.
    SendImage,
    /// Register for inbound messages from an application.
    RegisterApp,
}

impl BrokerOp {
    /// Wire code of the operation.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            BrokerOp::OpenStore => 1,
            BrokerOp::GetConnectedDevices => 2,
            BrokerOp::GetKnownDevices => 3,
            BrokerOp::GetStatus => 4,
            BrokerOp::GetApplicationInfo => 5,
            BrokerOp::OpenApplication => 6,
            BrokerOp::SendMessage => 7,
            BrokerOp::SendImage => 8,
            BrokerOp::RegisterApp => 9,
        }
    }
}

impl std::fmt::Display for BrokerOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BrokerOp::OpenStore => "OPEN_STORE",
            BrokerOp::GetConnectedDevices => "GET_CONNECTED_DEVICES",
            BrokerOp::GetKnownDevices => "GET_KNOWN_DEVICES",
            BrokerOp::GetStatus => "GET_STATUS",
            BrokerOp::GetApplicationInfo => "GET_APPLICATION_INFO",
            BrokerOp::OpenApplication => "OPEN_APPLICATION",
            BrokerOp::SendMessage => "SEND_MESSAGE",
            BrokerOp::SendImage => "SEND_IMAGE",
            BrokerOp::RegisterApp => "REGISTER_APP",
        };
        write!(f, "{name}")
    }
}

/// One marshalled argument of a transacted call.
///
/// The closed set of variants is the whole wire vocabulary; there is no way
/// to hand the boundary an unmarshallable value.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerArg {
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// UTF-8 string.
    Str(String),
    /// Device record.
    Device {
        /// Device id.
        id: u64,
        /// Device display name.
        name: String,
    },
    /// Application record.
    App {
        /// Application id.
        id: String,
        /// Display name, when known.
        name: Option<String>,
    },
    /// Outbound message record.
    Message {
        /// Encoded payload bytes.
        payload: Vec<u8>,
        /// Package name of the sending side.
        package: String,
        /// Broadcast action the broker reports send status to.
        notify_action: String,
    },
}

/// Reply of a transacted call.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerReply {
    /// No payload (one-way calls and fire-and-forget operations).
    None,
    /// Single integer, e.g. a status code.
    Int(i32),
    /// Device list.
    Devices(Vec<Device>),
}

/// Live handle to a bound broker service.
#[async_trait]
pub trait BrokerHandle: Send + Sync {
    /// Whether the remote end of the binding is still alive.
    fn is_alive(&self) -> bool;

    /// Performs one marshalled call. `oneway` calls return
    /// [`BrokerReply::None`] without waiting for the broker to act.
    async fn transact(
        &self,
        op: BrokerOp,
        args: Vec<BrokerArg>,
        oneway: bool,
    ) -> Result<BrokerReply, BrokerFault>;
}

/// Factory for broker bindings.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Establishes the binding. Connection lifecycle and broadcasts arrive
    /// on `events`; the call returns once the bind attempt is submitted.
    async fn bind(&self, events: mpsc::Sender<BrokerEvent>) -> Result<(), BrokerFault>;

    /// Releases the binding. Idempotent.
    fn unbind(&self);
}

/// Events a [`BrokerConnector`] delivers to its session.
pub enum BrokerEvent {
    /// The binding completed; transacted calls can flow through the handle.
    Connected(Arc<dyn BrokerHandle>),
    /// The binding was lost.
    Disconnected,
    /// An asynchronous broadcast arrived, keyed by its action string.
    Broadcast {
        /// Action string, matched against registered correlation tokens.
        action: String,
        /// Typed key-value payload.
        extras: Extras,
    },
}

impl std::fmt::Debug for BrokerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerEvent::Connected(_) => f.write_str("Connected"),
            BrokerEvent::Disconnected => f.write_str("Disconnected"),
            BrokerEvent::Broadcast { action, .. } => {
                f.debug_struct("Broadcast").field("action", action).finish()
            }
        }
    }
}

/// One value in a broadcast's [`Extras`] payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraValue {
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

/// Typed key-value payload of a broadcast.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extras(HashMap<String, ExtraValue>);

impl Extras {
    /// Creates an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an integer value (builder style).
    #[must_use]
    pub fn with_int(mut self, key: &str, value: i32) -> Self {
        self.0.insert(key.to_string(), ExtraValue::Int(value));
        self
    }

    /// Adds a long value (builder style).
    #[must_use]
    pub fn with_long(mut self, key: &str, value: i64) -> Self {
        self.0.insert(key.to_string(), ExtraValue::Long(value));
        self
    }

    /// Adds a string value (builder style).
    #[must_use]
    pub fn with_str(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), ExtraValue::Str(value.into()));
        self
    }

    /// Adds a byte-array value (builder style).
    #[must_use]
    pub fn with_bytes(mut self, key: &str, value: Vec<u8>) -> Self {
        self.0.insert(key.to_string(), ExtraValue::Bytes(value));
        self
    }

    /// Integer value for `key`, if present with that type.
    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.0.get(key) {
            Some(ExtraValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Long value for `key`, if present with that type.
    #[must_use]
    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.0.get(key) {
            Some(ExtraValue::Long(v)) => Some(*v),
            _ => None,
        }
    }

    /// String value for `key`, if present with that type.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(ExtraValue::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Byte-array value for `key`, if present with that type.
    #[must_use]
    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        match self.0.get(key) {
            Some(ExtraValue::Bytes(v)) => Some(v.as_slice()),
            _ => None,
        }
    }
}

/// What a registered correlation token resolves to.
#[derive(Debug, Clone)]
enum Listener {
    /// One-shot application-info reply for one (device, app) request.
    AppInfo { device: Device, app_id: String },
    /// Persistent inbound-message listener for one application.
    Messages { app_id: String },
    /// Persistent send-status listener for the whole session.
    SendStatus,
}

/// The broker-backed transport session.
///
/// Lives as long as one binding: a disconnect ends the session, and the
/// supervisor replaces it with a freshly started one. All callbacks into the
/// owning [`SessionHandler`] run on the session's event task or on a retry
/// task, never concurrently for the same broadcast.
pub struct BrokerSession {
    weak: Weak<BrokerSession>,
    connector: Arc<dyn BrokerConnector>,
    handler: Arc<dyn SessionHandler>,
    state: Mutex<SessionState>,
    handle: Mutex<Option<Arc<dyn BrokerHandle>>>,
    listeners: DashMap<String, Listener>,
    app_names: DashMap<String, String>,
    known: DeviceRegistry,
    channel: AppChannel,
    cancel: CancellationToken,
    namespace: String,
    package: String,
    send_action: String,
}

impl BrokerSession {
    /// Starts a session: binds through `connector` and runs the event loop
    /// on a background task until disconnect or dispose.
    pub fn start(
        config: &TransportConfig,
        connector: Arc<dyn BrokerConnector>,
        handler: Arc<dyn SessionHandler>,
    ) -> Arc<Self> {
        let session = Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            connector,
            handler,
            state: Mutex::new(SessionState::Binding),
            handle: Mutex::new(None),
            listeners: DashMap::new(),
            app_names: DashMap::new(),
            known: DeviceRegistry::new(),
            channel: AppChannel::new(config.retry_wait(), config.retry_limit),
            cancel: CancellationToken::new(),
            namespace: config.namespace.clone(),
            package: config.package.clone(),
            send_action: format!("{}.SEND_MESSAGE", config.namespace),
        });
        tokio::spawn(Arc::clone(&session).run());
        session
    }

    /// Number of registered broadcast listeners. Drops to zero on
    /// disconnect before the owner is notified.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Sends dropped at the retry ceiling on this session.
    #[must_use]
    pub fn dropped_sends(&self) -> u64 {
        self.channel.dropped_sends()
    }

    async fn run(self: Arc<Self>) {
        self.listeners
            .insert(self.send_action.clone(), Listener::SendStatus);

        let (tx, mut rx) = mpsc::channel(64);
        if let Err(fault) = self.connector.bind(tx).await {
            error!("broker bind failed: {fault}");
            self.handle_disconnect().await;
            return;
        }

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(BrokerEvent::Connected(handle)) => self.handle_connected(handle).await,
                    Some(BrokerEvent::Broadcast { action, extras }) => {
                        self.dispatch_broadcast(&action, &extras).await;
                    }
                    Some(BrokerEvent::Disconnected) | None => {
                        self.handle_disconnect().await;
                        break;
                    }
                },
            }
        }
    }

    #[instrument(skip(self, handle))]
    async fn handle_connected(&self, handle: Arc<dyn BrokerHandle>) {
        let was_connected = {
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state == SessionState::Disposed {
                return;
            }
            let previous = *state;
            *state = SessionState::Connected;
            previous == SessionState::Connected
        };
        *self.handle.lock().expect("handle lock poisoned") = Some(handle);

        // Known and connected devices are queried exactly once per
        // connection; everything after arrives as broadcasts.
        self.load_known_devices().await;
        let connected = self.connected_devices().await;
        info!(
            "broker session up: {} known, {} connected",
            self.known.len(),
            connected.len()
        );

        let Some(session) = self.as_session() else {
            return;
        };
        if !was_connected {
            self.handler.on_connect(Arc::clone(&session)).await;
        }
        for device in connected {
            self.handler
                .on_connect_device(Arc::clone(&session), device)
                .await;
        }
    }

    /// Full teardown of a lost binding. Idempotent: only the first call
    /// after a connect performs the transition and notification.
    #[instrument(skip(self))]
    async fn handle_disconnect(&self) {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            match *state {
                SessionState::Disposed | SessionState::Disconnected => return,
                _ => *state = SessionState::Disconnected,
            }
        }
        *self.handle.lock().expect("handle lock poisoned") = None;
        self.listeners.clear();
        self.channel.clear_registrations();
        self.known.clear();
        self.cancel.cancel();
        info!("broker session disconnected");
        if let Some(session) = self.as_session() {
            self.handler.on_disconnect(session).await;
        }
    }

    /// Disconnect triggered from inside a transacted call on a dead handle.
    ///
    /// While still `Binding` there is nothing to tear down, so the call is
    /// a no-op; the pending bind resolves the state on its own.
    async fn implicit_disconnect(&self) {
        {
            let state = self.state.lock().expect("state lock poisoned");
            if *state == SessionState::Binding {
                return;
            }
        }
        self.handle_disconnect().await;
    }

    async fn load_known_devices(&self) {
        if let Some(BrokerReply::Devices(devices)) =
            self.transact(BrokerOp::GetKnownDevices, Vec::new(), false).await
        {
            for device in devices {
                self.known.insert(device);
            }
        }
    }

    async fn dispatch_broadcast(&self, action: &str, extras: &Extras) {
        let Some(listener) = self.listeners.get(action).map(|l| l.value().clone()) else {
            trace!("unmatched broadcast '{action}'");
            return;
        };
        match listener {
            Listener::AppInfo { device, app_id } => {
                self.listeners.remove(action);
                self.handle_application_info(device, &app_id, extras).await;
            }
            Listener::Messages { app_id } => {
                self.handle_inbound_message(&app_id, extras).await;
            }
            Listener::SendStatus => {
                self.handle_send_status(extras).await;
            }
        }
    }

    async fn handle_application_info(&self, device: Device, requested_id: &str, extras: &Extras) {
        let id = extras
            .get_str(EXTRA_APPLICATION_ID)
            .map(str::to_lowercase)
            .filter(|id| !id.is_empty());
        let version = extras.get_int(EXTRA_APPLICATION_VERSION).unwrap_or(-1);
        let name = id
            .as_deref()
            .and_then(|id| self.app_names.get(id).map(|n| n.value().clone()));
        let application = Application::from_lookup(id, name, version);
        debug!(
            "application info for {requested_id} on {device}: {:?} v{}",
            application.status, application.version
        );

        if application.status == InstallStatus::Installed {
            self.register_for_messages(&application.id).await;
        }
        if let Some(session) = self.as_session() {
            self.handler
                .on_application_info(session, DeviceApplication::new(device, application))
                .await;
        }
    }

    async fn handle_inbound_message(&self, app_id: &str, extras: &Extras) {
        let device_id = extras.get_long(EXTRA_REMOTE_DEVICE);
        let payload = extras.get_bytes(EXTRA_PAYLOAD);
        let (Some(device_id), Some(payload)) = (device_id, payload) else {
            warn!("inbound message for {app_id} lacks device or payload");
            return;
        };
        let device_id = device_id as u64;
        let device = self.known.get_or_placeholder(device_id);
        let name = self.app_names.get(app_id).map(|n| n.value().clone());
        let application = Application::new(app_id, name, InstallStatus::Installed, 0);
        if let Some(session) = self.as_session() {
            self.handler
                .on_receive_message(session, device, application, payload.to_vec())
                .await;
        }
    }

    async fn handle_send_status(&self, extras: &Extras) {
        let device_id = extras.get_long(EXTRA_REMOTE_DEVICE);
        // Application ids are case-insensitive on the wire; pending keys are
        // lowercase, so the reported id must be folded to match.
        let app_id = extras.get_str(EXTRA_APPLICATION_ID).map(str::to_lowercase);
        let (Some(device_id), Some(app_id)) = (device_id, app_id) else {
            warn!("send status broadcast lacks device or application id");
            return;
        };
        let device_id = device_id as u64;
        let status = SendStatus::from_code(extras.get_int(EXTRA_STATUS).unwrap_or(1));
        let key = PairKey::new(device_id, app_id);

        match self.channel.complete(&key, status) {
            SendOutcome::Completed { error } => {
                if let Some(session) = self.as_session() {
                    self.handler
                        .on_send_message(session, device_id, key.app_id, error)
                        .await;
                }
            }
            SendOutcome::Retry { delay, generation } => {
                debug!("send to {key} got '{status}', retrying in {delay:?}");
                self.schedule_retry(key, delay, generation);
            }
            SendOutcome::Dropped | SendOutcome::Unmatched => {}
        }
    }

    fn schedule_retry(&self, key: PairKey, delay: std::time::Duration, generation: u8) {
        let weak = self.weak.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            let Some(session) = weak.upgrade() else {
                return;
            };
            if let Some(payload) = session.channel.retry_send(&key, generation) {
                session.transmit(&key, payload).await;
            }
        });
    }

    /// Opens the broker's store page for an application, for install
    /// prompts.
    pub async fn open_store(&self, app_id: &str) {
        self.transact(
            BrokerOp::OpenStore,
            vec![BrokerArg::Str(app_id.to_string())],
            false,
        )
        .await;
    }

    /// Launches an application on a device.
    pub async fn open_application(&self, device: &Device, app_id: &str) {
        let name = self
            .app_names
            .get(&app_id.to_lowercase())
            .map(|n| n.value().clone());
        self.transact(
            BrokerOp::OpenApplication,
            vec![
                BrokerArg::Device {
                    id: device.id,
                    name: device.name.clone(),
                },
                BrokerArg::App {
                    id: app_id.to_string(),
                    name,
                },
            ],
            false,
        )
        .await;
    }

    /// Registers the inbound-message listener for an application, once per
    /// connection.
    async fn register_for_messages(&self, app_id: &str) {
        if !self.channel.register(app_id) {
            return;
        }
        let token = format!("{}.ON_MESSAGE_{app_id}", self.namespace);
        self.listeners.insert(
            token.clone(),
            Listener::Messages {
                app_id: app_id.to_string(),
            },
        );
        let name = self.app_names.get(app_id).map(|n| n.value().clone());
        self.transact(
            BrokerOp::RegisterApp,
            vec![
                BrokerArg::App {
                    id: app_id.to_string(),
                    name,
                },
                BrokerArg::Str(token),
                BrokerArg::Str(self.package.clone()),
            ],
            false,
        )
        .await;
    }

    async fn transmit(&self, key: &PairKey, payload: Vec<u8>) {
        let device = self.known.get_or_placeholder(key.device_id);
        let name = self.app_names.get(&key.app_id).map(|n| n.value().clone());
        debug!("transmitting {} bytes to {key}", payload.len());
        self.transact(
            BrokerOp::SendMessage,
            vec![
                BrokerArg::Message {
                    payload,
                    package: self.package.clone(),
                    notify_action: self.send_action.clone(),
                },
                BrokerArg::Device {
                    id: device.id,
                    name: device.name,
                },
                BrokerArg::App {
                    id: key.app_id.clone(),
                    name,
                },
            ],
            false,
        )
        .await;
    }

    /// Runs one transacted call, degrading failures to `None`.
    ///
    /// A dead or missing handle additionally triggers the implicit
    /// disconnect path, unless the session is still binding.
    async fn transact(
        &self,
        op: BrokerOp,
        args: Vec<BrokerArg>,
        oneway: bool,
    ) -> Option<BrokerReply> {
        let handle = self
            .handle
            .lock()
            .expect("handle lock poisoned")
            .as_ref()
            .map(Arc::clone);
        let Some(handle) = handle.filter(|h| h.is_alive()) else {
            let state = *self.state.lock().expect("state lock poisoned");
            warn!("broker handle not live for {op} in state {state}");
            self.implicit_disconnect().await;
            return None;
        };
        match handle.transact(op, args, oneway).await {
            Ok(reply) => {
                trace!("{op} completed");
                Some(reply)
            }
            Err(BrokerFault::Dead) => {
                warn!("broker handle died during {op}");
                self.implicit_disconnect().await;
                None
            }
            Err(fault) => {
                error!("{op} failed: {fault}");
                None
            }
        }
    }

    fn as_session(&self) -> Option<SessionRef> {
        self.weak.upgrade().map(|arc| arc as SessionRef)
    }
}

#[async_trait]
impl TransportSession for BrokerSession {
    fn name(&self) -> &str {
        "broker"
    }

    fn state(&self) -> SessionState {
        *self.state.lock().expect("state lock poisoned")
    }

    async fn connected_devices(&self) -> Vec<Device> {
        match self
            .transact(BrokerOp::GetConnectedDevices, Vec::new(), false)
            .await
        {
            Some(BrokerReply::Devices(devices)) => {
                for device in &devices {
                    self.known.insert(device.clone());
                }
                devices
            }
            _ => Vec::new(),
        }
    }

    async fn known_devices(&self) -> Vec<Device> {
        self.known.devices()
    }

    async fn device_status(&self, device: &Device) -> DeviceStatus {
        match self
            .transact(
                BrokerOp::GetStatus,
                vec![BrokerArg::Device {
                    id: device.id,
                    name: device.name.clone(),
                }],
                false,
            )
            .await
        {
            Some(BrokerReply::Int(code)) => DeviceStatus::from_code(code),
            _ => DeviceStatus::Unknown,
        }
    }

    async fn retrieve_application_info(&self, device: &Device, app_id: &str, app_name: &str) {
        // Names are keyed by the lowercased id, matching every lookup path.
        self.app_names
            .insert(app_id.to_lowercase(), app_name.to_string());
        let token = format!(
            "{}.APPLICATION_INFO_{}_{app_id}",
            self.namespace, device.id
        );
        self.listeners.insert(
            token.clone(),
            Listener::AppInfo {
                device: device.clone(),
                app_id: app_id.to_string(),
            },
        );
        let sent = self
            .transact(
                BrokerOp::GetApplicationInfo,
                vec![
                    BrokerArg::Str(self.package.clone()),
                    BrokerArg::Str(token.clone()),
                    BrokerArg::Device {
                        id: device.id,
                        name: device.name.clone(),
                    },
                    BrokerArg::Str(app_id.to_string()),
                ],
                true,
            )
            .await;

        // A lookup that cannot even be submitted still answers, as "not
        // installed", so device onboarding always completes.
        if sent.is_none() {
            self.listeners.remove(&token);
            let application = Application::from_lookup(None, None, -1);
            if let Some(session) = self.as_session() {
                self.handler
                    .on_application_info(
                        session,
                        DeviceApplication::new(device.clone(), application),
                    )
                    .await;
            }
        }
    }

    async fn send_message(&self, pair: &DeviceApplication, data: Vec<u8>) {
        // Keyed lowercase so a status report matches whatever casing the
        // caller or the broker uses for the same application.
        let key = PairKey::new(pair.device.id, pair.application.id.to_lowercase());
        self.known.insert(pair.device.clone());
        self.channel.fresh_send(key.clone(), data.clone());
        self.transmit(&key, data).await;
    }

    async fn dispose(&self) {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state == SessionState::Disposed {
                return;
            }
            *state = SessionState::Disposed;
        }
        info!("disposing broker session");
        self.cancel.cancel();
        self.listeners.clear();
        self.channel.clear();
        self.known.clear();
        *self.handle.lock().expect("handle lock poisoned") = None;
        self.connector.unbind();
    }
}
