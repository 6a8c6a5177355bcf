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

//! Session lifecycle ownership and message dispatch.
//!
//! [`SessionSupervisor`] owns every [`TransportSession`]: it starts the
//! primary broker session (and the simulator when enabled), replaces the
//! primary with a fresh one whenever it disconnects, onboards devices by
//! probing every configured application, and fans decoded inbound messages
//! out to a single subscriber. Outbound broadcasts go to every
//! (device, application) pair that is both installed and currently
//! connected.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::codec::tagged::{deserialize, serialize, Value};
use crate::config::WristlinkConfig;
use crate::device::{Application, Device, DeviceApplication, PairKey};
use crate::traits::{SessionHandler, SessionRef, TransportSession};
use crate::transport::broker::{BrokerConnector, BrokerSession};
use crate::transport::simulator::SimulatorSession;

/// Callback invoked once a device has answered every application probe.
pub type DeviceReadyFn = Box<dyn Fn(Device) + Send + Sync>;

/// Callback invoked for every decoded inbound message.
pub type MessageFn = Box<dyn Fn(DeviceApplication, Value) + Send + Sync>;

/// Factory producing a broker connector for each (re)started primary
/// session.
pub type ConnectorFactory = Box<dyn Fn() -> Arc<dyn BrokerConnector> + Send + Sync>;

struct SessionEntry {
    primary: bool,
    session: SessionRef,
}

struct DeviceInfo {
    device: Device,
    pending_probes: AtomicIsize,
}

struct InstalledPair {
    session: SessionRef,
    pair: DeviceApplication,
}

/// Owner of all transport sessions.
pub struct SessionSupervisor {
    weak: Weak<SessionSupervisor>,
    config: WristlinkConfig,
    connector_factory: ConnectorFactory,
    on_device_ready: DeviceReadyFn,
    on_message: MessageFn,
    sessions: Mutex<Vec<SessionEntry>>,
    devices: DashMap<u64, Arc<DeviceInfo>>,
    installed: Mutex<HashMap<PairKey, InstalledPair>>,
    app_names: HashMap<String, String>,
    disposed: AtomicBool,
}

impl SessionSupervisor {
    /// Starts the supervisor: brings up the primary broker session
    /// immediately and, when enabled, the loopback simulator.
    pub fn start(
        config: WristlinkConfig,
        connector_factory: ConnectorFactory,
        on_device_ready: DeviceReadyFn,
        on_message: MessageFn,
    ) -> Arc<Self> {
        let mut app_names = config.applications.clone();
        if config.simulator.enabled {
            app_names.insert(
                config.simulator.application_id.clone(),
                config.simulator.application_name.clone(),
            );
        }

        let supervisor = Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            config,
            connector_factory,
            on_device_ready,
            on_message,
            sessions: Mutex::new(Vec::new()),
            devices: DashMap::new(),
            installed: Mutex::new(HashMap::new()),
            app_names,
            disposed: AtomicBool::new(false),
        });
        supervisor.start_primary();
        if supervisor.config.simulator.enabled {
            let sup = Arc::clone(&supervisor);
            tokio::spawn(async move { sup.start_simulator().await });
        }
        supervisor
    }

    fn start_primary(&self) {
        let Some(this) = self.weak.upgrade() else {
            return;
        };
        let connector = (self.connector_factory)();
        let handler = this as Arc<dyn SessionHandler>;
        let session = BrokerSession::start(&self.config.transport, connector, handler);
        info!("started primary session");
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .push(SessionEntry {
                primary: true,
                session,
            });
    }

    async fn start_simulator(self: Arc<Self>) {
        let handler = Arc::clone(&self) as Arc<dyn SessionHandler>;
        match SimulatorSession::start(self.config.simulator.clone(), handler).await {
            Ok(session) => {
                self.sessions
                    .lock()
                    .expect("sessions lock poisoned")
                    .push(SessionEntry {
                        primary: false,
                        session,
                    });
            }
            Err(e) => error!("simulator failed to start: {e}"),
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Handles to the currently running sessions.
    #[must_use]
    pub fn sessions(&self) -> Vec<SessionRef> {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .iter()
            .map(|e| Arc::clone(&e.session))
            .collect()
    }

    /// Every pair confirmed installed, with the session that reported it.
    fn installed_snapshot(&self) -> Vec<(SessionRef, DeviceApplication)> {
        self.installed
            .lock()
            .expect("installed map poisoned")
            .values()
            .map(|p| (Arc::clone(&p.session), p.pair.clone()))
            .collect()
    }

    /// Devices ids currently connected across all sessions.
    async fn connected_device_ids(&self) -> HashSet<u64> {
        let sessions = self.sessions();
        let device_lists = join_all(sessions.iter().map(|s| s.connected_devices())).await;
        device_lists
            .into_iter()
            .flatten()
            .map(|d| d.id)
            .collect()
    }

    /// Broadcasts a message to every installed pair whose device is
    /// currently connected.
    ///
    /// Returns the number of pairs the message was handed to.
    pub async fn send_message(&self, value: &Value) -> usize {
        let data = serialize(value);
        let connected = self.connected_device_ids().await;
        let targets: Vec<_> = self
            .installed_snapshot()
            .into_iter()
            .filter(|(_, pair)| connected.contains(&pair.device.id))
            .collect();
        if targets.is_empty() {
            warn!("no connected installed pair to send to");
            return 0;
        }
        let count = targets.len();
        join_all(
            targets
                .into_iter()
                .map(|(session, pair)| send_on(session, pair, data.clone())),
        )
        .await;
        count
    }

    /// Sends a message to every installed pair on one device.
    pub async fn send_message_to_device(&self, device_id: u64, value: &Value) -> usize {
        let data = serialize(value);
        let targets: Vec<_> = self
            .installed_snapshot()
            .into_iter()
            .filter(|(_, pair)| pair.device.id == device_id)
            .collect();
        let count = targets.len();
        join_all(
            targets
                .into_iter()
                .map(|(session, pair)| send_on(session, pair, data.clone())),
        )
        .await;
        count
    }

    /// Sends a message to one installed pair.
    pub async fn send_message_to_pair(&self, key: &PairKey, value: &Value) {
        let target = {
            let installed = self.installed.lock().expect("installed map poisoned");
            installed
                .get(key)
                .map(|p| (Arc::clone(&p.session), p.pair.clone()))
        };
        match target {
            Some((session, pair)) => send_on(session, pair, serialize(value)).await,
            None => warn!("no installed pair for {key}"),
        }
    }

    /// Names of the currently running sessions.
    #[must_use]
    pub fn session_names(&self) -> Vec<String> {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .iter()
            .map(|e| e.session.name().to_string())
            .collect()
    }

    /// Devices known across all sessions.
    pub async fn known_devices(&self) -> Vec<Device> {
        let sessions = self.sessions();
        let lists = join_all(sessions.iter().map(|s| s.known_devices())).await;
        let mut seen = HashSet::new();
        lists
            .into_iter()
            .flatten()
            .filter(|d| seen.insert(d.id))
            .collect()
    }

    /// Tears down every session. Terminal and idempotent.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("disposing supervisor");
        let entries: Vec<_> = {
            let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
            sessions.drain(..).map(|e| e.session).collect()
        };
        join_all(entries.iter().map(|s| s.dispose())).await;
        self.devices.clear();
        self.installed.lock().expect("installed map poisoned").clear();
    }
}

async fn send_on(session: SessionRef, pair: DeviceApplication, data: Vec<u8>) {
    debug!("sending {} bytes to {pair}", data.len());
    session.send_message(&pair, data).await;
}

#[async_trait]
impl SessionHandler for SessionSupervisor {
    async fn on_connect(&self, session: SessionRef) {
        info!("session '{}' connected", session.name());
    }

    async fn on_disconnect(&self, session: SessionRef) {
        if self.is_disposed() {
            return;
        }
        let removed = {
            let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
            let position = sessions
                .iter()
                .position(|e| Arc::ptr_eq(&e.session, &session));
            position.map(|i| sessions.remove(i))
        };
        let Some(entry) = removed else {
            return;
        };
        info!(
            "session '{}' disconnected (primary: {})",
            session.name(),
            entry.primary
        );

        // Pairs registered through the dead session cannot route anymore.
        self.installed
            .lock()
            .expect("installed map poisoned")
            .retain(|_, p| !Arc::ptr_eq(&p.session, &session));

        entry.session.dispose().await;
        if entry.primary && !self.is_disposed() {
            self.start_primary();
        }
    }

    async fn on_connect_device(&self, session: SessionRef, device: Device) {
        if self.is_disposed() {
            return;
        }
        let status = session.device_status(&device).await;
        info!("device {device} connected ({status:?})");
        self.devices.insert(
            device.id,
            Arc::new(DeviceInfo {
                device: device.clone(),
                pending_probes: AtomicIsize::new(self.app_names.len() as isize),
            }),
        );
        for (app_id, app_name) in &self.app_names {
            session
                .retrieve_application_info(&device, app_id, app_name)
                .await;
        }
    }

    async fn on_disconnect_device(&self, _session: SessionRef, device: Device) {
        info!("device {device} disconnected");
        self.devices.remove(&device.id);
        self.installed
            .lock()
            .expect("installed map poisoned")
            .retain(|key, _| key.device_id != device.id);
    }

    async fn on_application_info(&self, session: SessionRef, pair: DeviceApplication) {
        if self.is_disposed() {
            return;
        }
        if pair.is_installed() {
            info!("adding installed pair {pair}");
            self.installed
                .lock()
                .expect("installed map poisoned")
                .insert(
                    pair.key(),
                    InstalledPair {
                        session,
                        pair: pair.clone(),
                    },
                );
        } else {
            debug!("{} not installed on {}", pair.application, pair.device);
        }

        // A device is ready once every configured application answered.
        let info = self.devices.get(&pair.device.id).map(|i| Arc::clone(i.value()));
        if let Some(info) = info {
            if info.pending_probes.fetch_sub(1, Ordering::SeqCst) == 1 {
                info!("device {} ready", info.device);
                (self.on_device_ready)(info.device.clone());
            }
        }
    }

    async fn on_receive_message(
        &self,
        session: SessionRef,
        device: Device,
        application: Application,
        data: Vec<u8>,
    ) {
        if self.is_disposed() {
            return;
        }
        let pair = DeviceApplication::new(device, application);

        // A device talking to us proves the pair is installed even if the
        // info probe has not answered yet.
        {
            let mut installed = self.installed.lock().expect("installed map poisoned");
            installed.entry(pair.key()).or_insert_with(|| InstalledPair {
                session,
                pair: pair.clone(),
            });
        }

        match deserialize(&data) {
            Some(value) => {
                debug!("received {} bytes from {pair}", data.len());
                (self.on_message)(pair, value);
            }
            None => warn!("undecodable {}-byte message from {pair}", data.len()),
        }
    }

    async fn on_send_message(
        &self,
        _session: SessionRef,
        device_id: u64,
        app_id: String,
        error: Option<String>,
    ) {
        let device = self
            .devices
            .get(&device_id)
            .map(|i| i.device.clone())
            .unwrap_or_else(|| Device::placeholder(device_id));
        match error {
            None => debug!("send to {device}:{app_id} OK"),
            Some(e) => warn!("send to {device}:{app_id} failed: {e}"),
        }
    }
}
