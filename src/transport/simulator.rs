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

//! Loopback TCP simulator session.
//!
//! Stands in for the broker during development: every TCP connection
//! accepted on the loopback listener becomes one simulated device with a
//! fresh ephemeral id, reporting exactly one installed application. Raw
//! socket payloads pass through unmodified in both directions, so a device
//! emulator on the other end talks the same encoded-message format as a
//! real device.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SimulatorConfig;
use crate::device::{Application, Device, DeviceApplication, DeviceStatus, InstallStatus};
use crate::error::TransportError;
use crate::traits::{SessionHandler, SessionRef, SessionState, TransportSession};

const READ_BUFFER_SIZE: usize = 16 * 1024;

struct SimConnection {
    device: Device,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
}

/// Transport session backed by a loopback TCP listener.
pub struct SimulatorSession {
    weak: Weak<SimulatorSession>,
    config: SimulatorConfig,
    handler: Arc<dyn SessionHandler>,
    connections: DashMap<u64, Arc<SimConnection>>,
    next_device_id: AtomicU64,
    local_addr: SocketAddr,
    state: Mutex<SessionState>,
    listener: Mutex<Option<TcpListener>>,
    cancel: CancellationToken,
}

impl SimulatorSession {
    /// Binds the loopback listener and starts the accept loop. Fails only
    /// when the port cannot be bound.
    pub async fn start(
        config: SimulatorConfig,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<Arc<Self>, TransportError> {
        let listener = TcpListener::bind(("127.0.0.1", config.port)).await?;
        let local_addr = listener.local_addr()?;
        info!("simulator listening on {local_addr}");

        let session = Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            config,
            handler,
            connections: DashMap::new(),
            next_device_id: AtomicU64::new(1),
            local_addr,
            state: Mutex::new(SessionState::Connected),
            listener: Mutex::new(Some(listener)),
            cancel: CancellationToken::new(),
        });
        tokio::spawn(Arc::clone(&session).run());
        Ok(session)
    }

    /// Address the simulator is listening on; useful with port 0.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The one application every simulated device carries.
    fn sim_application(&self) -> Application {
        Application::new(
            self.config.application_id.clone(),
            Some(self.config.application_name.clone()),
            InstallStatus::Installed,
            1,
        )
    }

    async fn run(self: Arc<Self>) {
        if let Some(session) = self.as_session() {
            self.handler.on_connect(session).await;
        }

        let listener = self
            .listener
            .lock()
            .expect("listener lock poisoned")
            .take();
        let Some(listener) = listener else {
            return;
        };

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.accept_connection(stream, peer).await,
                    Err(e) => {
                        warn!("simulator accept failed: {e}");
                    }
                },
            }
        }

        if let Some(session) = self.as_session() {
            self.handler.on_disconnect(session).await;
        }
    }

    #[instrument(skip(self, stream))]
    async fn accept_connection(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let id = self.next_device_id.fetch_add(1, Ordering::Relaxed);
        let device = Device::new(id, format!("sim@{peer}"));
        info!("simulator accepted {device}");

        let (reader, writer) = stream.into_split();
        self.connections.insert(
            id,
            Arc::new(SimConnection {
                device: device.clone(),
                writer: tokio::sync::Mutex::new(writer),
            }),
        );
        if let Some(session) = self.as_session() {
            self.handler
                .on_connect_device(session, device.clone())
                .await;
        }

        let weak = self.weak.clone();
        tokio::spawn(async move {
            if let Some(session) = weak.upgrade() {
                session.read_loop(reader, device).await;
            }
        });
    }

    async fn read_loop(self: Arc<Self>, mut reader: OwnedReadHalf, device: Device) {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let read = tokio::select! {
                () = self.cancel.cancelled() => break,
                read = reader.read(&mut buf) => read,
            };
            match read {
                Ok(0) => break,
                Ok(n) => {
                    debug!("simulator received {n} bytes from {device}");
                    if let Some(session) = self.as_session() {
                        self.handler
                            .on_receive_message(
                                session,
                                device.clone(),
                                self.sim_application(),
                                buf[..n].to_vec(),
                            )
                            .await;
                    }
                }
                Err(e) => {
                    warn!("simulator read from {device} failed: {e}");
                    break;
                }
            }
        }
        self.drop_connection(&device).await;
    }

    async fn drop_connection(&self, device: &Device) {
        if self.connections.remove(&device.id).is_some() {
            info!("simulator lost {device}");
            if let Some(session) = self.as_session() {
                self.handler
                    .on_disconnect_device(session, device.clone())
                    .await;
            }
        }
    }

    fn as_session(&self) -> Option<SessionRef> {
        self.weak.upgrade().map(|arc| arc as SessionRef)
    }
}

#[async_trait]
impl TransportSession for SimulatorSession {
    fn name(&self) -> &str {
        "sim"
    }

    fn state(&self) -> SessionState {
        *self.state.lock().expect("state lock poisoned")
    }

    async fn connected_devices(&self) -> Vec<Device> {
        self.connections
            .iter()
            .map(|c| c.device.clone())
            .collect()
    }

    async fn known_devices(&self) -> Vec<Device> {
        self.connected_devices().await
    }

    async fn device_status(&self, device: &Device) -> DeviceStatus {
        if self.connections.contains_key(&device.id) {
            DeviceStatus::Connected
        } else {
            DeviceStatus::NotConnected
        }
    }

    async fn retrieve_application_info(&self, device: &Device, app_id: &str, _app_name: &str) {
        // Always answers, so device onboarding completes even for ids the
        // simulator does not carry.
        let application = if app_id == self.config.application_id {
            self.sim_application()
        } else {
            Application::new(app_id, None, InstallStatus::NotInstalled, -1)
        };
        if let Some(session) = self.as_session() {
            self.handler
                .on_application_info(
                    session,
                    DeviceApplication::new(device.clone(), application),
                )
                .await;
        }
    }

    async fn send_message(&self, pair: &DeviceApplication, data: Vec<u8>) {
        let Some(connection) = self
            .connections
            .get(&pair.device.id)
            .map(|c| Arc::clone(c.value()))
        else {
            warn!("simulator send to unknown {}", pair.device);
            return;
        };
        let result = {
            let mut writer = connection.writer.lock().await;
            match writer.write_all(&data).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = result {
            error!("simulator send to {} failed: {e}", pair.device);
            self.drop_connection(&pair.device).await;
        }
    }

    async fn dispose(&self) {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state == SessionState::Disposed {
                return;
            }
            *state = SessionState::Disposed;
        }
        info!("disposing simulator session");
        self.cancel.cancel();
        self.connections.clear();
    }
}
