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

//! In-memory broker fakes and a recording session handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use wristlink::prelude::*;

/// Scripted stand-in for the external broker service.
///
/// Cloning shares state, so a clone handed to a session (or a connector
/// factory) stays scriptable from the test body.
#[derive(Clone)]
pub struct FakeBroker {
    inner: Arc<FakeBrokerState>,
}

pub struct FakeBrokerState {
    events: Mutex<Option<mpsc::Sender<BrokerEvent>>>,
    calls: Mutex<Vec<(BrokerOp, Vec<BrokerArg>)>>,
    alive: AtomicBool,
    connected: Mutex<Vec<Device>>,
    known: Mutex<Vec<Device>>,
    statuses: Mutex<HashMap<u64, i32>>,
    binds: AtomicUsize,
    unbinds: AtomicUsize,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FakeBrokerState {
                events: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
                alive: AtomicBool::new(true),
                connected: Mutex::new(Vec::new()),
                known: Mutex::new(Vec::new()),
                statuses: Mutex::new(HashMap::new()),
                binds: AtomicUsize::new(0),
                unbinds: AtomicUsize::new(0),
            }),
        }
    }

    /// Scripts a device as paired and currently connected.
    pub fn add_connected_device(&self, device: Device) {
        self.inner.statuses.lock().unwrap().insert(device.id, 2);
        self.inner.known.lock().unwrap().push(device.clone());
        self.inner.connected.lock().unwrap().push(device);
    }

    pub fn bind_count(&self) -> usize {
        self.inner.binds.load(Ordering::SeqCst)
    }

    pub fn unbind_count(&self) -> usize {
        self.inner.unbinds.load(Ordering::SeqCst)
    }

    /// All transacted calls of one operation, oldest first.
    pub fn calls_of(&self, op: BrokerOp) -> Vec<Vec<BrokerArg>> {
        self.inner
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, args)| args.clone())
            .collect()
    }

    /// Marks the handle dead; the next transacted call observes it.
    pub fn kill_handle(&self) {
        self.inner.alive.store(false, Ordering::SeqCst);
    }

    async fn send(&self, event: BrokerEvent) {
        let sender = self.inner.events.lock().unwrap().clone();
        let sender = sender.expect("session not bound yet");
        sender.send(event).await.expect("session event queue closed");
    }

    /// Completes the binding, handing the session a live handle.
    pub async fn connect(&self) {
        self.inner.alive.store(true, Ordering::SeqCst);
        let handle: Arc<dyn BrokerHandle> = Arc::new(FakeHandle {
            inner: Arc::clone(&self.inner),
        });
        self.send(BrokerEvent::Connected(handle)).await;
    }

    /// Reports the binding lost.
    pub async fn disconnect(&self) {
        self.send(BrokerEvent::Disconnected).await;
    }

    /// Delivers a broadcast to the session.
    pub async fn broadcast(&self, action: &str, extras: Extras) {
        self.send(BrokerEvent::Broadcast {
            action: action.to_string(),
            extras,
        })
        .await;
    }
}

#[async_trait]
impl BrokerConnector for FakeBroker {
    async fn bind(&self, events: mpsc::Sender<BrokerEvent>) -> Result<(), BrokerFault> {
        self.inner.binds.fetch_add(1, Ordering::SeqCst);
        *self.inner.events.lock().unwrap() = Some(events);
        Ok(())
    }

    fn unbind(&self) {
        self.inner.unbinds.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeHandle {
    inner: Arc<FakeBrokerState>,
}

#[async_trait]
impl BrokerHandle for FakeHandle {
    fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    async fn transact(
        &self,
        op: BrokerOp,
        args: Vec<BrokerArg>,
        _oneway: bool,
    ) -> Result<BrokerReply, BrokerFault> {
        if !self.is_alive() {
            return Err(BrokerFault::Dead);
        }
        self.inner.calls.lock().unwrap().push((op, args.clone()));
        match op {
            BrokerOp::GetConnectedDevices => {
                Ok(BrokerReply::Devices(self.inner.connected.lock().unwrap().clone()))
            }
            BrokerOp::GetKnownDevices => {
                Ok(BrokerReply::Devices(self.inner.known.lock().unwrap().clone()))
            }
            BrokerOp::GetStatus => {
                let id = args.iter().find_map(|a| match a {
                    BrokerArg::Device { id, .. } => Some(*id),
                    _ => None,
                });
                let code = id
                    .and_then(|id| self.inner.statuses.lock().unwrap().get(&id).copied())
                    .unwrap_or(0);
                Ok(BrokerReply::Int(code))
            }
            _ => Ok(BrokerReply::None),
        }
    }
}

/// Everything a session reported to its handler, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerEvent {
    Connect,
    Disconnect,
    ConnectDevice(u64),
    DisconnectDevice(u64),
    ApplicationInfo {
        device_id: u64,
        app_id: String,
        installed: bool,
    },
    ReceiveMessage {
        device_id: u64,
        app_id: String,
        data: Vec<u8>,
    },
    SendMessage {
        device_id: u64,
        app_id: String,
        error: Option<String>,
    },
}

/// Session handler that records every callback.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<HandlerEvent>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HandlerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_of(&self, predicate: impl Fn(&HandlerEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }

    fn push(&self, event: HandlerEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl SessionHandler for RecordingHandler {
    async fn on_connect(&self, _session: std::sync::Arc<dyn TransportSession>) {
        self.push(HandlerEvent::Connect);
    }

    async fn on_disconnect(&self, _session: std::sync::Arc<dyn TransportSession>) {
        self.push(HandlerEvent::Disconnect);
    }

    async fn on_connect_device(
        &self,
        _session: std::sync::Arc<dyn TransportSession>,
        device: Device,
    ) {
        self.push(HandlerEvent::ConnectDevice(device.id));
    }

    async fn on_disconnect_device(
        &self,
        _session: std::sync::Arc<dyn TransportSession>,
        device: Device,
    ) {
        self.push(HandlerEvent::DisconnectDevice(device.id));
    }

    async fn on_application_info(
        &self,
        _session: std::sync::Arc<dyn TransportSession>,
        pair: DeviceApplication,
    ) {
        self.push(HandlerEvent::ApplicationInfo {
            device_id: pair.device.id,
            app_id: pair.application.id.clone(),
            installed: pair.is_installed(),
        });
    }

    async fn on_receive_message(
        &self,
        _session: std::sync::Arc<dyn TransportSession>,
        device: Device,
        application: Application,
        data: Vec<u8>,
    ) {
        self.push(HandlerEvent::ReceiveMessage {
            device_id: device.id,
            app_id: application.id,
            data,
        });
    }

    async fn on_send_message(
        &self,
        _session: std::sync::Arc<dyn TransportSession>,
        device_id: u64,
        app_id: String,
        error: Option<String>,
    ) {
        self.push(HandlerEvent::SendMessage {
            device_id,
            app_id,
            error,
        });
    }
}
