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

//! Tests for the loopback TCP simulator session.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use wristlink::config::SimulatorConfig;
use wristlink::prelude::*;

mod setup;
use setup::fakes::{HandlerEvent, RecordingHandler};
use setup::{initialize_tracing, settle};

fn ephemeral_config() -> SimulatorConfig {
    SimulatorConfig {
        port: 0,
        ..SimulatorConfig::default()
    }
}

async fn started(handler: &RecordingHandler) -> Result<Arc<SimulatorSession>> {
    let session = SimulatorSession::start(ephemeral_config(), Arc::new(handler.clone())).await?;
    settle().await;
    Ok(session)
}

#[tokio::test]
async fn each_connection_becomes_a_device_with_fresh_id() -> Result<()> {
    initialize_tracing();
    let handler = RecordingHandler::new();
    let session = started(&handler).await?;
    assert_eq!(
        handler.count_of(|e| matches!(e, HandlerEvent::Connect)),
        1
    );

    let _first = TcpStream::connect(session.local_addr()).await?;
    let _second = TcpStream::connect(session.local_addr()).await?;
    settle().await;

    assert_eq!(
        handler.count_of(|e| matches!(e, HandlerEvent::ConnectDevice(1))),
        1
    );
    assert_eq!(
        handler.count_of(|e| matches!(e, HandlerEvent::ConnectDevice(2))),
        1
    );
    assert_eq!(session.connected_devices().await.len(), 2);
    assert_eq!(
        session.device_status(&Device::placeholder(1)).await,
        DeviceStatus::Connected
    );
    session.dispose().await;
    Ok(())
}

#[tokio::test]
async fn inbound_bytes_reach_the_handler_unmodified() -> Result<()> {
    initialize_tracing();
    let handler = RecordingHandler::new();
    let session = started(&handler).await?;

    let mut client = TcpStream::connect(session.local_addr()).await?;
    settle().await;
    client.write_all(&[9, 8, 7, 6]).await?;
    client.flush().await?;
    settle().await;

    assert_eq!(
        handler.count_of(|e| matches!(
            e,
            HandlerEvent::ReceiveMessage {
                device_id: 1,
                app_id,
                data,
            } if app_id == "SimAp" && data == &[9, 8, 7, 6]
        )),
        1
    );
    session.dispose().await;
    Ok(())
}

#[tokio::test]
async fn outbound_payload_arrives_on_the_socket() -> Result<()> {
    initialize_tracing();
    let handler = RecordingHandler::new();
    let session = started(&handler).await?;

    let mut client = TcpStream::connect(session.local_addr()).await?;
    settle().await;

    let device = session
        .connected_devices()
        .await
        .pop()
        .expect("one device connected");
    let pair = DeviceApplication::new(
        device,
        Application::new("SimAp", None, InstallStatus::Installed, 1),
    );
    session.send_message(&pair, vec![1, 2, 3]).await;

    let mut buf = [0u8; 8];
    let n = client.read(&mut buf).await?;
    assert_eq!(&buf[..n], &[1, 2, 3]);
    session.dispose().await;
    Ok(())
}

#[tokio::test]
async fn application_probe_answers_for_any_id() -> Result<()> {
    initialize_tracing();
    let handler = RecordingHandler::new();
    let session = started(&handler).await?;

    let _client = TcpStream::connect(session.local_addr()).await?;
    settle().await;
    let device = Device::placeholder(1);

    session
        .retrieve_application_info(&device, "SimAp", "SimulatorApp")
        .await;
    session
        .retrieve_application_info(&device, "other", "Other")
        .await;
    settle().await;

    assert_eq!(
        handler.count_of(|e| matches!(
            e,
            HandlerEvent::ApplicationInfo {
                app_id,
                installed: true,
                ..
            } if app_id == "SimAp"
        )),
        1
    );
    assert_eq!(
        handler.count_of(|e| matches!(
            e,
            HandlerEvent::ApplicationInfo {
                app_id,
                installed: false,
                ..
            } if app_id == "other"
        )),
        1
    );
    session.dispose().await;
    Ok(())
}

#[tokio::test]
async fn closed_socket_disconnects_the_device() -> Result<()> {
    initialize_tracing();
    let handler = RecordingHandler::new();
    let session = started(&handler).await?;

    let client = TcpStream::connect(session.local_addr()).await?;
    settle().await;
    drop(client);
    settle().await;

    assert_eq!(
        handler.count_of(|e| matches!(e, HandlerEvent::DisconnectDevice(1))),
        1
    );
    assert!(session.connected_devices().await.is_empty());
    assert_eq!(
        session.device_status(&Device::placeholder(1)).await,
        DeviceStatus::NotConnected
    );
    session.dispose().await;
    Ok(())
}

#[tokio::test]
async fn dispose_reports_disconnect_and_is_idempotent() -> Result<()> {
    initialize_tracing();
    let handler = RecordingHandler::new();
    let session = started(&handler).await?;

    session.dispose().await;
    session.dispose().await;
    settle().await;

    assert_eq!(session.state(), SessionState::Disposed);
    assert_eq!(
        handler.count_of(|e| matches!(e, HandlerEvent::Disconnect)),
        1
    );
    Ok(())
}
