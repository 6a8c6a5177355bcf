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

//! Runtime configuration.
//!
//! Every field has a default, so an empty TOML document (or no file at all)
//! yields a working configuration. Sections map one-to-one onto the layer's
//! components: `[transport]` for the broker session, `[simulator]` for the
//! loopback session, and `[applications]` for the id-to-name table of
//! companion applications to probe on each connected device.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Top-level configuration for the communication layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WristlinkConfig {
    /// Broker session settings.
    pub transport: TransportConfig,
    /// Loopback simulator settings.
    pub simulator: SimulatorConfig,
    /// Companion applications to probe, keyed by application id with a
    /// display name as the value.
    pub applications: HashMap<String, String>,
}

impl WristlinkConfig {
    /// Loads configuration from a TOML file.
    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&raw).map_err(|e| TransportError::Config(e.to_string()))
    }
}

/// Settings for the broker-backed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Namespace prefix for correlation tokens and broadcast actions.
    pub namespace: String,
    /// Package name stamped into outbound message records.
    pub package: String,
    /// Base wait between send retries, in milliseconds. The n-th retry waits
    /// n times this long.
    pub retry_wait_ms: u64,
    /// Retry count at which a pending send is dropped instead of resent.
    pub retry_limit: u8,
}

impl TransportConfig {
    /// The base retry wait as a [`Duration`].
    #[must_use]
    pub const fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            namespace: "com.wristlink.transport".to_string(),
            package: "wristlink".to_string(),
            retry_wait_ms: 10_000,
            retry_limit: 9,
        }
    }
}

/// Settings for the loopback TCP simulator session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Whether the supervisor starts a simulator session alongside the
    /// primary one.
    pub enabled: bool,
    /// Loopback port to listen on. Port 0 picks an ephemeral port.
    pub port: u16,
    /// Application id every simulated device reports as installed.
    pub application_id: String,
    /// Display name for the simulated application.
    pub application_name: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 7381,
            application_id: "SimAp".to_string(),
            application_name: "SimulatorApp".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: WristlinkConfig = toml::from_str("").expect("empty config parses");
        assert_eq!(config.transport.retry_wait_ms, 10_000);
        assert_eq!(config.transport.retry_limit, 9);
        assert_eq!(config.simulator.port, 7381);
        assert!(!config.simulator.enabled);
        assert!(config.applications.is_empty());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let raw = r#"
            [transport]
            retry_wait_ms = 250

            [simulator]
            enabled = true
            port = 0

            [applications]
            abc123 = "Glucose Watchface"
        "#;
        let config: WristlinkConfig = toml::from_str(raw).expect("partial config parses");
        assert_eq!(config.transport.retry_wait_ms, 250);
        assert_eq!(config.transport.retry_limit, 9);
        assert!(config.simulator.enabled);
        assert_eq!(config.simulator.port, 0);
        assert_eq!(config.simulator.application_id, "SimAp");
        assert_eq!(
            config.applications.get("abc123").map(String::as_str),
            Some("Glucose Watchface")
        );
    }

    #[test]
    fn retry_wait_converts_to_duration() {
        let transport = TransportConfig {
            retry_wait_ms: 1500,
            ..TransportConfig::default()
        };
        assert_eq!(transport.retry_wait(), Duration::from_millis(1500));
    }
}
