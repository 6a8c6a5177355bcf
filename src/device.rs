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

//! Device and application identities.
//!
//! Identity rules are load-bearing for message routing: a [`Device`] is
//! identified by its opaque numeric id alone (names are transient, the
//! simulator assigns ephemeral ones), and a [`DeviceApplication`] pair is
//! identified by `(device.id, application.id)` alone. This lets pending
//! sends deduplicate and inbound messages route correctly even when a device
//! is rediscovered on a new session after a reconnect.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;

/// A paired wearable device, identified by an opaque stable id.
#[derive(Debug, Clone)]
pub struct Device {
    /// Opaque identifier, stable per pairing.
    pub id: u64,
    /// Display name; may differ across observations and never affects identity.
    pub name: String,
}

impl Device {
    /// Creates a device identity.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Placeholder identity for a device only known by id.
    pub fn placeholder(id: u64) -> Self {
        Self {
            id,
            name: "?".to_string(),
        }
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "D[{}/{}]", self.name, self.id)
    }
}

/// Connection status of a device as reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// The device is not paired with the broker.
    NotPaired,
    /// Paired but currently unreachable.
    NotConnected,
    /// Reachable right now.
    Connected,
    /// Status could not be determined (also the lookup-failure default).
    Unknown,
}

impl DeviceStatus {
    /// Maps a broker status code to a status, falling back to `Unknown`.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::NotPaired,
            1 => Self::NotConnected,
            2 => Self::Connected,
            _ => Self::Unknown,
        }
    }
}

/// Install state of an application on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    /// No information yet.
    Unknown,
    /// Confirmed absent (or the lookup failed).
    NotInstalled,
    /// Confirmed present.
    Installed,
}

/// Version sentinel the broker reports for applications that are not
/// actually installed even though an id was returned.
pub const VERSION_NOT_INSTALLED: i32 = 65535;

/// A program installed (or queried) on a device.
#[derive(Debug, Clone)]
pub struct Application {
    /// Application identifier; routing key together with the device id.
    pub id: String,
    /// Human-readable name, when configured.
    pub name: Option<String>,
    /// Install state.
    pub status: InstallStatus,
    /// Reported version; `65535` and negative values mean "not installed".
    pub version: i32,
}

impl Application {
    /// Creates an application record with an explicit status.
    pub fn new(
        id: impl Into<String>,
        name: Option<String>,
        status: InstallStatus,
        version: i32,
    ) -> Self {
        Self {
            id: id.into(),
            name,
            status,
            version,
        }
    }

    /// Builds an application record from an info-lookup result.
    ///
    /// A missing id, a negative version, or the `65535` sentinel all mean
    /// the application is not installed, even if an id was echoed back.
    pub fn from_lookup(id: Option<String>, name: Option<String>, version: i32) -> Self {
        let status = match &id {
            Some(_) if version >= 0 && version != VERSION_NOT_INSTALLED => {
                InstallStatus::Installed
            }
            _ => InstallStatus::NotInstalled,
        };
        Self {
            id: id.unwrap_or_default(),
            name,
            status,
            version,
        }
    }
}

impl std::fmt::Display for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({name})", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// The addressing unit for all message traffic: one application on one
/// device.
///
/// Equality and hashing use `(device.id, application.id)` only; display
/// names, versions, and which session produced the pair are transient.
#[derive(Debug, Clone)]
pub struct DeviceApplication {
    /// The device half of the pair.
    pub device: Device,
    /// The application half of the pair.
    pub application: Application,
}

impl DeviceApplication {
    /// Creates a pair.
    pub const fn new(device: Device, application: Application) -> Self {
        Self {
            device,
            application,
        }
    }

    /// Whether the application half is confirmed installed.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.application.status == InstallStatus::Installed
    }

    /// The map/set key form of this pair.
    #[must_use]
    pub fn key(&self) -> PairKey {
        PairKey {
            device_id: self.device.id,
            app_id: self.application.id.clone(),
        }
    }
}

impl PartialEq for DeviceApplication {
    fn eq(&self, other: &Self) -> bool {
        self.device.id == other.device.id && self.application.id == other.application.id
    }
}

impl Eq for DeviceApplication {}

impl Hash for DeviceApplication {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.device.id.hash(state);
        self.application.id.hash(state);
    }
}

impl std::fmt::Display for DeviceApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.device, self.application)
    }
}

/// Owned key identifying a device-application pair in maps and sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    /// The device id half of the key.
    pub device_id: u64,
    /// The application id half of the key.
    pub app_id: String,
}

impl PairKey {
    /// Creates a key from its parts.
    pub fn new(device_id: u64, app_id: impl Into<String>) -> Self {
        Self {
            device_id,
            app_id: app_id.into(),
        }
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.device_id, self.app_id)
    }
}

/// Concurrent registry of known device identities, populated from transport
/// queries.
///
/// Membership is never explicitly destroyed by this layer; it simply stops
/// being refreshed once a session disconnects, and the owning session clears
/// it on teardown.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    devices: Arc<DashMap<u64, Device>>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or refreshes) a device identity.
    pub fn insert(&self, device: Device) {
        self.devices.insert(device.id, device);
    }

    /// Looks up a device by id.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<Device> {
        self.devices.get(&id).map(|d| d.value().clone())
    }

    /// Looks up a device, falling back to a placeholder identity.
    #[must_use]
    pub fn get_or_placeholder(&self, id: u64) -> Device {
        self.get(id).unwrap_or_else(|| Device::placeholder(id))
    }

    /// All currently known devices.
    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        self.devices.iter().map(|d| d.value().clone()).collect()
    }

    /// Number of known devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Forgets every device.
    pub fn clear(&self) {
        self.devices.clear();
    }
}
