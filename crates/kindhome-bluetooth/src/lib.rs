//! Bluetooth discovery surface
//!
//! This crate provides the discovery-side view of Bluetooth devices that
//! integrations consume: the [`BluetoothServiceInfo`] advertisement record,
//! the [`DiscoverySource`] trait for querying currently visible devices, and
//! [`DiscoveryCache`], the live address-keyed index the scanner feeds.
//!
//! Scanning itself (adapter handling, passive/active scan scheduling) is
//! owned by the platform; this crate only models what a scan produces.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

/// A single Bluetooth LE advertisement as seen by the scanner.
///
/// The address is the stable identifier for a device; everything else is
/// whatever the device chose to advertise in its last packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothServiceInfo {
    /// Advertised local name
    pub name: String,

    /// Device MAC address
    pub address: String,

    /// Signal strength of the advertisement
    pub rssi: i16,

    /// Manufacturer-specific data, keyed by company identifier
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub manufacturer_data: HashMap<u16, Vec<u8>>,

    /// Service data, keyed by service UUID
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub service_data: HashMap<String, Vec<u8>>,

    /// Advertised service UUIDs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_uuids: Vec<String>,

    /// Identifier of the adapter that saw the advertisement
    #[serde(default)]
    pub source: String,

    /// Whether the device accepts connections
    #[serde(default = "default_connectable")]
    pub connectable: bool,
}

fn default_connectable() -> bool {
    true
}

impl BluetoothServiceInfo {
    /// Create a minimal advertisement record
    pub fn new(name: impl Into<String>, address: impl Into<String>, rssi: i16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            rssi,
            manufacturer_data: HashMap::new(),
            service_data: HashMap::new(),
            service_uuids: Vec::new(),
            source: String::new(),
            connectable: true,
        }
    }

    /// Set advertised service UUIDs
    pub fn with_service_uuids(mut self, uuids: Vec<String>) -> Self {
        self.service_uuids = uuids;
        self
    }

    /// Set service data
    pub fn with_service_data(mut self, data: HashMap<String, Vec<u8>>) -> Self {
        self.service_data = data;
        self
    }

    /// Set manufacturer data
    pub fn with_manufacturer_data(mut self, data: HashMap<u16, Vec<u8>>) -> Self {
        self.manufacturer_data = data;
        self
    }

    /// Set the adapter source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Mark the device as not accepting connections
    pub fn not_connectable(mut self) -> Self {
        self.connectable = false;
        self
    }

    /// Check whether the advertisement carries the given service UUID,
    /// either in the UUID list or as a service-data key.
    pub fn advertises_service(&self, uuid: &str) -> bool {
        self.service_uuids
            .iter()
            .any(|u| u.eq_ignore_ascii_case(uuid))
            || self
                .service_data
                .keys()
                .any(|u| u.eq_ignore_ascii_case(uuid))
    }
}

/// Source of currently visible discovered devices.
///
/// Implemented by [`DiscoveryCache`]; hosts and tests can substitute their
/// own index.
pub trait DiscoverySource: Send + Sync {
    /// Return the latest advertisement for every currently visible device.
    ///
    /// With `connectable_only`, devices that do not accept connections are
    /// filtered out.
    fn discovered_service_info(&self, connectable_only: bool) -> Vec<BluetoothServiceInfo>;
}

/// Live index of visible advertisements, keyed by address.
///
/// The scanner calls [`DiscoveryCache::record`] for every advertisement; a
/// newer packet for an address replaces the older one. Entries persist until
/// [`DiscoveryCache::forget`] (e.g. on advertisement timeout).
#[derive(Debug, Default)]
pub struct DiscoveryCache {
    devices: DashMap<String, BluetoothServiceInfo>,
}

impl DiscoveryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an advertisement, replacing any earlier one for the address
    pub fn record(&self, info: BluetoothServiceInfo) {
        trace!(address = %info.address, name = %info.name, rssi = info.rssi, "recording advertisement");
        self.devices.insert(info.address.clone(), info);
    }

    /// Get the latest advertisement for an address
    pub fn get(&self, address: &str) -> Option<BluetoothServiceInfo> {
        self.devices.get(address).map(|r| r.value().clone())
    }

    /// Drop an address from the index
    pub fn forget(&self, address: &str) {
        if self.devices.remove(address).is_some() {
            trace!(address, "advertisement expired");
        }
    }

    /// Number of visible devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if no devices are visible
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl DiscoverySource for DiscoveryCache {
    fn discovered_service_info(&self, connectable_only: bool) -> Vec<BluetoothServiceInfo> {
        self.devices
            .iter()
            .filter(|r| !connectable_only || r.value().connectable)
            .map(|r| r.value().clone())
            .collect()
    }
}
