//! Kindhome Solarbeaker BLE driver surface
//!
//! The Solarbeaker driver owns connection handling and the command protocol.
//! What setup code is allowed to see lives here: the GATT service identity
//! the device advertises, and [`SolarbeakerDevice::supported`], which decides
//! from an advertisement alone whether a device is a Solarbeaker.

use kindhome_bluetooth::BluetoothServiceInfo;

/// Solarbeaker GATT service UUID, present in every advertisement
pub const SOLARBEAKER_SERVICE_UUID: &str = "8d47a290-3d46-4c27-9a39-0b33a4f3e2d1";

/// Characteristic UUIDs under the Solarbeaker service.
///
/// Listed for driver callers; setup code never touches them.
pub mod characteristics {
    /// Motor state (read/notify)
    pub const STATE_UUID: &str = "8d47a291-3d46-4c27-9a39-0b33a4f3e2d1";

    /// Motor command (write)
    pub const COMMAND_UUID: &str = "8d47a292-3d46-4c27-9a39-0b33a4f3e2d1";

    /// Battery level (read/notify)
    pub const BATTERY_UUID: &str = "8d47a293-3d46-4c27-9a39-0b33a4f3e2d1";
}

/// The Solarbeaker device type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolarbeakerDevice;

impl SolarbeakerDevice {
    /// Check whether an advertisement comes from a Solarbeaker.
    ///
    /// True when the Solarbeaker service UUID appears in the advertised
    /// UUID list or as a service-data key.
    pub fn supported(info: &BluetoothServiceInfo) -> bool {
        info.advertises_service(SOLARBEAKER_SERVICE_UUID)
    }
}
