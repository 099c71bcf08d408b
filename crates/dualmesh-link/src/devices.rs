//! Serial device discovery
//!
//! Used by the node binary to suggest device paths when a configured
//! serial port is missing.

use std::path::PathBuf;
use tracing::debug;

/// Device node patterns radios typically enumerate as
const DEVICE_PATTERNS: &[&str] = &[
    "/dev/ttyUSB*",
    "/dev/ttyACM*",
    "/dev/serial/by-id/*",
    "/dev/tty.usbserial-*",
    "/dev/tty.SLAB_USBtoUART*",
    "/dev/cu.usbserial-*",
];

/// USB vendor ids of common radio UART bridges
///
/// Silicon Labs CP210x, FTDI, Espressif native USB, WCH CH340.
#[cfg_attr(not(feature = "serial"), allow(dead_code))]
const RADIO_VENDOR_IDS: &[u16] = &[0x10C4, 0x0403, 0x303A, 0x1A86];

/// A serial device that might be a radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialDeviceInfo {
    /// Device node
    pub path: PathBuf,
    /// USB vendor id, when known
    pub vendor_id: Option<u16>,
    /// USB product id, when known
    pub product_id: Option<u16>,
    /// Product string reported by the device
    pub product: Option<String>,
    /// Whether the vendor matches a known radio UART bridge
    pub likely_radio: bool,
}

impl SerialDeviceInfo {
    fn from_path(path: PathBuf) -> Self {
        Self {
            path,
            vendor_id: None,
            product_id: None,
            product: None,
            likely_radio: false,
        }
    }
}

/// List serial devices that could be radios, likely radios first
pub fn find_serial_devices() -> Vec<SerialDeviceInfo> {
    let mut devices: Vec<SerialDeviceInfo> = Vec::new();

    #[cfg(feature = "serial")]
    if let Ok(ports) = serialport::available_ports() {
        for port in ports {
            let mut info = SerialDeviceInfo::from_path(PathBuf::from(&port.port_name));
            if let serialport::SerialPortType::UsbPort(usb) = &port.port_type {
                info.vendor_id = Some(usb.vid);
                info.product_id = Some(usb.pid);
                info.product = usb.product.clone();
                info.likely_radio = RADIO_VENDOR_IDS.contains(&usb.vid);
            }
            devices.push(info);
        }
    }

    for pattern in DEVICE_PATTERNS {
        let Ok(entries) = glob::glob(pattern) else {
            continue;
        };
        for path in entries.flatten() {
            if !devices.iter().any(|d| d.path == path) {
                debug!(path = %path.display(), "Found serial device node");
                devices.push(SerialDeviceInfo::from_path(path));
            }
        }
    }

    devices.sort_by(|a, b| b.likely_radio.cmp(&a.likely_radio).then(a.path.cmp(&b.path)));
    devices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_serial_devices_is_sorted() {
        let devices = find_serial_devices();
        // Likely radios come first
        let first_other = devices.iter().position(|d| !d.likely_radio);
        if let Some(pos) = first_other {
            assert!(devices[pos..].iter().all(|d| !d.likely_radio));
        }
    }

    #[test]
    fn test_device_from_path() {
        let info = SerialDeviceInfo::from_path(PathBuf::from("/dev/ttyACM0"));
        assert!(!info.likely_radio);
        assert!(info.vendor_id.is_none());
    }
}
