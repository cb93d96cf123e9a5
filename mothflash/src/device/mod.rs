//! Serial port discovery.
//!
//! AudioMoth devices enumerate as USB CDC ports. Discovery lists every port
//! the OS reports and marks the ones that look like a USB serial device as
//! flasher candidates.

use crate::error::{Error, Result};
use crate::port::{NativePortEnumerator, PortEnumerator, PortInfo};
use log::{debug, trace};

/// How the OS reports a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PortKind {
    /// USB serial device (CDC ACM or bridge).
    Usb,
    /// Anything else: on-board UART, Bluetooth, PCI, virtual.
    Other,
}

/// Discovered serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DetectedPort {
    /// Port name/path (e.g., "/dev/ttyACM0" or "COM3").
    pub name: String,
    /// Port kind.
    pub kind: PortKind,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Device manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Device product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial: Option<String>,
}

impl From<PortInfo> for DetectedPort {
    fn from(info: PortInfo) -> Self {
        Self {
            kind: if info.usb { PortKind::Usb } else { PortKind::Other },
            name: info.name,
            vid: info.vid,
            pid: info.pid,
            manufacturer: info.manufacturer,
            product: info.product,
            serial: info.serial_number,
        }
    }
}

impl DetectedPort {
    /// Whether this port is likely an AudioMoth in bootloader mode.
    pub fn is_candidate(&self) -> bool {
        self.kind == PortKind::Usb || name_is_candidate(&self.name, cfg!(windows))
    }
}

fn name_is_candidate(name: &str, windows: bool) -> bool {
    if windows {
        name.contains("COM")
    } else {
        name.contains("usb") || name.contains("ACM")
    }
}

/// Detect all available ports.
///
/// Enumeration failures are logged and yield an empty list.
pub fn detect_ports() -> Vec<DetectedPort> {
    match NativePortEnumerator::list_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(DetectedPort::from)
            .inspect(|p| trace!("Found port: {} ({:?})", p.name, p.kind))
            .collect(),
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

/// Detect ports that look like a USB serial device.
pub fn detect_candidate_ports() -> Vec<DetectedPort> {
    candidates(detect_ports())
}

fn candidates(ports: Vec<DetectedPort>) -> Vec<DetectedPort> {
    ports.into_iter().filter(DetectedPort::is_candidate).collect()
}

/// Find an enumerated port by name.
///
/// An exact match wins; otherwise the name is compared case-insensitively,
/// since Windows treats `com3` and `COM3` as the same port.
pub fn find_port(name: &str) -> Result<DetectedPort> {
    find_in(detect_ports(), name)
}

fn find_in(ports: Vec<DetectedPort>, name: &str) -> Result<DetectedPort> {
    if let Some(port) = ports.iter().find(|p| p.name == name) {
        return Ok(port.clone());
    }
    ports
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| Error::PortNotFound(name.to_string()))
}

/// Format a list of detected ports for display.
pub fn format_port_list(ports: &[DetectedPort]) -> Vec<String> {
    ports
        .iter()
        .map(|port| {
            let ids = match (port.vid, port.pid) {
                (Some(vid), Some(pid)) => format!(" [VID:{vid:04X} PID:{pid:04X}]"),
                _ => String::new(),
            };
            let product = port
                .product
                .as_ref()
                .map(|p| format!(" - {p}"))
                .unwrap_or_default();
            format!("{}{ids}{product}", port.name)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, kind: PortKind) -> DetectedPort {
        DetectedPort {
            name: name.to_string(),
            kind,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial: None,
        }
    }

    #[test]
    fn test_name_heuristics() {
        assert!(name_is_candidate("/dev/ttyACM0", false));
        assert!(name_is_candidate("/dev/cu.usbmodem14101", false));
        assert!(!name_is_candidate("/dev/ttyS0", false));
        assert!(name_is_candidate("COM3", true));
        assert!(!name_is_candidate("/dev/ttyACM0", true));
    }

    #[test]
    fn test_usb_kind_is_always_candidate() {
        assert!(port("/dev/ttyXYZ", PortKind::Usb).is_candidate());
    }

    #[test]
    fn test_candidates_filter() {
        let ports = vec![
            port("/dev/ttyS0", PortKind::Other),
            port("/dev/ttyACM0", PortKind::Other),
            port("/dev/ttyXYZ", PortKind::Usb),
        ];
        let names: Vec<String> = candidates(ports).into_iter().map(|p| p.name).collect();
        if cfg!(windows) {
            assert_eq!(names, vec!["/dev/ttyXYZ"]);
        } else {
            assert_eq!(names, vec!["/dev/ttyACM0", "/dev/ttyXYZ"]);
        }
    }

    #[test]
    fn test_from_port_info() {
        let info = PortInfo {
            name: "/dev/ttyACM0".to_string(),
            usb: true,
            vid: Some(0x10C4),
            pid: Some(0x0002),
            manufacturer: Some("Open Acoustic Devices".to_string()),
            product: Some("AudioMoth".to_string()),
            serial_number: Some("24F0740459C7B5A1".to_string()),
        };
        let detected = DetectedPort::from(info);
        assert_eq!(detected.kind, PortKind::Usb);
        assert_eq!(detected.serial.as_deref(), Some("24F0740459C7B5A1"));
    }

    #[test]
    fn test_find_in_exact_and_case_insensitive() {
        let ports = vec![port("COM3", PortKind::Usb), port("com4", PortKind::Usb)];

        assert_eq!(find_in(ports.clone(), "COM3").unwrap().name, "COM3");
        assert_eq!(find_in(ports.clone(), "com3").unwrap().name, "COM3");
        assert_eq!(find_in(ports, "COM4").unwrap().name, "com4");
    }

    #[test]
    fn test_find_in_missing() {
        let err = find_in(vec![port("/dev/ttyACM0", PortKind::Usb)], "/dev/ttyACM9").unwrap_err();
        assert!(matches!(err, Error::PortNotFound(ref name) if name == "/dev/ttyACM9"));
    }

    #[test]
    fn test_format_port_list() {
        let mut moth = port("/dev/ttyACM0", PortKind::Usb);
        moth.vid = Some(0x10C4);
        moth.pid = Some(0x0002);
        moth.product = Some("AudioMoth".to_string());

        let formatted = format_port_list(&[moth, port("/dev/ttyS0", PortKind::Other)]);
        assert_eq!(formatted[0], "/dev/ttyACM0 [VID:10C4 PID:0002] - AudioMoth");
        assert_eq!(formatted[1], "/dev/ttyS0");
    }
}
