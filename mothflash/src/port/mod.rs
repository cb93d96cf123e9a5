//! Port abstraction for serial communication.
//!
//! The protocol layer never touches the `serialport` crate directly. It talks
//! to a [`Port`], which keeps the transfer engine and the command session
//! testable against an in-memory port.
//!
//! ```text
//! +---------------------+
//! |   Command Session   |
//! +----------+----------+
//!            |
//! +----------v----------+
//! |   XMODEM Sender     |
//! +----------+----------+
//!            |
//! +----------v----------+
//! |     Port trait      |
//! +----------+----------+
//!            |
//! +----------v----------+
//! | NativePort (serial) |
//! +---------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use mothflash::port::Port;
//!
//! fn example<P: Port>(port: &mut P) -> mothflash::Result<()> {
//!     port.write_exact(b"i")?;
//!
//!     let mut buf = [0u8; 32];
//!     let n = port.read_available(&mut buf)?;
//!     println!("Received: {:?}", &buf[..n]);
//!
//!     Ok(())
//! }
//! ```

pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::error::{Error, Result};

pub use native::{NativePort, NativePortEnumerator};

/// Baud rate spoken by the device bootloader.
pub const DEFAULT_BAUD: u32 = 9600;

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyACM0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout.
    ///
    /// Zero makes reads return immediately, so every protocol wait is bounded
    /// by its own poll count and delay alone.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::ZERO,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// Whether the OS reports this port as a USB device.
    pub usb: bool,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// Unified port trait for serial communication.
///
/// A port is owned exclusively by one session for its whole lifetime.
pub trait Port: Read + Write + Send {
    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Read whatever is available.
    ///
    /// A timed-out or would-block read is not an error here: it means nothing
    /// has arrived yet and yields `Ok(0)`.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            },
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Write `buf` with a single write call and flush.
    ///
    /// The device protocol has no way to resume a partial frame, so a short
    /// write is reported as [`Error::TransportWriteShort`].
    fn write_exact(&mut self, buf: &[u8]) -> Result<()> {
        let written = self.write(buf)?;
        if written != buf.len() {
            return Err(Error::TransportWriteShort {
                expected: buf.len(),
                written,
            });
        }
        self.flush()?;
        Ok(())
    }
}

/// Trait for listing available serial ports.
///
/// This is separated from `Port` because it's a static operation that
/// doesn't require an open port instance.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(test)]
mod tests {
    use super::mock::MockPort;
    use super::*;

    #[test]
    fn test_serial_config_new() {
        let config = SerialConfig::new("/dev/ttyACM0", DEFAULT_BAUD);

        assert_eq!(config.port_name, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout, Duration::ZERO);
    }

    #[test]
    fn test_read_available_maps_timeout_to_zero() {
        let mut port = MockPort::new().with_timeout_errors();
        let mut buf = [0u8; 8];
        assert_eq!(port.read_available(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_exact_rejects_short_write() {
        let mut port = MockPort::new().with_write_limit(2);
        let err = port.write_exact(b"abcd").unwrap_err();
        assert!(matches!(
            err,
            Error::TransportWriteShort {
                expected: 4,
                written: 2
            }
        ));
    }

    #[test]
    fn test_write_exact_records_bytes() {
        let mut port = MockPort::new();
        port.write_exact(b"u").unwrap();
        assert_eq!(port.writes(), &[b"u".to_vec()]);
    }
}
