//! AudioMoth command session.
//!
//! A session owns the serial port from open to close. It flushes stale input
//! once, then drives the bootloader one instruction at a time: send the byte,
//! let the device settle, read the fixed-length answer. Uploads hand the port
//! to the XMODEM sender in between.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mothflash::{Firmware, Session, UploadMode, UploadOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let firmware = Firmware::from_file("AudioMoth.bin", UploadMode::NonDestructive)?;
//!
//!     let mut session = Session::open("/dev/ttyACM0")?;
//!     println!("Serial number: {}", session.read_serial_number()?);
//!
//!     let report = session.upload(&firmware, UploadOptions::default(), || false, |sent, total| {
//!         println!("{sent}/{total}");
//!     })?;
//!     println!("Programmed {} bytes", report.bytes);
//!
//!     session.close()?;
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Result};
use crate::image::Firmware;
use crate::port::Port;
use crate::protocol::xmodem::{XmodemConfig, XmodemSender};
use crate::target::audiomoth::protocol::{Instruction, extract_response};
use log::{debug, info, trace, warn};
use std::thread;
use std::time::Duration;

/// Session timing configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Non-empty reads tolerated while flushing before giving up.
    pub flush_cycles: u32,
    /// Settle time after opening and after each instruction.
    pub instruction_delay: Duration,
    /// Largest response read back after an instruction.
    pub response_buffer: usize,
    /// Transfer engine configuration.
    pub xmodem: XmodemConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flush_cycles: 100,
            instruction_delay: Duration::from_millis(250),
            response_buffer: 1024,
            xmodem: XmodemConfig::default(),
        }
    }
}

/// Upload behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Read back the flash CRC once the transfer finished.
    pub verify: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self { verify: true }
    }
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Bytes transferred (the image size).
    pub bytes: usize,
    /// Flash CRC reported after the upload.
    ///
    /// `None` when verification was skipped or the read-back failed.
    pub crc: Option<String>,
}

/// Command session with one device.
///
/// The port is closed when the session is closed or dropped, whichever comes
/// first.
pub struct Session<P: Port> {
    port: P,
    config: SessionConfig,
    flushed: bool,
    closed: bool,
}

impl<P: Port> Session<P> {
    /// Create a session over an opened port with default timing.
    pub fn new(port: P) -> Self {
        Self::with_config(port, SessionConfig::default())
    }

    /// Create a session with custom timing.
    pub fn with_config(port: P, config: SessionConfig) -> Self {
        Self {
            port,
            config,
            flushed: false,
            closed: false,
        }
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Discard stale input and let the device settle.
    ///
    /// Runs automatically before the first instruction.
    pub fn flush(&mut self) -> Result<()> {
        let mut buf = vec![0u8; self.config.response_buffer.max(1)];
        let mut cycles = 0;

        loop {
            let n = self.port.read_available(&mut buf)?;
            if n == 0 {
                break;
            }
            trace!("Discarded {n} stale bytes");
            cycles += 1;
            if cycles >= self.config.flush_cycles {
                return Err(Error::TransportFlushFailed { cycles });
            }
        }

        thread::sleep(self.config.instruction_delay);
        self.flushed = true;
        debug!("Flushed {} ({cycles} stale reads)", self.port.name());
        Ok(())
    }

    fn ensure_flushed(&mut self) -> Result<()> {
        if self.flushed {
            Ok(())
        } else {
            self.flush()
        }
    }

    /// Send a single instruction byte.
    pub fn send_instruction(&mut self, instruction: Instruction) -> Result<()> {
        self.ensure_flushed()?;
        debug!("Sending {instruction} instruction");
        self.port.write_exact(&[instruction.byte()])
    }

    /// Wait for the device to answer, then return the `len`-byte payload.
    pub fn read_response(&mut self, len: usize) -> Result<String> {
        thread::sleep(self.config.instruction_delay);

        let limit = self.config.response_buffer.max(len);
        let mut raw = Vec::with_capacity(limit);
        let mut buf = [0u8; 256];
        while raw.len() < limit {
            let want = buf.len().min(limit - raw.len());
            let n = self.port.read_available(&mut buf[..want])?;
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
        }
        trace!("Raw response: {:?}", String::from_utf8_lossy(&raw));

        let payload = extract_response(&raw, len)?;
        Ok(String::from_utf8_lossy(payload).into_owned())
    }

    fn query(&mut self, instruction: Instruction) -> Result<String> {
        let len = instruction.response_length().unwrap_or_default();
        self.send_instruction(instruction)?;
        self.read_response(len)
    }

    /// Read the device serial number.
    pub fn read_serial_number(&mut self) -> Result<String> {
        let serial = self.query(Instruction::Identify)?;
        info!("Serial number: {serial}");
        Ok(serial)
    }

    /// Read the CRC of the application area.
    pub fn read_flash_crc(&mut self) -> Result<String> {
        let crc = self.query(Instruction::ReadCrc)?;
        info!("Flash CRC: {crc}");
        Ok(crc)
    }

    /// Upload a firmware image and boot it.
    ///
    /// For destructive images `confirm` is asked first; returning `false`
    /// aborts with [`Error::UploadDeclined`] before anything is sent.
    ///
    /// # Arguments
    ///
    /// * `firmware` - Image validated for its upload mode
    /// * `options` - Upload behaviour
    /// * `confirm` - Confirmation for destructive uploads
    /// * `progress` - Progress callback (sent_bytes, total_bytes)
    pub fn upload<C, F>(
        &mut self,
        firmware: &Firmware,
        options: UploadOptions,
        confirm: C,
        progress: F,
    ) -> Result<UploadReport>
    where
        C: FnOnce() -> bool,
        F: FnMut(usize, usize),
    {
        let mode = firmware.mode();
        if mode.is_destructive() && !confirm() {
            info!("No upload performed");
            return Err(Error::UploadDeclined);
        }

        self.send_instruction(mode.instruction())?;
        thread::sleep(self.config.instruction_delay);

        let bytes = XmodemSender::with_config(&mut self.port, self.config.xmodem.clone())
            .send(firmware.data(), progress)?;
        info!("Programmed: {bytes} bytes");

        // The image is committed once EOT is acknowledged; a failed read-back
        // must not keep the device in the bootloader.
        let crc = if options.verify {
            match self.query(mode.readback_instruction()) {
                Ok(crc) => {
                    info!("Flash CRC: {crc}");
                    Some(crc)
                },
                Err(e) => {
                    warn!("Could not read back flash CRC: {e}");
                    None
                },
            }
        } else {
            None
        };

        self.send_instruction(Instruction::Boot)?;

        Ok(UploadReport { bytes, crc })
    }

    /// Close the port.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.port.close()
    }
}

impl<P: Port> Drop for Session<P> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.port.close() {
                warn!("Failed to close {}: {e}", self.port.name());
            }
        }
    }
}

// Native-specific convenience functions
mod native_impl {
    use super::{Result, Session, SessionConfig};
    use crate::port::{DEFAULT_BAUD, NativePort, SerialConfig};

    impl Session<NativePort> {
        /// Open a serial port at the bootloader baud rate.
        pub fn open(port_name: &str) -> Result<Self> {
            Self::open_with_config(port_name, SessionConfig::default())
        }

        /// Open a serial port with custom session timing.
        pub fn open_with_config(port_name: &str, config: SessionConfig) -> Result<Self> {
            let port = NativePort::open(&SerialConfig::new(port_name, DEFAULT_BAUD))?;
            Ok(Self::with_config(port, config))
        }
    }
}
