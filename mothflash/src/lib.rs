//! # mothflash
//!
//! A library for flashing AudioMoth acoustic loggers over their USB
//! bootloader.
//!
//! This crate provides:
//!
//! - Serial port discovery
//! - The AudioMoth bootloader command set (serial number, flash CRC, boot)
//! - XMODEM-CRC firmware upload with 128-byte blocks
//! - CRC16-XMODEM checksum calculation
//!
//! ## Features
//!
//! - `serde`: Serialization support for discovery and image types
//!
//! ## Example
//!
//! ```rust,no_run
//! use mothflash::{Firmware, Session, UploadMode, UploadOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let firmware = Firmware::from_file("AudioMoth-Project.bin", UploadMode::NonDestructive)?;
//!
//!     let mut session = Session::open("/dev/ttyACM0")?;
//!     let report = session.upload(&firmware, UploadOptions::default(), || false, |sent, total| {
//!         println!("{sent}/{total}");
//!     })?;
//!
//!     if let Some(crc) = report.crc {
//!         println!("Flash CRC: {crc}");
//!     }
//!     session.close()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod device;
pub mod error;
pub mod image;
pub mod port;
pub mod protocol;
pub mod target;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop,
/// for example after Ctrl-C in a CLI. Only the first registration takes
/// effect.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
pub use {
    device::{DetectedPort, PortKind, detect_candidate_ports, detect_ports, find_port},
    error::{Error, Result},
    image::Firmware,
    port::{NativePort, NativePortEnumerator, Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::crc16,
    target::audiomoth::{
        Instruction, Session, SessionConfig, UploadMode, UploadOptions, UploadReport,
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        // No checker is registered inside the library's own tests.
        assert!(!is_interrupted_requested());
    }
}
