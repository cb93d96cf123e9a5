//! Error types for mothflash.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for mothflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mothflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The serial port could not be opened.
    #[error("Could not open port {port}: {reason}")]
    TransportOpenFailed {
        /// Port name/path.
        port: String,
        /// Reason reported by the operating system.
        reason: String,
    },

    /// The port accepted fewer bytes than were written.
    #[error("Short write: {written} of {expected} bytes sent")]
    TransportWriteShort {
        /// Number of bytes that should have been written.
        expected: usize,
        /// Number of bytes the port accepted.
        written: usize,
    },

    /// Stale input kept arriving while flushing the port.
    #[error("Could not flush serial port after {cycles} reads")]
    TransportFlushFailed {
        /// Number of non-empty reads performed.
        cycles: u32,
    },

    /// The receiver never sent its ready signal.
    #[error("Timed out waiting for ready signal from device")]
    ReadyTimeout,

    /// No response byte arrived after sending a chunk.
    #[error("No response from device after sending block {block}")]
    ChunkResponseTimeout {
        /// Block number of the unanswered chunk.
        block: u8,
    },

    /// A chunk was rejected too many times in a row.
    #[error("Exceeded maximum retries ({attempts}) when sending block {block}")]
    ChunkRetriesExceeded {
        /// Block number of the rejected chunk.
        block: u8,
        /// Number of consecutive failed attempts.
        attempts: u32,
    },

    /// No response byte arrived after the end-of-transmission marker.
    #[error("No response from device after sending end of transmission")]
    EofAckTimeout,

    /// The receiver answered the end-of-transmission marker with something other than ACK.
    #[error("Device rejected end of transmission (response 0x{0:02X})")]
    EofAckRejected(u8),

    /// Malformed XMODEM chunk.
    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),

    /// CRC checksum mismatch.
    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch {
        /// Expected CRC value.
        expected: u16,
        /// Actual CRC value.
        actual: u16,
    },

    /// Firmware image exceeds the limit for the chosen upload mode.
    #[error("File is too big: {size} bytes (limit {limit} bytes)")]
    FileTooLarge {
        /// Image size.
        size: usize,
        /// Maximum allowed size.
        limit: usize,
    },

    /// Firmware image has zero length.
    #[error("File has zero size")]
    FileEmpty,

    /// Firmware image could not be read from disk.
    #[error("Could not read file {}: {source}", path.display())]
    FileUnreadable {
        /// Path of the image.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The requested port is not among the enumerated serial ports.
    #[error("Could not find port {0}")]
    PortNotFound(String),

    /// The device answered with fewer bytes than the response needs.
    #[error("Response too short: got {received} bytes, need {expected}")]
    ResponseTooShort {
        /// Number of bytes required (payload plus trailer).
        expected: usize,
        /// Number of bytes received.
        received: usize,
    },

    /// A destructive upload was not confirmed.
    #[error("No upload performed")]
    UploadDeclined,

    /// The embedding application requested cancellation.
    #[error("Operation interrupted")]
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::ChunkRetriesExceeded {
            block: 3,
            attempts: 10,
        };
        assert_eq!(
            err.to_string(),
            "Exceeded maximum retries (10) when sending block 3"
        );

        let err = Error::FileTooLarge {
            size: 300_000,
            limit: 262_144,
        };
        assert!(err.to_string().contains("262144"));

        assert_eq!(
            Error::EofAckRejected(0x15).to_string(),
            "Device rejected end of transmission (response 0x15)"
        );
    }
}
