//! AudioMoth bootloader command set.
//!
//! Every instruction is a single ASCII byte. Instructions that answer do so
//! with a fixed-length ASCII payload followed by a two-byte trailer
//! (`\r\n`), possibly preceded by whatever text the bootloader printed
//! before it:
//!
//! ```text
//! ... | PAYLOAD (16 or 4 bytes) | TRAILER (2 bytes)
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// Length of the serial number response.
pub const SERIAL_NUMBER_LENGTH: usize = 16;

/// Length of the flash CRC response (hex digits).
pub const FLASH_CRC_LENGTH: usize = 4;

/// Bytes the device appends after every response payload.
pub const RESPONSE_TRAILER_LENGTH: usize = 2;

/// Total flash size.
pub const FLASH_SIZE: usize = 256 * 1024;

/// Space reserved for the bootloader at the start of flash.
pub const BOOTLOADER_SIZE: usize = 0x4000;

/// Bootloader instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Instruction {
    /// Report the 16-character serial number.
    Identify = b'i',
    /// Report the CRC of the application area.
    ReadCrc = b'c',
    /// Start an upload that preserves the bootloader.
    Upload = b'u',
    /// Start an upload that overwrites the bootloader.
    UploadDestructive = b'd',
    /// Report the CRC of the whole flash after a destructive upload.
    Verify = b'v',
    /// Leave the bootloader and start the new firmware.
    Boot = b'b',
}

impl Instruction {
    /// Wire byte.
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Length of the response payload, if the instruction has one.
    pub fn response_length(self) -> Option<usize> {
        match self {
            Self::Identify => Some(SERIAL_NUMBER_LENGTH),
            Self::ReadCrc | Self::Verify => Some(FLASH_CRC_LENGTH),
            Self::Upload | Self::UploadDestructive | Self::Boot => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", char::from(self.byte()))
    }
}

/// How an upload treats the bootloader area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum UploadMode {
    /// Write the application area only.
    #[default]
    NonDestructive,
    /// Write the whole flash, bootloader included.
    Destructive,
}

impl UploadMode {
    /// Largest image accepted in this mode.
    pub fn max_size(self) -> usize {
        match self {
            Self::NonDestructive => FLASH_SIZE - BOOTLOADER_SIZE,
            Self::Destructive => FLASH_SIZE,
        }
    }

    /// Instruction that starts the upload.
    pub fn instruction(self) -> Instruction {
        match self {
            Self::NonDestructive => Instruction::Upload,
            Self::Destructive => Instruction::UploadDestructive,
        }
    }

    /// Instruction that reads back the CRC once the upload finished.
    pub fn readback_instruction(self) -> Instruction {
        match self {
            Self::NonDestructive => Instruction::ReadCrc,
            Self::Destructive => Instruction::Verify,
        }
    }

    /// Whether the upload overwrites the bootloader.
    pub fn is_destructive(self) -> bool {
        matches!(self, Self::Destructive)
    }
}

/// Pick the `len`-byte payload out of a raw response.
///
/// The payload is the `len` bytes right before the trailer; anything earlier
/// is bootloader chatter and ignored.
pub fn extract_response(raw: &[u8], len: usize) -> Result<&[u8]> {
    let needed = len + RESPONSE_TRAILER_LENGTH;
    if raw.len() < needed {
        return Err(Error::ResponseTooShort {
            expected: needed,
            received: raw.len(),
        });
    }
    let start = raw.len() - needed;
    Ok(&raw[start..start + len])
}
