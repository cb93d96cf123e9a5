//! Raw firmware image loading.
//!
//! AudioMoth firmware is a flat binary written from the start of the
//! selected flash area. The only checks possible before talking to the
//! device are that the image is non-empty and fits the area.

use crate::error::{Error, Result};
use crate::protocol::xmodem::PAYLOAD_SIZE;
use crate::target::audiomoth::protocol::UploadMode;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// A firmware image validated for one upload mode.
#[derive(Debug, Clone)]
pub struct Firmware {
    data: Vec<u8>,
    mode: UploadMode,
    path: Option<PathBuf>,
}

impl Firmware {
    /// Load an image from disk.
    pub fn from_file<P: AsRef<Path>>(path: P, mode: UploadMode) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading firmware from: {}", path.display());

        let data = fs::read(path).map_err(|source| Error::FileUnreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let mut firmware = Self::from_bytes(data, mode)?;
        firmware.path = Some(path.to_path_buf());
        Ok(firmware)
    }

    /// Wrap an in-memory image.
    pub fn from_bytes(data: Vec<u8>, mode: UploadMode) -> Result<Self> {
        check_size(data.len(), mode)?;
        Ok(Self {
            data,
            mode,
            path: None,
        })
    }

    /// Image contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Image size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false for a validated image.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Upload mode the image was validated for.
    pub fn mode(&self) -> UploadMode {
        self.mode
    }

    /// Source path, for images loaded from disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of XMODEM chunks the image occupies.
    pub fn chunk_count(&self) -> usize {
        self.data.len().div_ceil(PAYLOAD_SIZE)
    }
}

/// Check an image size against the limit of `mode`.
pub fn check_size(size: usize, mode: UploadMode) -> Result<()> {
    if size == 0 {
        return Err(Error::FileEmpty);
    }
    let limit = mode.max_size();
    if size > limit {
        return Err(Error::FileTooLarge { size, limit });
    }
    Ok(())
}
