//! Protocol implementations.

pub mod crc;
pub mod xmodem;

// Re-export common types
pub use crc::crc16;
pub use xmodem::{Chunk, TransferState, XmodemConfig, XmodemSender, control};
