//! XMODEM-CRC sender for the AudioMoth bootloader.
//!
//! The device accepts 128-byte blocks only:
//!
//! ```text
//! +-----+-----+------+---------------+--------+
//! | SOH | SEQ | ~SEQ |   DATA (128)  | CRC16  |
//! +-----+-----+------+---------------+--------+
//! | 1   | 1   | 1    |      128      | 2 (BE) |
//! +-----+-----+------+---------------+--------+
//! ```
//!
//! The CRC covers the payload only. A short final block is padded with
//! `0xFF`, the erased-flash value.
//!
//! Every wait in this module is a bounded poll: `receive_cycles` reads, each
//! preceded by a `poll_delay` sleep. A wait therefore never exceeds
//! `receive_cycles × poll_delay` plus the port's own read time.

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::crc::crc16;
use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace, warn};
use std::thread;
use std::time::Duration;

/// XMODEM control characters.
pub mod control {
    /// Start of Header (128-byte block).
    pub const SOH: u8 = 0x01;
    /// Start of Text (1024-byte block, not accepted by the device).
    pub const STX: u8 = 0x02;
    /// End of Transmission.
    pub const EOT: u8 = 0x04;
    /// Acknowledge.
    pub const ACK: u8 = 0x06;
    /// Not Acknowledge.
    pub const NAK: u8 = 0x15;
}

/// Payload bytes per chunk.
pub const PAYLOAD_SIZE: usize = 128;

/// Bytes per chunk on the wire.
pub const CHUNK_SIZE: usize = 3 + PAYLOAD_SIZE + 2;

/// Fill byte for the tail of a short final chunk.
pub const PAD_BYTE: u8 = 0xFF;

/// Literal the receiver prints once it is ready for the first chunk.
pub const READY_SIGNAL: &[u8] = b"ReadyC";

/// One framed XMODEM chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    block: u8,
    payload: [u8; PAYLOAD_SIZE],
    consumed: usize,
    crc: u16,
}

impl Chunk {
    /// Build the chunk carrying the start of `source`.
    ///
    /// At most [`PAYLOAD_SIZE`] bytes are taken; a shorter source is padded
    /// with [`PAD_BYTE`].
    pub fn build(block: u8, source: &[u8]) -> Self {
        let consumed = source.len().min(PAYLOAD_SIZE);
        let mut payload = [PAD_BYTE; PAYLOAD_SIZE];
        payload[..consumed].copy_from_slice(&source[..consumed]);

        Self {
            block,
            payload,
            consumed,
            crc: crc16(&payload),
        }
    }

    /// Decode a chunk from its wire representation, validating all fields.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CHUNK_SIZE {
            return Err(Error::InvalidChunk(format!(
                "expected {CHUNK_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[0] != control::SOH {
            return Err(Error::InvalidChunk(format!(
                "bad start marker 0x{:02X}",
                bytes[0]
            )));
        }

        let block = bytes[1];
        if bytes[2] != !block {
            return Err(Error::InvalidChunk(format!(
                "block 0x{block:02X} has complement 0x{:02X}",
                bytes[2]
            )));
        }

        let mut payload = [0u8; PAYLOAD_SIZE];
        payload.copy_from_slice(&bytes[3..3 + PAYLOAD_SIZE]);
        let crc = BigEndian::read_u16(&bytes[3 + PAYLOAD_SIZE..]);
        let actual = crc16(&payload);
        if crc != actual {
            return Err(Error::CrcMismatch {
                expected: crc,
                actual,
            });
        }

        Ok(Self {
            block,
            payload,
            consumed: PAYLOAD_SIZE,
            crc,
        })
    }

    /// Serialize to the exact wire layout.
    pub fn to_bytes(&self) -> [u8; CHUNK_SIZE] {
        let mut bytes = [0u8; CHUNK_SIZE];
        bytes[0] = control::SOH;
        bytes[1] = self.block;
        bytes[2] = self.block_complement();
        bytes[3..3 + PAYLOAD_SIZE].copy_from_slice(&self.payload);
        BigEndian::write_u16(&mut bytes[3 + PAYLOAD_SIZE..], self.crc);
        bytes
    }

    /// Block number.
    pub fn block(&self) -> u8 {
        self.block
    }

    /// One's complement of the block number (`255 - block`).
    pub fn block_complement(&self) -> u8 {
        !self.block
    }

    /// Padded payload.
    pub fn payload(&self) -> &[u8; PAYLOAD_SIZE] {
        &self.payload
    }

    /// CRC16 of the payload.
    pub fn crc(&self) -> u16 {
        self.crc
    }

    /// Number of source bytes carried, excluding padding.
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

/// XMODEM timing and retry configuration.
#[derive(Debug, Clone)]
pub struct XmodemConfig {
    /// Number of polls before a wait gives up.
    pub receive_cycles: u32,
    /// Sleep before each poll.
    pub poll_delay: Duration,
    /// Consecutive rejected attempts allowed per chunk.
    pub max_retries: u32,
    /// Literal that must be seen before the first chunk.
    pub ready_signal: &'static [u8],
    /// Cancellation source, polled between chunks and before every read.
    pub interrupt: fn() -> bool,
}

impl Default for XmodemConfig {
    fn default() -> Self {
        Self {
            receive_cycles: 50,
            poll_delay: Duration::from_millis(10),
            max_retries: 10,
            ready_signal: READY_SIGNAL,
            interrupt: crate::is_interrupted_requested,
        }
    }
}

impl XmodemConfig {
    /// Longest time a single wait may take, excluding port read time.
    pub fn wait_bound(&self) -> Duration {
        self.poll_delay * self.receive_cycles
    }
}

/// Stage of a running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Waiting for the receiver's ready signal.
    AwaitReady,
    /// Sending the chunk that starts at `offset`.
    Sending {
        /// Block number of the chunk.
        block: u8,
        /// Offset of the chunk in the source data.
        offset: usize,
    },
    /// EOT written, waiting for its ACK.
    AwaitEofAck,
    /// All data acknowledged.
    Done,
}

/// Advance the ready-signal matcher by one received byte.
///
/// A mismatch restarts matching at the mismatching byte itself, without
/// re-aligning on a longer proper prefix the way KMP would. For signals with
/// no self-overlap, such as `ReadyC`, both behave the same.
fn advance_match(signal: &[u8], matched: usize, byte: u8) -> usize {
    if byte == signal[matched] {
        matched + 1
    } else if byte == signal[0] {
        1
    } else {
        0
    }
}

/// XMODEM transfer handler.
pub struct XmodemSender<'a, P: Port + ?Sized> {
    port: &'a mut P,
    config: XmodemConfig,
}

impl<'a, P: Port + ?Sized> XmodemSender<'a, P> {
    /// Create a new XMODEM sender with the default configuration.
    pub fn new(port: &'a mut P) -> Self {
        Self {
            port,
            config: XmodemConfig::default(),
        }
    }

    /// Create a new XMODEM sender with custom configuration.
    pub fn with_config(port: &'a mut P, config: XmodemConfig) -> Self {
        Self { port, config }
    }

    fn check_interrupted(&self) -> Result<()> {
        if (self.config.interrupt)() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Poll for a single byte, at most `receive_cycles` times.
    fn wait_for_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        for _ in 0..self.config.receive_cycles {
            self.check_interrupted()?;
            thread::sleep(self.config.poll_delay);
            if self.port.read_available(&mut buf)? == 1 {
                trace!("<= 0x{:02X}", buf[0]);
                return Ok(Some(buf[0]));
            }
        }
        Ok(None)
    }

    /// Wait for the receiver's ready signal.
    pub fn wait_for_ready(&mut self) -> Result<()> {
        let signal = self.config.ready_signal;
        if signal.is_empty() {
            return Ok(());
        }

        debug!(
            "Waiting for {:?} from receiver...",
            String::from_utf8_lossy(signal)
        );

        let mut matched = 0;
        let mut buf = [0u8; 1];
        for _ in 0..self.config.receive_cycles {
            self.check_interrupted()?;
            thread::sleep(self.config.poll_delay);
            if self.port.read_available(&mut buf)? == 0 {
                continue;
            }
            matched = advance_match(signal, matched, buf[0]);
            if matched == signal.len() {
                debug!("Receiver ready");
                return Ok(());
            }
        }

        Err(Error::ReadyTimeout)
    }

    /// Transfer `data` and return the number of bytes sent.
    ///
    /// `progress` is called with `(sent, total)` after every acknowledged
    /// chunk.
    pub fn send<F>(&mut self, data: &[u8], mut progress: F) -> Result<usize>
    where
        F: FnMut(usize, usize),
    {
        let total = data.len();
        debug!("Starting XMODEM transfer ({total} bytes)");

        let mut failures = 0u32;
        let mut state = TransferState::AwaitReady;

        loop {
            state = match state {
                TransferState::AwaitReady => {
                    self.wait_for_ready()?;
                    TransferState::Sending {
                        block: 1,
                        offset: 0,
                    }
                },
                TransferState::Sending { offset, .. } if offset >= total => {
                    debug!("Sending EOT");
                    self.port.write_exact(&[control::EOT])?;
                    TransferState::AwaitEofAck
                },
                TransferState::Sending { block, offset } => {
                    self.check_interrupted()?;
                    let chunk = Chunk::build(block, &data[offset..]);
                    trace!(
                        "=> block {block} ({} bytes, crc 0x{:04X}, attempt {})",
                        chunk.consumed(),
                        chunk.crc(),
                        failures + 1
                    );
                    self.port.write_exact(&chunk.to_bytes())?;

                    match self.wait_for_byte()? {
                        None => return Err(Error::ChunkResponseTimeout { block }),
                        Some(control::ACK) => {
                            failures = 0;
                            let offset = offset + chunk.consumed();
                            progress(offset, total);
                            TransferState::Sending {
                                block: block.wrapping_add(1),
                                offset,
                            }
                        },
                        Some(response) => {
                            failures += 1;
                            if failures >= self.config.max_retries {
                                return Err(Error::ChunkRetriesExceeded {
                                    block,
                                    attempts: failures,
                                });
                            }
                            if response == control::NAK {
                                warn!("Block {block} NAKed, retrying...");
                            } else {
                                warn!(
                                    "Unexpected response 0x{response:02X} to block {block}, \
                                     retrying..."
                                );
                            }
                            TransferState::Sending { block, offset }
                        },
                    }
                },
                TransferState::AwaitEofAck => match self.wait_for_byte()? {
                    Some(control::ACK) => TransferState::Done,
                    Some(response) => return Err(Error::EofAckRejected(response)),
                    None => return Err(Error::EofAckTimeout),
                },
                TransferState::Done => {
                    debug!("XMODEM transfer complete");
                    return Ok(total);
                },
            };
        }
    }
}
