//! In-memory port for protocol tests.
//!
//! Each write releases the next scripted reply into the receive queue, which
//! mimics a device that answers every instruction or chunk it receives.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::port::Port;

/// Scripted serial port with separate read/write buffers.
pub(crate) struct MockPort {
    rx: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    noise: Option<u8>,
    write_limit: Option<usize>,
    timeout_errors: bool,
    closed: Arc<AtomicBool>,
}

impl MockPort {
    pub(crate) fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            replies: VecDeque::new(),
            writes: Vec::new(),
            noise: None,
            write_limit: None,
            timeout_errors: false,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bytes already waiting in the receive buffer when the port is opened.
    pub(crate) fn with_pending(mut self, bytes: &[u8]) -> Self {
        self.rx.extend(bytes);
        self
    }

    /// Reply released by the next write; an empty reply means silence.
    pub(crate) fn reply(mut self, bytes: &[u8]) -> Self {
        self.replies.push_back(bytes.to_vec());
        self
    }

    /// Same reply for the next `count` writes.
    pub(crate) fn reply_n(mut self, bytes: &[u8], count: usize) -> Self {
        for _ in 0..count {
            self.replies.push_back(bytes.to_vec());
        }
        self
    }

    /// Every read returns this byte, forever.
    pub(crate) fn with_noise(mut self, byte: u8) -> Self {
        self.noise = Some(byte);
        self
    }

    /// Accept at most `limit` bytes per write call.
    pub(crate) fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Report empty reads as `TimedOut` errors like `serialport` does.
    pub(crate) fn with_timeout_errors(mut self) -> Self {
        self.timeout_errors = true;
        self
    }

    pub(crate) fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// Shared flag set once the port is closed.
    pub(crate) fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(std::io::Error::new(ErrorKind::NotConnected, "port closed"));
        }
        if let Some(byte) = self.noise {
            buf.fill(byte);
            return Ok(buf.len());
        }
        if self.rx.is_empty() {
            if self.timeout_errors {
                return Err(std::io::Error::new(ErrorKind::TimedOut, "no data"));
            }
            return Ok(0);
        }
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(std::io::Error::new(ErrorKind::NotConnected, "port closed"));
        }
        let n = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        self.writes.push(buf[..n].to_vec());
        if let Some(reply) = self.replies.pop_front() {
            self.rx.extend(reply);
        }
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}
