// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The transport port: the minimal synchronous byte-stream contract
//! `Instance` needs from a serial line or TCP socket.

#[cfg(feature = "rtu")]
pub mod serial;
#[cfg(feature = "tcp")]
pub mod tcp;

use std::io;
use std::time::Duration;

/// Timeouts governing RTU frame delimitation (`Instance::backend_read`):
/// how long to wait for the first byte of a frame, and how long a silence
/// between bytes means the frame is complete.
///
/// Also used as the read timeout for a TCP transport, where `ack_ms`
/// bounds waiting for the first byte of a response and `byte_ms` is
/// unused (TCP framing is length-delimited, not silence-delimited).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Timeout waiting for the first byte of a frame to arrive.
    pub ack_ms: u32,
    /// Timeout for silence between two bytes of the same frame.
    pub byte_ms: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ack_ms: 300,
            byte_ms: 32,
        }
    }
}

impl Timeouts {
    #[must_use]
    pub const fn ack(self) -> Duration {
        Duration::from_millis(self.ack_ms as u64)
    }

    #[must_use]
    pub const fn byte(self) -> Duration {
        Duration::from_millis(self.byte_ms as u64)
    }
}

/// The byte-stream contract a concrete backend (serial port, TCP socket)
/// provides to `Instance`.
///
/// `read` must be non-blocking: it returns `Ok(0)` immediately when no
/// data is currently available, rather than blocking until some arrives.
/// The dual-timeout polling loop in `Instance::backend_read` is what turns
/// repeated `Ok(0)` calls into a bounded wait.
pub trait Transport: Send {
    /// Opens (or re-opens) the underlying port. A no-op for backends that
    /// adopt an already-open connection.
    fn open(&mut self) -> io::Result<()>;

    /// Closes the underlying port. Idempotent.
    fn close(&mut self) -> io::Result<()>;

    /// Reads into `buf`, returning the number of bytes read. Returns
    /// `Ok(0)` if no data is available right now; never blocks.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes all of `buf`, blocking until it has been accepted by the OS.
    fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Drains any bytes already buffered on the incoming side, discarding
    /// them. Used to clear stale input left over from an aborted or
    /// timed-out transaction before a new request is sent.
    fn flush(&mut self) -> io::Result<()>;
}
