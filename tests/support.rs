// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-memory duplex [`Transport`], standing in for a serial port or TCP
//! socket so master/slave round trips can run in-process without any real
//! I/O.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use modbus_engine::transport::Transport;

/// One end of a loopback pair; everything written here shows up on the
/// other end's `read`, and vice versa.
pub struct Loopback {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    outbound: Arc<Mutex<VecDeque<u8>>>,
}

/// Builds a connected pair of loopback transports.
#[allow(dead_code)]
pub fn pair() -> (Loopback, Loopback) {
    let a_to_b = Arc::new(Mutex::new(VecDeque::new()));
    let b_to_a = Arc::new(Mutex::new(VecDeque::new()));
    (
        Loopback {
            inbound: b_to_a.clone(),
            outbound: a_to_b.clone(),
        },
        Loopback {
            inbound: a_to_b,
            outbound: b_to_a,
        },
    )
}

impl Transport for Loopback {
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbound = self.inbound.lock().unwrap();
        let n = inbound.len().min(buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = inbound.pop_front().expect("checked length above");
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.outbound.lock().unwrap().extend(buf.iter().copied());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inbound.lock().unwrap().clear();
        Ok(())
    }
}

/// Wraps a [`Transport`], recording every byte written to it. Lets a test
/// inspect the raw frames a master sent without otherwise changing the
/// transport's behavior.
pub struct Tap<T> {
    inner: T,
    sent: Arc<Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl<T: Transport> Tap<T> {
    pub fn new(inner: T) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                inner,
                sent: sent.clone(),
            },
            sent,
        )
    }
}

impl<T: Transport> Transport for Tap<T> {
    fn open(&mut self) -> io::Result<()> {
        self.inner.open()
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.close()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A transport that yields `first_chunk` on its very first read and never
/// produces another byte afterwards, simulating a peer that starts a
/// response and then goes silent mid-frame.
pub struct StallingTransport {
    first_chunk: Option<Vec<u8>>,
}

#[allow(dead_code)]
impl StallingTransport {
    pub fn new(first_chunk: Vec<u8>) -> Self {
        Self {
            first_chunk: Some(first_chunk),
        }
    }
}

impl Transport for StallingTransport {
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(chunk) = self.first_chunk.take() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn write(&mut self, _buf: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
