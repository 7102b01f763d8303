// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TCP transport backed by [`std::net::TcpStream`].

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::Transport;

/// Socket parameters for opening a fresh Modbus/TCP connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    pub addr: SocketAddr,
}

/// A [`Transport`] over a TCP stream, either opened by this crate
/// ([`TcpTransport::new`]) or adopted from an already-connected stream
/// ([`TcpTransport::adopt`], e.g. a socket handed over by an accept loop
/// the caller owns).
pub struct TcpTransport {
    addr: Option<SocketAddr>,
    read_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    #[must_use]
    pub fn new(config: TcpConfig, read_timeout: Duration) -> Self {
        Self {
            addr: Some(config.addr),
            read_timeout,
            stream: None,
        }
    }

    /// Wraps an already-connected stream; `open()` becomes a no-op.
    #[must_use]
    pub fn adopt(stream: TcpStream, read_timeout: Duration) -> Self {
        Self {
            addr: None,
            read_timeout,
            stream: Some(stream),
        }
    }

    fn configure(stream: &TcpStream, read_timeout: Duration) -> io::Result<()> {
        stream.set_read_timeout(Some(read_timeout.max(Duration::from_millis(1))))?;
        stream.set_nodelay(true)
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> io::Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let addr = self
            .addr
            .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "no address to connect to"))?;
        let stream = TcpStream::connect(addr.to_socket_addrs()?.next().unwrap_or(addr))?;
        Self::configure(&stream, self.read_timeout)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.stream = None;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::Read;
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::Error::new(ErrorKind::NotConnected, "socket not open"));
        };
        match stream.read(buf) {
            Ok(n) => Ok(n),
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        use std::io::Write;
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::Error::new(ErrorKind::NotConnected, "socket not open"));
        };
        stream.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.stream.is_none() {
            return Err(io::Error::new(ErrorKind::NotConnected, "socket not open"));
        }
        let mut scratch = [0u8; 256];
        loop {
            if self.read(&mut scratch)? == 0 {
                return Ok(());
            }
        }
    }
}
