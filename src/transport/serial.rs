// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serial (RTU) transport backed by the synchronous [`serialport`] crate.

use std::io::{self, ErrorKind};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::Transport;

/// Serial port parameters. Mirrors the handful of settings Modbus RTU
/// actually needs; flow control is always `None`, matching the wire
/// protocol (there's no separate flow-control channel on an RS-485 bus).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud_rate: 19200,
            data_bits: DataBits::Eight,
            parity: Parity::Even,
            stop_bits: StopBits::One,
        }
    }
}

/// A [`Transport`] over a real serial port.
pub struct SerialTransport {
    config: SerialConfig,
    read_timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    #[must_use]
    pub fn new(config: SerialConfig, read_timeout: Duration) -> Self {
        Self {
            config,
            read_timeout,
            port: None,
        }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> io::Result<()> {
        let port = serialport::new(&self.config.path, self.config.baud_rate)
            .data_bits(self.config.data_bits)
            .parity(self.config.parity)
            .stop_bits(self.config.stop_bits)
            .flow_control(FlowControl::None)
            // A short read timeout keeps `read()` effectively non-blocking:
            // it just bounds how long one OS-level read call may wait.
            .timeout(self.read_timeout.min(Duration::from_millis(5)))
            .open()
            .map_err(|err| io::Error::new(ErrorKind::Other, err))?;
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.port = None;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(port) = self.port.as_mut() else {
            return Err(io::Error::new(ErrorKind::NotConnected, "port not open"));
        };
        match port.read(buf) {
            Ok(n) => Ok(n),
            // serialport surfaces a timed-out read as `TimedOut`; that's
            // "no data right now", not a failure, for our polling loop.
            Err(err) if err.kind() == ErrorKind::TimedOut => Ok(0),
            Err(err) => Err(err),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        let Some(port) = self.port.as_mut() else {
            return Err(io::Error::new(ErrorKind::NotConnected, "port not open"));
        };
        port.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.port.is_none() {
            return Err(io::Error::new(ErrorKind::NotConnected, "port not open"));
        }
        let mut scratch = [0u8; 256];
        loop {
            if self.read(&mut scratch)? == 0 {
                return Ok(());
            }
        }
    }
}
