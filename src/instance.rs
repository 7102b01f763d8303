// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `Instance`: a single Modbus connection, either RTU or TCP, playing
//! either the master or the slave role. Owns its transport and the
//! scratch buffers needed to frame and deframe PDUs over it.

use std::fmt;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

#[cfg(feature = "rtu")]
use crate::transport::serial::{SerialConfig, SerialTransport};
#[cfg(feature = "tcp")]
use crate::transport::tcp::{TcpConfig, TcpTransport};

use crate::codec::rtu::RtuCodec;
use crate::codec::tcp::TcpCodec;
use crate::error::Result;
use crate::frame::tcp::{Header as TcpHeader, UnitId};
use crate::frame::{Direction, Pdu};
use crate::slave::SlaveId;
use crate::transport::{Timeouts, Transport};

/// Which side of a Modbus conversation this `Instance` plays. Determines
/// whether incoming RTU frames are sniffed as requests or responses, and
/// whether a fresh transaction id is minted on send (master) or merely
/// echoed back (slave).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

enum Wire {
    #[cfg(feature = "rtu")]
    Rtu { slave_id: SlaveId, codec: RtuCodec },
    #[cfg(feature = "tcp")]
    Tcp {
        unit_id: UnitId,
        codec: TcpCodec,
        next_transaction_id: u16,
    },
}

/// A single decoded ADU, with its wire-specific addressing information
/// still attached; `Instance::transact`/`slave_step` are what strip it
/// down to a bare [`Pdu`].
enum WireFrame {
    #[cfg(feature = "rtu")]
    Rtu(SlaveId, Bytes),
    #[cfg(feature = "tcp")]
    Tcp(TcpHeader, Bytes),
}

struct Io {
    transport: Box<dyn Transport>,
    timeouts: Timeouts,
    rx: BytesMut,
}

impl Io {
    /// Reads and decodes one frame, honoring the dual-timeout contract:
    /// `ack_ms` bounds the wait for the first byte of a frame, `byte_ms`
    /// bounds the silence between any two bytes of the same frame. Both
    /// elapsing with an incomplete frame buffered is reported as `Ok(None)`
    /// (a timeout), not an error — timeouts are an expected, frequent
    /// outcome on a shared bus, not a failure.
    fn poll<D>(&mut self, codec: &mut D) -> io::Result<Option<D::Item>>
    where
        D: Decoder<Error = io::Error>,
    {
        const POLL_QUANTUM: Duration = Duration::from_millis(2);

        let ack_deadline = Instant::now() + self.timeouts.ack();
        let mut last_byte_at: Option<Instant> = None;
        let mut scratch = [0u8; 256];

        loop {
            if let Some(item) = codec.decode(&mut self.rx)? {
                return Ok(Some(item));
            }

            let now = Instant::now();
            let timed_out = match last_byte_at {
                Some(last) => now.duration_since(last) > self.timeouts.byte(),
                None => now >= ack_deadline,
            };
            if timed_out {
                return Ok(None);
            }

            let n = self.transport.read(&mut scratch)?;
            if n > 0 {
                self.rx.extend_from_slice(&scratch[..n]);
                last_byte_at = Some(Instant::now());
            } else {
                thread::sleep(POLL_QUANTUM);
            }
        }
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.transport.write(bytes)
    }

    /// Discards any bytes left over from a prior transaction, both the
    /// undecoded tail in `rx` and whatever the transport itself still has
    /// buffered, so a stale reply can't be mistaken for the next one.
    fn discard_stale_input(&mut self) -> io::Result<()> {
        self.rx.clear();
        self.transport.flush()
    }
}

/// A single Modbus RTU or TCP connection, bound to one role.
///
/// Not `Sync`: every public method takes `&mut self`, so the borrow
/// checker already enforces the "one operation in flight per instance at
/// a time" rule without any extra marker trait.
pub struct Instance {
    io: Io,
    wire: Wire,
    role: Role,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl Instance {
    #[cfg(feature = "rtu")]
    pub fn new_rtu(
        config: SerialConfig,
        slave_id: SlaveId,
        timeouts: Timeouts,
        role: Role,
    ) -> Result<Self> {
        let mut transport = SerialTransport::new(config, timeouts.byte());
        transport.open()?;
        let direction = match role {
            Role::Master => Direction::Response,
            Role::Slave => Direction::Request,
        };
        Ok(Self {
            io: Io {
                transport: Box::new(transport),
                timeouts,
                rx: BytesMut::with_capacity(256),
            },
            wire: Wire::Rtu {
                slave_id,
                codec: RtuCodec::new(direction),
            },
            role,
        })
    }

    #[cfg(feature = "tcp")]
    pub fn new_tcp(
        config: TcpConfig,
        unit_id: UnitId,
        timeouts: Timeouts,
        role: Role,
    ) -> Result<Self> {
        let mut transport = TcpTransport::new(config, timeouts.ack());
        transport.open()?;
        Ok(Self {
            io: Io {
                transport: Box::new(transport),
                timeouts,
                rx: BytesMut::with_capacity(256),
            },
            wire: Wire::Tcp {
                unit_id,
                codec: TcpCodec,
                next_transaction_id: 0,
            },
            role,
        })
    }

    /// Builds an RTU instance around an arbitrary [`Transport`], bypassing
    /// [`SerialTransport`] entirely. Mainly useful for testing against a
    /// loopback or mock transport instead of a real serial port.
    #[cfg(feature = "rtu")]
    pub fn new_rtu_with_transport(
        transport: impl Transport + 'static,
        slave_id: SlaveId,
        timeouts: Timeouts,
        role: Role,
    ) -> Self {
        let direction = match role {
            Role::Master => Direction::Response,
            Role::Slave => Direction::Request,
        };
        Self {
            io: Io {
                transport: Box::new(transport),
                timeouts,
                rx: BytesMut::with_capacity(256),
            },
            wire: Wire::Rtu {
                slave_id,
                codec: RtuCodec::new(direction),
            },
            role,
        }
    }

    /// As [`Instance::new_rtu_with_transport`], for TCP.
    #[cfg(feature = "tcp")]
    pub fn new_tcp_with_transport(
        transport: impl Transport + 'static,
        unit_id: UnitId,
        timeouts: Timeouts,
        role: Role,
    ) -> Self {
        Self {
            io: Io {
                transport: Box::new(transport),
                timeouts,
                rx: BytesMut::with_capacity(256),
            },
            wire: Wire::Tcp {
                unit_id,
                codec: TcpCodec,
                next_transaction_id: 0,
            },
            role,
        }
    }

    #[cfg(feature = "tcp")]
    pub fn new_tcp_adopted(
        stream: std::net::TcpStream,
        unit_id: UnitId,
        timeouts: Timeouts,
        role: Role,
    ) -> Self {
        let transport = TcpTransport::adopt(stream, timeouts.ack());
        Self {
            io: Io {
                transport: Box::new(transport),
                timeouts,
                rx: BytesMut::with_capacity(256),
            },
            wire: Wire::Tcp {
                unit_id,
                codec: TcpCodec,
                next_transaction_id: 0,
            },
            role,
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    fn read_frame(&mut self) -> io::Result<Option<WireFrame>> {
        match &mut self.wire {
            #[cfg(feature = "rtu")]
            Wire::Rtu { codec, .. } => Ok(self
                .io
                .poll(codec)?
                .map(|(slave_id, pdu)| WireFrame::Rtu(slave_id, pdu))),
            #[cfg(feature = "tcp")]
            Wire::Tcp { codec, .. } => Ok(self
                .io
                .poll(codec)?
                .map(|(header, pdu)| WireFrame::Tcp(header, pdu))),
        }
    }

    /// Sends `pdu` addressed to this instance's configured slave/unit id
    /// and, for TCP, returns the transaction id the caller must match the
    /// response against.
    fn send_pdu(&mut self, pdu: &Pdu) -> io::Result<u16> {
        let mut pdu_buf = BytesMut::new();
        crate::codec::pdu::pdu_make(&mut pdu_buf, pdu);
        let pdu_bytes = pdu_buf.freeze();

        match &mut self.wire {
            #[cfg(feature = "rtu")]
            Wire::Rtu { slave_id, codec } => {
                let mut out = BytesMut::new();
                codec.encode((*slave_id, pdu_bytes), &mut out)?;
                self.io.send(&out)?;
                Ok(0)
            }
            #[cfg(feature = "tcp")]
            Wire::Tcp {
                unit_id,
                codec,
                next_transaction_id,
            } => {
                let transaction_id = *next_transaction_id;
                *next_transaction_id = next_transaction_id.wrapping_add(1);
                let header = TcpHeader {
                    transaction_id,
                    unit_id: *unit_id,
                };
                let mut out = BytesMut::new();
                codec.encode((header, pdu_bytes), &mut out)?;
                self.io.send(&out)?;
                Ok(transaction_id)
            }
        }
    }

    /// Sends `request` and waits for the matching response, per §4.7: a
    /// response from the wrong slave/unit id or a stale transaction id is
    /// discarded and the wait continues until `ack_ms` since the request
    /// was sent has elapsed, at which point `Ok(None)` (a timeout) is
    /// returned.
    pub(crate) fn transact(&mut self, request: &Pdu) -> Result<Option<Pdu>> {
        self.io.discard_stale_input()?;
        let sent_transaction_id = self.send_pdu(request)?;
        let deadline = Instant::now() + self.io.timeouts.ack();

        loop {
            let Some(frame) = self.read_frame()? else {
                return Ok(None);
            };
            match frame {
                #[cfg(feature = "rtu")]
                WireFrame::Rtu(slave_id, pdu_bytes) => {
                    if let Wire::Rtu {
                        slave_id: expected, ..
                    } = &self.wire
                    {
                        if slave_id != *expected {
                            if Instant::now() >= deadline {
                                return Ok(None);
                            }
                            continue;
                        }
                    }
                    return Ok(Some(crate::codec::pdu::pdu_parse(
                        &pdu_bytes,
                        Direction::Response,
                    )?));
                }
                #[cfg(feature = "tcp")]
                WireFrame::Tcp(header, pdu_bytes) => {
                    if header.transaction_id != sent_transaction_id {
                        if Instant::now() >= deadline {
                            return Ok(None);
                        }
                        continue;
                    }
                    return Ok(Some(crate::codec::pdu::pdu_parse(
                        &pdu_bytes,
                        Direction::Response,
                    )?));
                }
            }
        }
    }

    /// Waits for one incoming request frame, per §4.8. Returns `None` on
    /// timeout (no frame arrived within `ack_ms`/`byte_ms`).
    pub(crate) fn receive_request(&mut self) -> Result<Option<(Pdu, RequestOrigin)>> {
        let Some(frame) = self.read_frame()? else {
            return Ok(None);
        };
        match frame {
            #[cfg(feature = "rtu")]
            WireFrame::Rtu(slave_id, pdu_bytes) => {
                let pdu = crate::codec::pdu::pdu_parse(&pdu_bytes, Direction::Request)?;
                Ok(Some((pdu, RequestOrigin::Rtu { slave_id })))
            }
            #[cfg(feature = "tcp")]
            WireFrame::Tcp(header, pdu_bytes) => {
                let pdu = crate::codec::pdu::pdu_parse(&pdu_bytes, Direction::Request)?;
                Ok(Some((pdu, RequestOrigin::Tcp { header })))
            }
        }
    }

    /// Whether a request from `origin` is addressed to this instance: an
    /// exact slave/unit id match, an RTU broadcast (`slave_id == 0`,
    /// delivered to every slave but never answered), or this instance's
    /// unit id configured as `0xFF` (TCP accept-any).
    pub(crate) fn accepts(&self, origin: &RequestOrigin) -> bool {
        match (&self.wire, origin) {
            #[cfg(feature = "rtu")]
            (Wire::Rtu { slave_id, .. }, RequestOrigin::Rtu { slave_id: from }) => {
                *from == 0 || *from == *slave_id
            }
            #[cfg(feature = "tcp")]
            (Wire::Tcp { unit_id, .. }, RequestOrigin::Tcp { header }) => {
                *unit_id == 0xFF || header.unit_id == *unit_id
            }
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    /// Sends `response` back to whichever peer `origin` identifies.
    /// Broadcast RTU requests (`slave_id == 0`) never get a reply, per the
    /// protocol's one-way broadcast convention.
    pub(crate) fn send_response(&mut self, origin: RequestOrigin, response: &Pdu) -> Result<()> {
        let mut pdu_buf = BytesMut::new();
        crate::codec::pdu::pdu_make(&mut pdu_buf, response);
        let pdu_bytes = pdu_buf.freeze();

        match (origin, &mut self.wire) {
            #[cfg(feature = "rtu")]
            (RequestOrigin::Rtu { slave_id }, Wire::Rtu { codec, .. }) => {
                if slave_id == 0 {
                    return Ok(());
                }
                let mut out = BytesMut::new();
                codec.encode((slave_id, pdu_bytes), &mut out)?;
                self.io.send(&out)?;
            }
            #[cfg(feature = "tcp")]
            (RequestOrigin::Tcp { header }, Wire::Tcp { codec, .. }) => {
                let mut out = BytesMut::new();
                codec.encode((header, pdu_bytes), &mut out)?;
                self.io.send(&out)?;
            }
            #[allow(unreachable_patterns)]
            _ => unreachable!("request origin always matches this instance's wire kind"),
        }
        Ok(())
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if let Err(err) = self.io.transport.close() {
            log::warn!("error closing transport: {err}");
        }
    }
}

/// Identifies which peer a received request came from, so the slave
/// dispatcher can address its response back to the same peer.
pub(crate) enum RequestOrigin {
    #[cfg(feature = "rtu")]
    Rtu { slave_id: SlaveId },
    #[cfg(feature = "tcp")]
    Tcp { header: TcpHeader },
}
