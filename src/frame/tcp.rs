// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MBAP (TCP) ADU framing: a 7-byte header in front of the PDU.

/// 16 bit transaction identifier, echoed back by the slave so a master can
/// match a response to the request that produced it.
pub type TransactionId = u16;

/// Addresses a unit behind a Modbus/TCP-to-serial gateway; `0xFF` when the
/// slave is addressed directly over TCP.
pub type UnitId = u8;

/// The 7-byte MBAP header, minus the length field (which `codec::tcp`
/// derives from the PDU it is framing rather than storing redundantly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub transaction_id: TransactionId,
    pub unit_id: UnitId,
}

/// The fixed Modbus/TCP protocol identifier; any other value on the wire is
/// a framing error.
pub const PROTOCOL_ID: u16 = 0x0000;
