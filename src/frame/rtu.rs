// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU ADU framing: a one-byte slave address in front of the PDU, a
//! CRC-16/Modbus behind it.

use crate::slave::SlaveId;

/// The address portion of an RTU frame; the CRC is handled entirely by
/// `codec::rtu` and never surfaces as part of the frame's logical header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub slave_id: SlaveId,
}
