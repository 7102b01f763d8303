// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Modbus PDU: the function-code-plus-payload portion of a message,
//! independent of RTU or TCP framing.

pub mod rtu;
pub mod tcp;

use std::fmt;

use bytes::Bytes;

/// A Modbus function code, `1..=127` for normal operations, with the high
/// bit set (`fc | 0x80`) marking an exception response.
pub type FunctionCode = u8;

/// A 0-based Modbus protocol address.
pub type Address = u16;

/// Modbus data items are 16 bit, big-endian on the wire.
pub type Word = u16;

/// Number of bits or words to read/write.
pub type Quantity = u16;

pub const FC_READ_COILS: FunctionCode = 0x01;
pub const FC_READ_DISCRETE_INPUTS: FunctionCode = 0x02;
pub const FC_READ_HOLDING_REGISTERS: FunctionCode = 0x03;
pub const FC_READ_INPUT_REGISTERS: FunctionCode = 0x04;
pub const FC_WRITE_SINGLE_COIL: FunctionCode = 0x05;
pub const FC_WRITE_SINGLE_REGISTER: FunctionCode = 0x06;
pub const FC_READ_EXCEPTION_STATUS: FunctionCode = 0x07;
pub const FC_WRITE_MULTIPLE_COILS: FunctionCode = 0x0F;
pub const FC_WRITE_MULTIPLE_REGISTERS: FunctionCode = 0x10;
pub const FC_REPORT_SLAVE_ID: FunctionCode = 0x11;
pub const FC_MASK_WRITE_REGISTER: FunctionCode = 0x16;
pub const FC_READ_WRITE_MULTIPLE_REGISTERS: FunctionCode = 0x17;

/// High bit that marks a response PDU as an exception.
pub const EXCEPTION_BIT: FunctionCode = 0x80;

/// Selects which of the two shapes a function code with asymmetric
/// request/response layouts (0x03, 0x04, 0x10, 0x17) should parse as.
/// Encoding never needs this: the [`Pdu`] variant already determines it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

/// One of the four standard Modbus exceptions this engine generates or
/// recognizes (vendor/diagnostic subcodes are out of scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
}

impl ExceptionCode {
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::IllegalFunction => "illegal function",
            Self::IllegalDataAddress => "illegal data address",
            Self::IllegalDataValue => "illegal data value",
            Self::ServerDeviceFailure => "server device failure",
        }
    }
}

impl TryFrom<u8> for ExceptionCode {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x01 => Ok(Self::IllegalFunction),
            0x02 => Ok(Self::IllegalDataAddress),
            0x03 => Ok(Self::IllegalDataValue),
            0x04 => Ok(Self::ServerDeviceFailure),
            other => Err(other),
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl std::error::Error for ExceptionCode {}

/// A Modbus PDU, tagged by the wire shape of its function code and
/// direction (request vs. response).
///
/// `Custom` carries any recognized-but-undispatched function code (0x07,
/// 0x11) and any function code this engine doesn't know about at all, so
/// that the slave dispatcher can still answer with an illegal-function
/// exception instead of silently dropping the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu {
    ReadRequest {
        function: FunctionCode,
        address: Address,
        quantity: Quantity,
    },
    ReadResponse {
        function: FunctionCode,
        payload: Bytes,
    },
    WriteSingle {
        function: FunctionCode,
        address: Address,
        value: Word,
    },
    WriteMultipleRequest {
        function: FunctionCode,
        address: Address,
        quantity: Quantity,
        payload: Bytes,
    },
    WriteMultipleResponse {
        function: FunctionCode,
        address: Address,
        quantity: Quantity,
    },
    MaskWrite {
        address: Address,
        and_mask: Word,
        or_mask: Word,
    },
    ReadWriteMultipleRequest {
        read_address: Address,
        read_quantity: Quantity,
        write_address: Address,
        write_quantity: Quantity,
        payload: Bytes,
    },
    ReadWriteMultipleResponse {
        payload: Bytes,
    },
    Custom {
        function: FunctionCode,
        payload: Bytes,
    },
    Exception {
        function: FunctionCode,
        code: ExceptionCode,
    },
}

impl Pdu {
    /// The function code this PDU carries, with the exception high bit set
    /// for [`Pdu::Exception`].
    #[must_use]
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadRequest { function, .. }
            | Self::ReadResponse { function, .. }
            | Self::WriteSingle { function, .. }
            | Self::WriteMultipleRequest { function, .. }
            | Self::WriteMultipleResponse { function, .. }
            | Self::Custom { function, .. } => *function,
            Self::MaskWrite { .. } => FC_MASK_WRITE_REGISTER,
            Self::ReadWriteMultipleRequest { .. } | Self::ReadWriteMultipleResponse { .. } => {
                FC_READ_WRITE_MULTIPLE_REGISTERS
            }
            Self::Exception { function, .. } => function | EXCEPTION_BIT,
        }
    }

    /// Builds the standard exception PDU for `function` failing with `code`.
    #[must_use]
    pub fn exception(function: FunctionCode, code: ExceptionCode) -> Self {
        Self::Exception { function, code }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_code_round_trips() {
        for raw in 1u8..=4 {
            let code = ExceptionCode::try_from(raw).unwrap();
            assert_eq!(code as u8, raw);
        }
        assert!(ExceptionCode::try_from(0x05).is_err());
    }

    #[test]
    fn function_code_sets_high_bit_for_exceptions() {
        let pdu = Pdu::exception(0x03, ExceptionCode::IllegalDataValue);
        assert_eq!(pdu.function_code(), 0x83);
    }
}
