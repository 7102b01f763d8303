// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encoding and decoding of [`Pdu`] values to and from their raw
//! function-code-plus-payload byte representation.

use byteorder::{BigEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::io::{self, Cursor};

use crate::frame::{
    Direction, ExceptionCode, FunctionCode, Pdu, Quantity, FC_MASK_WRITE_REGISTER, FC_READ_COILS,
    FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_READ_WRITE_MULTIPLE_REGISTERS, FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS,
    FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER, EXCEPTION_BIT,
};
use crate::wire::{bitmap_get, bitmap_set, packed_len};

/// Failures `pdu_parse` can report; distinct from [`ExceptionCode`], which
/// is a *protocol*-level failure a peer sent us, not a local decode error.
///
/// An unrecognized function code is not a [`ParseError`]: it decodes as
/// [`Pdu::Custom`], leaving the illegal-function-vs-malformed decision to
/// the caller (the slave dispatcher turns `Custom` into an exception; the
/// master treats it as a communication failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The buffer was shorter than the function code requires, or a byte
    /// count field didn't match the remaining payload.
    Malformed,
    /// A quantity field fell outside the range the function code allows
    /// (1..=2000 for bit quantities, 1..=125 for register quantities).
    QuantityOutOfRange,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed PDU"),
            Self::QuantityOutOfRange => write!(f, "quantity out of range"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<io::Error> for ParseError {
    fn from(_: io::Error) -> Self {
        Self::Malformed
    }
}

/// Encodes `pdu` into `buf`, returning the number of bytes written.
///
/// The direction is never ambiguous on encode: the [`Pdu`] variant already
/// picks the request or response shape.
pub fn pdu_make(buf: &mut BytesMut, pdu: &Pdu) -> usize {
    let start = buf.len();
    match pdu {
        Pdu::ReadRequest {
            function,
            address,
            quantity,
        } => {
            buf.put_u8(*function);
            buf.put_u16(*address);
            buf.put_u16(*quantity);
        }
        Pdu::ReadResponse { function, payload } => {
            buf.put_u8(*function);
            buf.put_u8(payload.len() as u8);
            buf.put_slice(payload);
        }
        Pdu::WriteSingle {
            function,
            address,
            value,
        } => {
            buf.put_u8(*function);
            buf.put_u16(*address);
            buf.put_u16(*value);
        }
        Pdu::WriteMultipleRequest {
            function,
            address,
            quantity,
            payload,
        } => {
            buf.put_u8(*function);
            buf.put_u16(*address);
            buf.put_u16(*quantity);
            buf.put_u8(payload.len() as u8);
            buf.put_slice(payload);
        }
        Pdu::WriteMultipleResponse {
            function,
            address,
            quantity,
        } => {
            buf.put_u8(*function);
            buf.put_u16(*address);
            buf.put_u16(*quantity);
        }
        Pdu::MaskWrite {
            address,
            and_mask,
            or_mask,
        } => {
            buf.put_u8(FC_MASK_WRITE_REGISTER);
            buf.put_u16(*address);
            buf.put_u16(*and_mask);
            buf.put_u16(*or_mask);
        }
        Pdu::ReadWriteMultipleRequest {
            read_address,
            read_quantity,
            write_address,
            write_quantity,
            payload,
        } => {
            buf.put_u8(FC_READ_WRITE_MULTIPLE_REGISTERS);
            buf.put_u16(*read_address);
            buf.put_u16(*read_quantity);
            buf.put_u16(*write_address);
            buf.put_u16(*write_quantity);
            buf.put_u8(payload.len() as u8);
            buf.put_slice(payload);
        }
        Pdu::ReadWriteMultipleResponse { payload } => {
            buf.put_u8(FC_READ_WRITE_MULTIPLE_REGISTERS);
            buf.put_u8(payload.len() as u8);
            buf.put_slice(payload);
        }
        Pdu::Custom { function, payload } => {
            buf.put_u8(*function);
            buf.put_slice(payload);
        }
        Pdu::Exception { function, code } => {
            buf.put_u8(function | EXCEPTION_BIT);
            buf.put_u8(*code as u8);
        }
    }
    buf.len() - start
}

/// Packs `bools` into the Modbus coil-status byte layout.
#[must_use]
pub fn pack_coils(bools: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; packed_len(bools.len())];
    for (i, &b) in bools.iter().enumerate() {
        bitmap_set(&mut out, i, b);
    }
    out
}

/// Unpacks `count` coil-status bits from `bytes`.
#[must_use]
pub fn unpack_coils(bytes: &[u8], count: u16) -> Vec<bool> {
    (0..count as usize).map(|i| bitmap_get(bytes, i)).collect()
}

/// Upper bound on a bit quantity (coils/discrete inputs).
const MAX_BIT_QUANTITY: Quantity = 2000;
/// Upper bound on a register quantity (holding/input registers).
const MAX_REGISTER_QUANTITY: Quantity = 125;

/// Whether `quantity` is in range for `function`, per the limits each
/// function code's data type imposes. Function codes this check doesn't
/// apply to (single read/write, mask-write) are always in range.
fn quantity_in_range(function: FunctionCode, quantity: Quantity) -> bool {
    let max = match function {
        FC_READ_COILS | FC_READ_DISCRETE_INPUTS | FC_WRITE_MULTIPLE_COILS => MAX_BIT_QUANTITY,
        FC_READ_HOLDING_REGISTERS
        | FC_READ_INPUT_REGISTERS
        | FC_WRITE_MULTIPLE_REGISTERS
        | FC_READ_WRITE_MULTIPLE_REGISTERS => MAX_REGISTER_QUANTITY,
        _ => return true,
    };
    (1..=max).contains(&quantity)
}

/// Validates a quantity before it is sent or dispatched, returning a
/// [`ParseError`] if it falls outside the range `function`'s data type
/// allows. Shared by `pdu_parse`'s decode-side check and `master.rs`'s
/// encode-side check, so a master can never build a request the slave
/// would only reject after a round trip.
pub(crate) fn check_quantity(function: FunctionCode, quantity: Quantity) -> Result<(), ParseError> {
    if quantity_in_range(function, quantity) {
        Ok(())
    } else {
        Err(ParseError::QuantityOutOfRange)
    }
}

/// Decodes a single PDU from `bytes`.
///
/// `dir` disambiguates the handful of function codes (0x03, 0x04, 0x10,
/// 0x17) whose request and response shapes can't be told apart from the
/// byte count alone.
pub fn pdu_parse(bytes: &[u8], dir: Direction) -> Result<Pdu, ParseError> {
    let mut rdr = Cursor::new(bytes);
    let fn_code = rdr.read_u8().map_err(|_| ParseError::Malformed)?;

    if fn_code & EXCEPTION_BIT != 0 {
        let raw = rdr.read_u8()?;
        let code = ExceptionCode::try_from(raw).map_err(|_| ParseError::Malformed)?;
        return Ok(Pdu::Exception {
            function: fn_code & !EXCEPTION_BIT,
            code,
        });
    }

    match (fn_code, dir) {
        (FC_READ_COILS, Direction::Request)
        | (FC_READ_DISCRETE_INPUTS, Direction::Request)
        | (FC_READ_INPUT_REGISTERS, Direction::Request)
        | (FC_READ_HOLDING_REGISTERS, Direction::Request) => {
            let address = rdr.read_u16::<BigEndian>()?;
            let quantity = rdr.read_u16::<BigEndian>()?;
            check_quantity(fn_code, quantity)?;
            Ok(Pdu::ReadRequest {
                function: fn_code,
                address,
                quantity,
            })
        }
        (FC_READ_COILS, Direction::Response)
        | (FC_READ_DISCRETE_INPUTS, Direction::Response)
        | (FC_READ_INPUT_REGISTERS, Direction::Response)
        | (FC_READ_HOLDING_REGISTERS, Direction::Response) => {
            let byte_count = rdr.read_u8()? as usize;
            let payload = read_payload(bytes, rdr.position() as usize, byte_count)?;
            Ok(Pdu::ReadResponse {
                function: fn_code,
                payload,
            })
        }
        (FC_WRITE_SINGLE_COIL, _) | (FC_WRITE_SINGLE_REGISTER, _) => Ok(Pdu::WriteSingle {
            function: fn_code,
            address: rdr.read_u16::<BigEndian>()?,
            value: rdr.read_u16::<BigEndian>()?,
        }),
        (FC_WRITE_MULTIPLE_COILS, Direction::Request)
        | (FC_WRITE_MULTIPLE_REGISTERS, Direction::Request) => {
            let address = rdr.read_u16::<BigEndian>()?;
            let quantity = rdr.read_u16::<BigEndian>()?;
            check_quantity(fn_code, quantity)?;
            let byte_count = rdr.read_u8()? as usize;
            let payload = read_payload(bytes, rdr.position() as usize, byte_count)?;
            Ok(Pdu::WriteMultipleRequest {
                function: fn_code,
                address,
                quantity,
                payload,
            })
        }
        (FC_WRITE_MULTIPLE_COILS, Direction::Response)
        | (FC_WRITE_MULTIPLE_REGISTERS, Direction::Response) => Ok(Pdu::WriteMultipleResponse {
            function: fn_code,
            address: rdr.read_u16::<BigEndian>()?,
            quantity: rdr.read_u16::<BigEndian>()?,
        }),
        (FC_MASK_WRITE_REGISTER, _) => Ok(Pdu::MaskWrite {
            address: rdr.read_u16::<BigEndian>()?,
            and_mask: rdr.read_u16::<BigEndian>()?,
            or_mask: rdr.read_u16::<BigEndian>()?,
        }),
        (FC_READ_WRITE_MULTIPLE_REGISTERS, Direction::Request) => {
            let read_address = rdr.read_u16::<BigEndian>()?;
            let read_quantity = rdr.read_u16::<BigEndian>()?;
            let write_address = rdr.read_u16::<BigEndian>()?;
            let write_quantity = rdr.read_u16::<BigEndian>()?;
            check_quantity(FC_READ_HOLDING_REGISTERS, read_quantity)?;
            check_quantity(FC_WRITE_MULTIPLE_REGISTERS, write_quantity)?;
            let byte_count = rdr.read_u8()? as usize;
            let payload = read_payload(bytes, rdr.position() as usize, byte_count)?;
            Ok(Pdu::ReadWriteMultipleRequest {
                read_address,
                read_quantity,
                write_address,
                write_quantity,
                payload,
            })
        }
        (FC_READ_WRITE_MULTIPLE_REGISTERS, Direction::Response) => {
            let byte_count = rdr.read_u8()? as usize;
            let payload = read_payload(bytes, rdr.position() as usize, byte_count)?;
            Ok(Pdu::ReadWriteMultipleResponse { payload })
        }
        _ => Ok(Pdu::Custom {
            function: fn_code,
            payload: Bytes::copy_from_slice(&bytes[1..]),
        }),
    }
}

fn read_payload(bytes: &[u8], offset: usize, byte_count: usize) -> Result<Bytes, ParseError> {
    if bytes.len() < offset + byte_count {
        return Err(ParseError::Malformed);
    }
    Ok(Bytes::copy_from_slice(&bytes[offset..offset + byte_count]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coil_packing_round_trips() {
        let bools = [true, false, true, true, false, false, false, false, true];
        let packed = pack_coils(&bools);
        assert_eq!(packed, vec![0b0000_1101, 0b0000_0001]);
        assert_eq!(unpack_coils(&packed, bools.len() as u16), bools);
    }

    #[test]
    fn encodes_read_holding_registers_request() {
        let pdu = Pdu::ReadRequest {
            function: FC_READ_HOLDING_REGISTERS,
            address: 0x082B,
            quantity: 2,
        };
        let mut buf = BytesMut::new();
        let n = pdu_make(&mut buf, &pdu);
        assert_eq!(n, 5);
        assert_eq!(&buf[..], &[0x03, 0x08, 0x2B, 0x00, 0x02]);
    }

    #[test]
    fn decodes_read_holding_registers_request() {
        let bytes = [0x03, 0x08, 0x2B, 0x00, 0x02];
        let pdu = pdu_parse(&bytes, Direction::Request).unwrap();
        assert_eq!(
            pdu,
            Pdu::ReadRequest {
                function: FC_READ_HOLDING_REGISTERS,
                address: 0x082B,
                quantity: 2,
            }
        );
    }

    #[test]
    fn decodes_read_holding_registers_response() {
        let bytes = [0x03, 0x04, 0xAA, 0x00, 0x11, 0x11];
        let pdu = pdu_parse(&bytes, Direction::Response).unwrap();
        assert_eq!(
            pdu,
            Pdu::ReadResponse {
                function: FC_READ_HOLDING_REGISTERS,
                payload: Bytes::from_static(&[0xAA, 0x00, 0x11, 0x11]),
            }
        );
    }

    #[test]
    fn rejects_truncated_byte_count() {
        let bytes = [0x03, 0x04, 0xAA, 0x00];
        assert_eq!(
            pdu_parse(&bytes, Direction::Response),
            Err(ParseError::Malformed)
        );
    }

    #[test]
    fn round_trips_write_multiple_registers() {
        let payload = Bytes::from_static(&[0xAB, 0xCD, 0xEF, 0x12]);
        let pdu = Pdu::WriteMultipleRequest {
            function: FC_WRITE_MULTIPLE_REGISTERS,
            address: 0x06,
            quantity: 2,
            payload: payload.clone(),
        };
        let mut buf = BytesMut::new();
        pdu_make(&mut buf, &pdu);
        let bytes = buf.freeze();
        assert_eq!(&bytes[..], &[0x10, 0x00, 0x06, 0x00, 0x02, 0x04, 0xAB, 0xCD, 0xEF, 0x12]);
        let decoded = pdu_parse(&bytes, Direction::Request).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn round_trips_read_write_multiple_registers() {
        let payload = Bytes::from_static(&[0xAB, 0xCD, 0xEF, 0x12]);
        let pdu = Pdu::ReadWriteMultipleRequest {
            read_address: 0x05,
            read_quantity: 51,
            write_address: 0x03,
            write_quantity: 2,
            payload: payload.clone(),
        };
        let mut buf = BytesMut::new();
        pdu_make(&mut buf, &pdu);
        let bytes = buf.freeze();
        let decoded = pdu_parse(&bytes, Direction::Request).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn round_trips_mask_write() {
        let pdu = Pdu::MaskWrite {
            address: 0x04,
            and_mask: 0x00F2,
            or_mask: 0x0025,
        };
        let mut buf = BytesMut::new();
        pdu_make(&mut buf, &pdu);
        let bytes = buf.freeze();
        assert_eq!(&bytes[..], &[0x16, 0x00, 0x04, 0x00, 0xF2, 0x00, 0x25]);
        let decoded = pdu_parse(&bytes, Direction::Request).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn exception_round_trips() {
        let pdu = Pdu::exception(0x03, ExceptionCode::IllegalDataAddress);
        let mut buf = BytesMut::new();
        pdu_make(&mut buf, &pdu);
        let bytes = buf.freeze();
        assert_eq!(&bytes[..], &[0x83, 0x02]);
        let decoded = pdu_parse(&bytes, Direction::Response).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn rejects_out_of_range_register_quantity() {
        let bytes = [0x03, 0x00, 0x00, 0x01, 0x2C];
        assert_eq!(
            pdu_parse(&bytes, Direction::Request),
            Err(ParseError::QuantityOutOfRange)
        );
    }

    #[test]
    fn rejects_out_of_range_bit_quantity() {
        let bytes = [0x01, 0x00, 0x00, 0x07, 0xD1];
        assert_eq!(
            pdu_parse(&bytes, Direction::Request),
            Err(ParseError::QuantityOutOfRange)
        );
    }

    #[test]
    fn unknown_function_code_is_custom() {
        let bytes = [0x07];
        let pdu = pdu_parse(&bytes, Direction::Request).unwrap();
        assert_eq!(
            pdu,
            Pdu::Custom {
                function: 0x07,
                payload: Bytes::new(),
            }
        );
    }
}
