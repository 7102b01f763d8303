// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU framing: wraps a raw PDU byte string with a one-byte slave address
//! and a CRC-16/Modbus trailer. This module never looks inside the PDU
//! payload beyond the function code needed to locate the frame boundary
//! (see [`crate::codec::pdu`] for that).

use std::io::{Cursor, Error, ErrorKind, Result};

use byteorder::{BigEndian, ReadBytesExt};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use smallvec::SmallVec;
use tokio_util::codec::{Decoder, Encoder};

use crate::crc::crc as calc_crc;
use crate::frame::Direction;
use crate::slave::SlaveId;

// [Modbus over Serial Line Specification and Implementation Guide V1.02](http://modbus.org/docs/Modbus_over_serial_line_V1_02.pdf), page 13:
// "The maximum size of a Modbus RTU frame is 256 bytes."
const MAX_FRAME_LEN: usize = 256;

type DroppedBytes = SmallVec<[u8; MAX_FRAME_LEN]>;

/// Given the function code of an outgoing or incoming request PDU, returns
/// the length of that PDU (function code included), or `None` if not
/// enough bytes have arrived yet to know.
fn request_pdu_len(adu_buf: &BytesMut) -> Result<Option<usize>> {
    let Some(&fn_code) = adu_buf.get(1) else {
        return Ok(None);
    };
    let len = match fn_code {
        0x01..=0x06 => 5,
        0x07 | 0x0B | 0x0C | 0x11 => 1,
        0x0F | 0x10 => {
            return Ok(adu_buf.get(6).map(|&n| 6 + usize::from(n)));
        }
        0x16 => 7,
        0x18 => 3,
        0x17 => {
            return Ok(adu_buf.get(10).map(|&n| 10 + usize::from(n)));
        }
        _ => {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("invalid function code: 0x{fn_code:0>2X}"),
            ));
        }
    };
    Ok(Some(len))
}

/// As [`request_pdu_len`], for a response PDU.
fn response_pdu_len(adu_buf: &BytesMut) -> Result<Option<usize>> {
    let Some(&fn_code) = adu_buf.get(1) else {
        return Ok(None);
    };
    #[allow(clippy::match_same_arms)]
    let len = match fn_code {
        0x01..=0x04 | 0x0C | 0x17 => {
            return Ok(adu_buf.get(2).map(|&n| 2 + usize::from(n)));
        }
        0x05 | 0x06 | 0x0B | 0x0F | 0x10 => 5,
        0x16 => 7,
        0x07 => 2,
        0x18 => {
            if adu_buf.len() > 3 {
                3 + usize::from(Cursor::new(&adu_buf[2..=3]).read_u16::<BigEndian>()?)
            } else {
                return Ok(None);
            }
        }
        0x81..=0xFF => 2,
        _ => {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("invalid function code: 0x{fn_code:0>2X}"),
            ));
        }
    };
    Ok(Some(len))
}

#[derive(Debug, Eq, PartialEq)]
struct FrameDecoder {
    dropped_bytes: DroppedBytes,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            dropped_bytes: DroppedBytes::new(),
        }
    }
}

impl FrameDecoder {
    fn decode(&mut self, buf: &mut BytesMut, pdu_len: usize) -> Result<Option<(SlaveId, Bytes)>> {
        const CRC_BYTE_COUNT: usize = 2;

        let adu_len = 1 + pdu_len;
        if buf.len() < adu_len + CRC_BYTE_COUNT {
            return Ok(None);
        }

        let mut adu_buf = buf.split_to(adu_len);
        let crc_buf = buf.split_to(CRC_BYTE_COUNT);

        let expected_crc = Cursor::new(&crc_buf).read_u16::<BigEndian>()?;
        let actual_crc = calc_crc(&adu_buf);
        if expected_crc != actual_crc {
            let rem_buf = buf.split();
            buf.unsplit(adu_buf);
            buf.unsplit(crc_buf);
            buf.unsplit(rem_buf);
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("invalid CRC: expected = 0x{expected_crc:0>4X}, actual = 0x{actual_crc:0>4X}"),
            ));
        }

        if !self.dropped_bytes.is_empty() {
            log::warn!(
                "decoded frame after dropping {} byte(s): {:X?}",
                self.dropped_bytes.len(),
                self.dropped_bytes
            );
            self.dropped_bytes.clear();
        }
        let slave_id = adu_buf.split_to(1)[0];
        Ok(Some((slave_id, adu_buf.freeze())))
    }

    fn recover_on_error(&mut self, buf: &mut BytesMut) {
        debug_assert!(!buf.is_empty());
        let first = buf[0];
        log::debug!("dropped first byte: {first:#04X}");
        if self.dropped_bytes.len() >= MAX_FRAME_LEN {
            log::error!(
                "giving up decoding frame after dropping {} byte(s)",
                self.dropped_bytes.len()
            );
            self.dropped_bytes.clear();
        }
        self.dropped_bytes.push(first);
        buf.advance(1);
    }
}

/// RTU ADU codec. `direction` selects whether incoming frames are sniffed
/// for request or response PDU lengths; encoding is direction-agnostic
/// (the caller hands over an already function-code-tagged PDU byte string).
#[derive(Debug)]
pub struct RtuCodec {
    direction: Direction,
    frame_decoder: FrameDecoder,
}

impl RtuCodec {
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            frame_decoder: FrameDecoder::default(),
        }
    }
}

impl Decoder for RtuCodec {
    type Item = (SlaveId, Bytes);
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<(SlaveId, Bytes)>> {
        const MAX_RETRIES: usize = 20;

        let get_pdu_len = match self.direction {
            Direction::Request => request_pdu_len,
            Direction::Response => response_pdu_len,
        };

        for _ in 0..MAX_RETRIES {
            let result = get_pdu_len(buf).and_then(|pdu_len| {
                let Some(pdu_len) = pdu_len else {
                    return Ok(None);
                };
                self.frame_decoder.decode(buf, pdu_len)
            });

            match result {
                Err(err) => {
                    log::warn!("failed to decode RTU frame: {err}");
                    self.frame_decoder.recover_on_error(buf);
                    continue;
                }
                ok => return ok,
            }
        }

        log::error!("giving up decoding RTU frame after {MAX_RETRIES} retries");
        Err(Error::new(ErrorKind::InvalidData, "too many retries"))
    }
}

impl Encoder<(SlaveId, Bytes)> for RtuCodec {
    type Error = Error;

    fn encode(&mut self, (slave_id, pdu_data): (SlaveId, Bytes), buf: &mut BytesMut) -> Result<()> {
        buf.reserve(pdu_data.len() + 3);
        buf.put_u8(slave_id);
        buf.put_slice(&pdu_data);
        let crc = calc_crc(buf);
        buf.put_u16(crc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_known_crc() {
        let msg = [0x01, 0x03, 0x08, 0x2B, 0x00, 0x02];
        assert_eq!(calc_crc(&msg), 0xB663);
    }

    #[test]
    fn request_pdu_len_by_function_code() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x66, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        buf[1] = 0x01;
        assert_eq!(request_pdu_len(&buf).unwrap(), Some(5));

        buf[1] = 0x0F;
        buf[6] = 99;
        assert_eq!(request_pdu_len(&buf).unwrap(), Some(105));

        buf[1] = 0x17;
        buf[10] = 99;
        assert_eq!(request_pdu_len(&buf).unwrap(), Some(109));
    }

    #[test]
    fn response_pdu_len_by_function_code() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x66, 0x03, 0x04, 0, 0, 0, 0]);
        assert_eq!(response_pdu_len(&buf).unwrap(), Some(6));

        buf[1] = 0x05;
        assert_eq!(response_pdu_len(&buf).unwrap(), Some(5));

        buf[1] = 0x83;
        assert_eq!(response_pdu_len(&buf).unwrap(), Some(2));
    }

    #[test]
    fn decode_partly_received_message() {
        let mut codec = RtuCodec::new(Direction::Response);
        let mut buf = BytesMut::from(
            &[
                0x12, // slave address
                0x02, // function code
                0x03, // byte count
                0x00, 0x00, 0x00, 0x00, // missing crc 2nd byte
            ][..],
        );
        let res = codec.decode(&mut buf).unwrap();
        assert!(res.is_none());
        assert_eq!(buf.len(), 7);
    }

    #[test]
    fn decodes_response_frame_and_verifies_crc() {
        let mut codec = RtuCodec::new(Direction::Response);
        let mut buf = BytesMut::from(
            &[
                0x01, // slave address
                0x03, // function code
                0x04, // byte count
                0x89, 0x02, 0x42, 0xC7, 0x00, 0x9D, // crc
                0x00, // trailing byte of the next frame
            ][..],
        );
        let (slave_id, pdu) = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(slave_id, 0x01);
        assert_eq!(&pdu[..], &[0x03, 0x04, 0x89, 0x02, 0x42, 0xC7]);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn drops_leading_garbage_before_a_valid_frame() {
        let mut codec = RtuCodec::new(Direction::Response);
        let mut buf = BytesMut::from(
            &[
                0x42, 0x43, // garbage
                0x01, 0x03, 0x04, 0x89, 0x02, 0x42, 0xC7, 0x00, 0x9D,
            ][..],
        );
        let (slave_id, pdu) = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(slave_id, 0x01);
        assert_eq!(&pdu[..], &[0x03, 0x04, 0x89, 0x02, 0x42, 0xC7]);
    }

    #[test]
    fn encodes_frame_with_trailing_crc() {
        let mut codec = RtuCodec::new(Direction::Request);
        let mut buf = BytesMut::new();
        let pdu = Bytes::from_static(&[0x03, 0x08, 0x2B, 0x00, 0x02]);
        codec.encode((0x01, pdu), &mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[0x01, 0x03, 0x08, 0x2B, 0x00, 0x02, 0xB6, 0x63]
        );
    }
}
