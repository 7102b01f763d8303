// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MBAP (Modbus/TCP) framing: a 7-byte header carries an explicit length,
//! so unlike RTU framing this never needs to inspect the PDU's function
//! code to find the frame boundary.

use std::io::{Error, ErrorKind, Result};

use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::tcp::{Header, PROTOCOL_ID};

const HEADER_LEN: usize = 7;

/// MBAP ADU codec: decodes/encodes a `(Header, pdu_bytes)` pair. PDU
/// contents are opaque here; see [`crate::codec::pdu`].
#[derive(Debug, Default)]
pub struct TcpCodec;

impl Decoder for TcpCodec {
    type Item = (Header, Bytes);
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<(Header, Bytes)>> {
        // A length of 0 or an unexpected protocol id means the stream is out
        // of sync with frame boundaries (a stray byte, a non-Modbus peer).
        // Unlike RTU framing there's no CRC to confirm a resync point, so we
        // drop one byte at a time and keep looking, the way `codec::rtu`
        // recovers from a bad frame, rather than failing the whole read.
        const MAX_RETRIES: usize = 20;

        for _ in 0..MAX_RETRIES {
            if buf.len() < HEADER_LEN {
                return Ok(None);
            }

            let len = usize::from(BigEndian::read_u16(&buf[4..6]));
            let protocol_id = BigEndian::read_u16(&buf[2..4]);
            if len == 0 || protocol_id != PROTOCOL_ID {
                log::warn!(
                    "dropping malformed MBAP header (length = {len}, protocol id = {protocol_id})"
                );
                buf.advance(1);
                continue;
            }

            // `len` counts the unit id byte plus the PDU.
            let pdu_len = len - 1;
            if buf.len() < HEADER_LEN + pdu_len {
                return Ok(None);
            }

            let header_data = buf.split_to(HEADER_LEN);
            let transaction_id = BigEndian::read_u16(&header_data[0..2]);
            let unit_id = header_data[6];
            let header = Header {
                transaction_id,
                unit_id,
            };

            let pdu_data = buf.split_to(pdu_len).freeze();
            return Ok(Some((header, pdu_data)));
        }

        log::error!("giving up decoding MBAP frame after {MAX_RETRIES} retries");
        Err(Error::new(ErrorKind::InvalidData, "too many retries"))
    }
}

impl Encoder<(Header, Bytes)> for TcpCodec {
    type Error = Error;

    fn encode(&mut self, (header, pdu_data): (Header, Bytes), buf: &mut BytesMut) -> Result<()> {
        use bytes::BufMut;

        buf.reserve(pdu_data.len() + HEADER_LEN);
        buf.put_u16(header.transaction_id);
        buf.put_u16(PROTOCOL_ID);
        buf.put_u16((pdu_data.len() + 1) as u16);
        buf.put_u8(header.unit_id);
        buf.put_slice(&pdu_data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSACTION_ID: u16 = 0x1001;
    const UNIT_ID: u8 = 0xFE;

    #[test]
    fn decode_header_fragment() {
        let mut codec = TcpCodec;
        let mut buf = BytesMut::from(&[0x00, 0x11, 0x00, 0x00, 0x00, 0x00][..]);
        let res = codec.decode(&mut buf).unwrap();
        assert!(res.is_none());
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn decode_partly_received_message() {
        let mut codec = TcpCodec;
        let mut buf = BytesMut::from(
            &[
                0x10, 0x01, // transaction id
                0x00, 0x00, // protocol id
                0x00, 0x03, // length
                UNIT_ID, 0x02, // function code
            ][..],
        );
        let res = codec.decode(&mut buf).unwrap();
        assert!(res.is_none());
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn decodes_complete_message() {
        let mut codec = TcpCodec;
        let mut buf = BytesMut::from(
            &[
                0x10, 0x01, 0x00, 0x00, 0x00, 0x03, UNIT_ID, 0x82, 0x03,
            ][..],
        );
        let (header, pdu) = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(header.transaction_id, TRANSACTION_ID);
        assert_eq!(header.unit_id, UNIT_ID);
        assert_eq!(&pdu[..], &[0x82, 0x03]);
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn decode_with_invalid_protocol_id_resyncs_instead_of_failing() {
        let mut codec = TcpCodec;
        let mut buf = BytesMut::from(
            &[
                0x10, 0x01, 0x33, 0x12, 0x00, 0x03, UNIT_ID, 0x02, 0x66, 0x82,
            ][..],
        );
        let res = codec.decode(&mut buf).unwrap();
        assert!(res.is_none());
        assert!(buf.len() < 10, "malformed header bytes should be dropped");
    }

    #[test]
    fn encode_request() {
        let mut codec = TcpCodec;
        let mut buf = BytesMut::new();
        let header = Header {
            transaction_id: TRANSACTION_ID,
            unit_id: UNIT_ID,
        };
        let pdu = Bytes::from_static(&[0x04, 0x00, 0x23, 0x00, 0x05]);
        codec.encode((header, pdu), &mut buf).unwrap();
        assert_eq!(buf[0], 0x10);
        assert_eq!(buf[1], 0x01);
        assert_eq!(buf[2], 0x00);
        assert_eq!(buf[3], 0x00);
        assert_eq!(buf[4], 0x00);
        assert_eq!(buf[5], 0x06);
        assert_eq!(buf[6], UNIT_ID);
        assert_eq!(&buf[7..], &[0x04, 0x00, 0x23, 0x00, 0x05]);
    }
}
