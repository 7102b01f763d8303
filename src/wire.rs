// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Big-endian byte codec and LSB-first bitmap codec, the two primitives
//! every other wire format in this crate is built from.
//!
//! Modbus puts multi-byte fields on the wire big-endian ("network order")
//! but packs individual bits LSB-first within a byte, so the two codecs
//! live side by side here rather than deferring entirely to [`byteorder`].

use byteorder::{BigEndian, ByteOrder};

/// Writes `value` as two big-endian bytes into `buf[offset..offset + 2]`.
pub fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    BigEndian::write_u16(&mut buf[offset..offset + 2], value);
}

/// Reads two big-endian bytes from `buf[offset..offset + 2]`.
pub fn get_u16(buf: &[u8], offset: usize) -> u16 {
    BigEndian::read_u16(&buf[offset..offset + 2])
}

/// Sets or clears bit `index` (0-based) of a packed bitmap, LSB-first
/// within each byte (the Modbus coil/discrete-input convention).
pub fn bitmap_set(buf: &mut [u8], index: usize, value: bool) {
    let byte = index / 8;
    let bit = index % 8;
    if value {
        buf[byte] |= 1 << bit;
    } else {
        buf[byte] &= !(1 << bit);
    }
}

/// Reads bit `index` (0-based) of a packed bitmap, LSB-first within each byte.
pub fn bitmap_get(buf: &[u8], index: usize) -> bool {
    let byte = index / 8;
    let bit = index % 8;
    (buf[byte] >> bit) & 0b1 != 0
}

/// Number of bytes needed to pack `bit_count` bits.
pub const fn packed_len(bit_count: usize) -> usize {
    (bit_count + 7) / 8
}

/// Encodes a register array as big-endian bytes, the shape every register
/// read/write payload takes on the wire.
pub fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    let mut buf = vec![0u8; words.len() * 2];
    for (i, &word) in words.iter().enumerate() {
        put_u16(&mut buf, i * 2, word);
    }
    buf
}

/// Decodes a big-endian register payload back into a register array.
pub fn bytes_to_words(bytes: &[u8]) -> Vec<u16> {
    bytes.chunks_exact(2).map(|chunk| get_u16(chunk, 0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_u16() {
        let mut buf = [0u8; 4];
        put_u16(&mut buf, 0, 0xABCD);
        put_u16(&mut buf, 2, 0x0102);
        assert_eq!(buf, [0xAB, 0xCD, 0x01, 0x02]);
        assert_eq!(get_u16(&buf, 0), 0xABCD);
        assert_eq!(get_u16(&buf, 2), 0x0102);
    }

    #[test]
    fn bitmap_is_lsb_first() {
        let mut buf = [0u8; 2];
        bitmap_set(&mut buf, 0, true);
        bitmap_set(&mut buf, 3, true);
        bitmap_set(&mut buf, 9, true);
        assert_eq!(buf, [0b0000_1001, 0b0000_0010]);
        assert!(bitmap_get(&buf, 0));
        assert!(!bitmap_get(&buf, 1));
        assert!(bitmap_get(&buf, 3));
        assert!(bitmap_get(&buf, 9));
    }

    #[test]
    fn packed_len_rounds_up() {
        assert_eq!(packed_len(0), 0);
        assert_eq!(packed_len(1), 1);
        assert_eq!(packed_len(8), 1);
        assert_eq!(packed_len(9), 2);
        assert_eq!(packed_len(16), 2);
    }

    #[test]
    fn words_round_trip_through_bytes() {
        let words = vec![0xABCD, 0x0001];
        let bytes = words_to_bytes(&words);
        assert_eq!(bytes, vec![0xAB, 0xCD, 0x00, 0x01]);
        assert_eq!(bytes_to_words(&bytes), words);
    }
}
