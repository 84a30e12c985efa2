//
// Copyright (c) 2024 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Variable-length integer encoding.
//!
//! Signed values are first zig-zag folded (0, -1, 1, -2, 2 ... map to
//! 0, 1, 2, 3, 4 ...) so that small magnitudes of either sign stay small,
//! then written little-endian in groups of 7 bits. The high bit of each
//! byte is set when more bytes follow.
//!
//! An `i32` takes at most 5 bytes and an `i64` at most 10 bytes; values in
//! the range -64..=63 take a single byte.

use crate::error::{nosql_err, NoSQLError};

/// Maximum number of bytes used by a packed `i32`.
pub const MAX_PACKED_I32_LEN: usize = 5;

/// Maximum number of bytes used by a packed `i64`.
pub const MAX_PACKED_I64_LEN: usize = 10;

fn zigzag_i32(val: i32) -> u32 {
    ((val << 1) ^ (val >> 31)) as u32
}

fn unzigzag_i32(val: u32) -> i32 {
    ((val >> 1) as i32) ^ -((val & 1) as i32)
}

fn zigzag_i64(val: i64) -> u64 {
    ((val << 1) ^ (val >> 63)) as u64
}

fn unzigzag_i64(val: u64) -> i64 {
    ((val >> 1) as i64) ^ -((val & 1) as i64)
}

fn write_varint(buf: &mut Vec<u8>, mut val: u64) {
    while val >= 0x80 {
        buf.push((val as u8) | 0x80);
        val >>= 7;
    }
    buf.push(val as u8);
}

fn read_varint(buf: &[u8], off: &mut usize, max_len: usize) -> Result<u64, NoSQLError> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    for i in 0..max_len {
        let pos = *off + i;
        if pos >= buf.len() {
            return nosql_err!(
                TruncatedData,
                "packed integer at offset {} runs past end of buffer (len={})",
                *off,
                buf.len()
            );
        }
        let b = buf[pos];
        // only the lowest bit of a tenth byte is left in 64 bits
        if shift == 63 && b > 1 {
            return nosql_err!(
                BadProtocolMessage,
                "packed integer at offset {} overflows i64",
                *off
            );
        }
        result |= ((b & 0x7f) as u64) << shift;
        if b & 0x80 == 0 {
            *off = pos + 1;
            return Ok(result);
        }
        shift += 7;
    }
    nosql_err!(
        BadProtocolMessage,
        "packed integer at offset {} is longer than {} bytes",
        *off,
        max_len
    )
}

/// Returns the number of bytes `val` occupies when packed.
pub fn packed_i32_len(val: i32) -> usize {
    let mut v = zigzag_i32(val);
    let mut n = 1;
    while v >= 0x80 {
        v >>= 7;
        n += 1;
    }
    n
}

/// Append a packed `i32` to `buf`.
pub fn write_packed_i32(buf: &mut Vec<u8>, val: i32) {
    write_varint(buf, zigzag_i32(val) as u64);
}

/// Append a packed `i64` to `buf`.
pub fn write_packed_i64(buf: &mut Vec<u8>, val: i64) {
    write_varint(buf, zigzag_i64(val));
}

/// Read a packed `i32` starting at `off`, advancing `off` past it.
///
/// On error `off` is left unchanged.
pub fn read_packed_i32(buf: &[u8], off: &mut usize) -> Result<i32, NoSQLError> {
    let start = *off;
    let v = read_varint(buf, off, MAX_PACKED_I32_LEN)?;
    if v > u32::MAX as u64 {
        *off = start;
        return nosql_err!(
            BadProtocolMessage,
            "packed integer at offset {} overflows i32",
            start
        );
    }
    Ok(unzigzag_i32(v as u32))
}

/// Read a packed `i64` starting at `off`, advancing `off` past it.
pub fn read_packed_i64(buf: &[u8], off: &mut usize) -> Result<i64, NoSQLError> {
    let v = read_varint(buf, off, MAX_PACKED_I64_LEN)?;
    Ok(unzigzag_i64(v))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::NoSQLErrorCode;

    #[test]
    fn small_values_take_one_byte() {
        for v in -64..=63 {
            assert_eq!(packed_i32_len(v), 1, "value {}", v);
        }
        assert_eq!(packed_i32_len(64), 2);
        assert_eq!(packed_i32_len(-65), 2);
        assert_eq!(packed_i32_len(i32::MAX), MAX_PACKED_I32_LEN);
        assert_eq!(packed_i32_len(i32::MIN), MAX_PACKED_I32_LEN);
    }

    #[test]
    fn known_encodings() {
        let mut buf = Vec::new();
        write_packed_i32(&mut buf, 0);
        write_packed_i32(&mut buf, -1);
        write_packed_i32(&mut buf, 1);
        write_packed_i32(&mut buf, 300);
        assert_eq!(buf, vec![0x00, 0x01, 0x02, 0xd8, 0x04]);
    }

    #[test]
    fn extremes() {
        let mut buf = Vec::new();
        write_packed_i64(&mut buf, i64::MIN);
        assert_eq!(buf.len(), MAX_PACKED_I64_LEN);
        write_packed_i64(&mut buf, i64::MAX);
        let mut off = 0;
        assert_eq!(read_packed_i64(&buf, &mut off).unwrap(), i64::MIN);
        assert_eq!(read_packed_i64(&buf, &mut off).unwrap(), i64::MAX);
        assert_eq!(off, buf.len());
    }

    #[test]
    fn truncated_input() {
        let mut buf = Vec::new();
        write_packed_i32(&mut buf, 1 << 20);
        buf.pop();
        let mut off = 0;
        let err = read_packed_i32(&buf, &mut off).unwrap_err();
        assert_eq!(err.code, NoSQLErrorCode::TruncatedData);
        assert_eq!(off, 0);
    }

    #[test]
    fn overlong_input() {
        let buf = vec![0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        let mut off = 0;
        let err = read_packed_i32(&buf, &mut off).unwrap_err();
        assert_eq!(err.code, NoSQLErrorCode::BadProtocolMessage);

        // five bytes, but the value does not fit in 32 bits
        let buf = vec![0xff, 0xff, 0xff, 0xff, 0x7f];
        let mut off = 0;
        let err = read_packed_i32(&buf, &mut off).unwrap_err();
        assert_eq!(err.code, NoSQLErrorCode::BadProtocolMessage);
    }

    #[test]
    fn tenth_byte_holds_one_bit() {
        let mut buf = vec![0xff; 9];
        buf.push(0x01);
        let mut off = 0;
        assert_eq!(read_packed_i64(&buf, &mut off).unwrap(), i64::MIN);
        assert_eq!(off, 10);

        for last in [0x02u8, 0x7f] {
            let mut buf = vec![0xff; 9];
            buf.push(last);
            let mut off = 0;
            let err = read_packed_i64(&buf, &mut off).unwrap_err();
            assert_eq!(err.code, NoSQLErrorCode::BadProtocolMessage);
            assert_eq!(off, 0);
        }
    }
}
