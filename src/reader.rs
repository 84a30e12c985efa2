//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::result;
use std::str::{self, FromStr};

use crate::error::{nosql_err, NoSQLError};
use crate::packed_integer;
use crate::types::{millis_to_utc, FieldType, FieldValue, MapValue, MAX_NESTING_DEPTH};

// Reader decodes values of the binary protocol from a byte buffer, keeping
// an explicit cursor. A failed read reports TruncatedData when the buffer
// ends early and never yields a partially decoded value.
pub struct Reader {
    // The underlying byte buffer.
    pub buf: Vec<u8>,
    pub offset: usize,
}

impl Reader {
    pub fn new() -> Reader {
        Reader {
            buf: Vec::new(),
            offset: 0,
        }
    }

    pub fn from_bytes(mut self, val: &[u8]) -> Self {
        self.buf.clear();
        self.buf.extend_from_slice(val);
        self.offset = 0;
        self
    }

    pub fn from_vec(val: Vec<u8>) -> Self {
        Reader {
            buf: val,
            offset: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.offset)
    }

    fn take(&mut self, len: usize, what: &str) -> result::Result<&[u8], NoSQLError> {
        if len > self.remaining() {
            return nosql_err!(
                TruncatedData,
                "{} needs {} bytes at offset {}, only {} remain",
                what,
                len,
                self.offset,
                self.remaining()
            );
        }
        let start = self.offset;
        self.offset += len;
        Ok(&self.buf[start..self.offset])
    }

    fn take_array<const N: usize>(&mut self, what: &str) -> result::Result<[u8; N], NoSQLError> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.take(N, what)?);
        Ok(arr)
    }

    pub fn read_byte(&mut self) -> result::Result<u8, NoSQLError> {
        Ok(self.take(1, "byte")?[0])
    }

    pub fn read_bool(&mut self) -> result::Result<bool, NoSQLError> {
        Ok(self.read_byte()? != 0)
    }

    pub fn read_i16(&mut self) -> result::Result<i16, NoSQLError> {
        Ok(i16::from_be_bytes(self.take_array("i16")?))
    }

    pub fn read_i32(&mut self) -> result::Result<i32, NoSQLError> {
        Ok(i32::from_be_bytes(self.take_array("i32")?))
    }

    pub fn read_i64(&mut self) -> result::Result<i64, NoSQLError> {
        Ok(i64::from_be_bytes(self.take_array("i64")?))
    }

    pub fn read_float64(&mut self) -> result::Result<f64, NoSQLError> {
        Ok(f64::from_be_bytes(self.take_array("f64")?))
    }

    pub fn read_packed_i32(&mut self) -> result::Result<i32, NoSQLError> {
        packed_integer::read_packed_i32(&self.buf, &mut self.offset)
    }

    pub fn read_packed_i64(&mut self) -> result::Result<i64, NoSQLError> {
        packed_integer::read_packed_i64(&self.buf, &mut self.offset)
    }

    // Read a length prefix: -1 is absent, anything below that is malformed.
    fn read_length(&mut self, what: &str) -> result::Result<Option<usize>, NoSQLError> {
        let len = self.read_packed_i32()?;
        if len == -1 {
            return Ok(None);
        }
        if len < -1 {
            return nosql_err!(BadProtocolMessage, "invalid {} length {}", what, len);
        }
        Ok(Some(len as usize))
    }

    pub fn read_string_opt(&mut self) -> result::Result<Option<String>, NoSQLError> {
        let ulen = match self.read_length("string")? {
            Some(l) => l,
            None => return Ok(None),
        };
        let start = self.offset;
        let bytes = self.take(ulen, "string")?;
        match str::from_utf8(bytes) {
            Ok(s) => Ok(Some(s.to_string())),
            Err(_) => {
                self.offset = start;
                nosql_err!(BadProtocolMessage, "invalid utf8 in string at offset {}", start)
            }
        }
    }

    pub fn read_string(&mut self) -> result::Result<String, NoSQLError> {
        match self.read_string_opt()? {
            Some(s) => Ok(s),
            None => nosql_err!(BadProtocolMessage, "unexpected null string"),
        }
    }

    pub fn read_bytes_opt(&mut self) -> result::Result<Option<Vec<u8>>, NoSQLError> {
        match self.read_length("byte array")? {
            Some(l) => Ok(Some(self.take(l, "byte array")?.to_vec())),
            None => Ok(None),
        }
    }

    pub fn read_bytes(&mut self) -> result::Result<Vec<u8>, NoSQLError> {
        match self.read_bytes_opt()? {
            Some(b) => Ok(b),
            None => nosql_err!(BadProtocolMessage, "unexpected null byte array"),
        }
    }

    pub fn read_timestamp_opt(&mut self) -> result::Result<Option<DateTime<Utc>>, NoSQLError> {
        let ms = self.read_packed_i64()?;
        if ms == 0 {
            return Ok(None);
        }
        Ok(Some(millis_to_utc(ms)?))
    }

    pub fn read_field_value(&mut self) -> result::Result<FieldValue, NoSQLError> {
        self.read_field_value_at(0)
    }

    fn read_field_value_at(&mut self, depth: usize) -> result::Result<FieldValue, NoSQLError> {
        let ftype = FieldType::try_from_u8(self.read_byte()?)?;
        let v = match ftype {
            FieldType::Integer => FieldValue::Integer(self.read_packed_i32()?),
            FieldType::Long => FieldValue::Long(self.read_packed_i64()?),
            FieldType::Double => FieldValue::Double(self.read_float64()?),
            FieldType::String => FieldValue::String(self.read_string()?),
            FieldType::Boolean => FieldValue::Boolean(self.read_bool()?),
            FieldType::Binary => FieldValue::Binary(self.read_bytes()?),
            FieldType::Timestamp => {
                let ms = self.read_packed_i64()?;
                FieldValue::Timestamp(millis_to_utc(ms)?.fixed_offset())
            }
            FieldType::Number => {
                let s = self.read_string()?;
                match BigDecimal::from_str(&s) {
                    Ok(n) => FieldValue::Number(n),
                    Err(_) => {
                        return nosql_err!(BadProtocolMessage, "invalid number value '{}'", s)
                    }
                }
            }
            FieldType::Array => FieldValue::Array(self.read_array_at(depth + 1)?),
            FieldType::Map => FieldValue::Map(self.read_map_at(depth + 1)?),
            FieldType::JsonNull => FieldValue::JsonNull,
            FieldType::Null => FieldValue::Null,
        };
        Ok(v)
    }

    // Element counts are bounded by the bytes left, so a corrupt count
    // cannot trigger a huge allocation.
    fn read_count(&mut self, what: &str) -> result::Result<usize, NoSQLError> {
        let n = self.read_packed_i32()?;
        if n < 0 {
            return nosql_err!(BadProtocolMessage, "invalid {} count {}", what, n);
        }
        let n = n as usize;
        if n > self.remaining() {
            return nosql_err!(
                TruncatedData,
                "{} count {} exceeds remaining {} bytes",
                what,
                n,
                self.remaining()
            );
        }
        Ok(n)
    }

    pub fn read_array(&mut self) -> result::Result<Vec<FieldValue>, NoSQLError> {
        self.read_array_at(1)
    }

    fn read_array_at(&mut self, depth: usize) -> result::Result<Vec<FieldValue>, NoSQLError> {
        if depth > MAX_NESTING_DEPTH {
            return nosql_err!(
                BadProtocolMessage,
                "value nesting exceeds {} levels",
                MAX_NESTING_DEPTH
            );
        }
        let n = self.read_count("array")?;
        let mut arr = Vec::with_capacity(n);
        for _ in 0..n {
            arr.push(self.read_field_value_at(depth)?);
        }
        Ok(arr)
    }

    pub fn read_map(&mut self) -> result::Result<MapValue, NoSQLError> {
        self.read_map_at(1)
    }

    fn read_map_at(&mut self, depth: usize) -> result::Result<MapValue, NoSQLError> {
        if depth > MAX_NESTING_DEPTH {
            return nosql_err!(
                BadProtocolMessage,
                "value nesting exceeds {} levels",
                MAX_NESTING_DEPTH
            );
        }
        let n = self.read_count("map")?;
        let mut mv = MapValue::new();
        for _ in 0..n {
            let key = self.read_string()?;
            let val = self.read_field_value_at(depth)?;
            mv.put_field_value(&key, val);
        }
        Ok(mv)
    }

    pub fn read_map_opt(&mut self) -> result::Result<Option<MapValue>, NoSQLError> {
        if self.read_bool()? {
            return Ok(Some(self.read_map()?));
        }
        Ok(None)
    }
}

impl Default for Reader {
    fn default() -> Self {
        Self::new()
    }
}
