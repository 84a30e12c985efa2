//
// Copyright (c) 2024 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use chrono::{DateTime, Utc};
use std::result::Result;

use crate::error::{ia_err, NoSQLError};
use crate::packed_integer;
use crate::types::{FieldType, FieldValue, MapValue, MAX_NESTING_DEPTH};

// Writer encodes values into the binary protocol and appends them to a
// growable buffer. Fixed-width integers and doubles are big-endian; lengths
// and counts are packed integers.
pub struct Writer {
    // The underlying byte buffer.
    pub buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Writer {
        Writer {
            buf: Vec::with_capacity(256),
        }
    }

    pub fn write_byte(&mut self, val: u8) {
        self.buf.push(val);
    }

    pub(crate) fn write_field_type(&mut self, ft: FieldType) {
        self.write_byte(ft as u8);
    }

    pub fn write_bool(&mut self, val: bool) {
        self.write_byte(val as u8);
    }

    pub fn write_i16(&mut self, val: i16) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    pub fn write_i32(&mut self, val: i32) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    pub fn write_i64(&mut self, val: i64) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    pub fn write_float64(&mut self, val: f64) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    pub fn write_packed_i32(&mut self, val: i32) {
        packed_integer::write_packed_i32(&mut self.buf, val);
    }

    pub fn write_packed_i64(&mut self, val: i64) {
        packed_integer::write_packed_i64(&mut self.buf, val);
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Discard everything written after `len` bytes.
    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    pub fn write_string(&mut self, val: &str) {
        self.write_packed_i32(val.len() as i32);
        self.buf.extend_from_slice(val.as_bytes());
    }

    /// Write an optional string. Absent is written as length -1, which
    /// reads back differently from an empty string.
    pub fn write_string_opt(&mut self, val: Option<&str>) {
        match val {
            Some(s) => self.write_string(s),
            None => self.write_packed_i32(-1),
        }
    }

    pub fn write_bytes(&mut self, val: &[u8]) {
        self.write_packed_i32(val.len() as i32);
        self.buf.extend_from_slice(val);
    }

    pub fn write_bytes_opt(&mut self, val: Option<&[u8]>) {
        match val {
            Some(b) => self.write_bytes(b),
            None => self.write_packed_i32(-1),
        }
    }

    // Optional instants are packed milliseconds since the epoch, 0 when absent.
    pub fn write_timestamp_opt(&mut self, val: Option<&DateTime<Utc>>) {
        match val {
            Some(t) => self.write_packed_i64(t.timestamp_millis()),
            None => self.write_packed_i64(0),
        }
    }

    pub fn write_field_value(&mut self, val: &FieldValue) -> Result<(), NoSQLError> {
        self.write_field_value_at(val, 0)
    }

    fn write_field_value_at(&mut self, val: &FieldValue, depth: usize) -> Result<(), NoSQLError> {
        self.write_field_type(val.get_type());
        match val {
            FieldValue::Integer(i) => self.write_packed_i32(*i),
            FieldValue::Long(i) => self.write_packed_i64(*i),
            FieldValue::String(s) => self.write_string(s),
            FieldValue::Binary(b) => self.write_bytes(b),
            FieldValue::Boolean(b) => self.write_bool(*b),
            FieldValue::Double(d) => self.write_float64(*d),
            FieldValue::Timestamp(ts) => self.write_packed_i64(ts.timestamp_millis()),
            FieldValue::Number(n) => self.write_string(&n.to_string()),
            FieldValue::Array(a) => self.write_array_at(a, depth + 1)?,
            FieldValue::Map(m) => self.write_map_at(m, depth + 1)?,
            FieldValue::JsonNull | FieldValue::Null => {}
        }
        Ok(())
    }

    /// Write a map body: entry count, then name/value pairs in insertion order.
    pub fn write_map(&mut self, val: &MapValue) -> Result<(), NoSQLError> {
        self.write_map_at(val, 1)
    }

    fn write_map_at(&mut self, val: &MapValue, depth: usize) -> Result<(), NoSQLError> {
        if depth > MAX_NESTING_DEPTH {
            return ia_err!("value nesting exceeds {} levels", MAX_NESTING_DEPTH);
        }
        self.write_packed_i32(val.len() as i32);
        for (key, item) in val.iter() {
            self.write_string(key);
            self.write_field_value_at(item, depth)?;
        }
        Ok(())
    }

    pub fn write_array(&mut self, val: &[FieldValue]) -> Result<(), NoSQLError> {
        self.write_array_at(val, 1)
    }

    fn write_array_at(&mut self, val: &[FieldValue], depth: usize) -> Result<(), NoSQLError> {
        if depth > MAX_NESTING_DEPTH {
            return ia_err!("value nesting exceeds {} levels", MAX_NESTING_DEPTH);
        }
        self.write_packed_i32(val.len() as i32);
        for item in val.iter() {
            self.write_field_value_at(item, depth)?;
        }
        Ok(())
    }

    pub fn write_map_opt(&mut self, val: Option<&MapValue>) -> Result<(), NoSQLError> {
        match val {
            Some(m) => {
                self.write_bool(true);
                self.write_map(m)
            }
            None => {
                self.write_bool(false);
                Ok(())
            }
        }
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}
