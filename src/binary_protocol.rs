//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Framing shared by every operation of the binary protocol.
//!
//! A request is:
//!
//! | field | encoding |
//! | ----- | -------- |
//! | opcode | i16, big-endian |
//! | timeout | packed i32, milliseconds |
//! | table name | string |
//! | operation fields | see each request type |
//!
//! A response starts with a status byte. Zero is success and is followed by
//! the operation's result fields. Anything else is the service error code,
//! followed by an error message string, and nothing more is read.
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::{nosql_err, NoSQLError};
use crate::reader::Reader;
use crate::types::{
    Capacity, Durability, FieldValue, MapValue, OpCode, TimeToLive, TtlUnit, Version,
};
use crate::writer::Writer;

/// Protocol version declared by this driver, sent in a request header.
pub(crate) const PROTOCOL_VERSION: i16 = 4;

/// Default upper bound on the encoded size of a single WriteMany sub-operation.
pub(crate) const DEFAULT_MAX_OPERATION_SIZE: usize = 2 * 1024 * 1024;

// Per-call settings fixed when the request is built, used for both
// encoding the request and decoding its result.
#[derive(Debug, Clone)]
pub(crate) struct SerializeOptions {
    pub(crate) timeout: Duration,
    pub(crate) billing: bool,
    pub(crate) max_operation_size: usize,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        SerializeOptions {
            timeout: Duration::from_secs(30),
            billing: true,
            max_operation_size: DEFAULT_MAX_OPERATION_SIZE,
        }
    }
}

/// One data operation, as seen by the execution pipeline.
pub(crate) trait ProtocolRequest: Send + Sync {
    type Result;

    fn op_code(&self) -> Result<OpCode, NoSQLError>;
    fn table_name(&self) -> &str;
    fn timeout(&self) -> Option<Duration>;
    fn serialize(&self, w: &mut Writer, opts: &SerializeOptions) -> Result<(), NoSQLError>;
    fn deserialize(r: &mut Reader, opts: &SerializeOptions) -> Result<Self::Result, NoSQLError>;
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RequestHeader {
    pub(crate) op_code: OpCode,
    pub(crate) timeout: Duration,
    pub(crate) table_name: String,
}

pub(crate) fn write_request_header(w: &mut Writer, op: OpCode, timeout: &Duration, table: &str) {
    w.write_i16(op as i16);
    let ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    w.write_packed_i32(ms);
    w.write_string(table);
}

pub(crate) fn read_request_header(r: &mut Reader) -> Result<RequestHeader, NoSQLError> {
    let op_code = OpCode::from_wire(r.read_i16()?)?;
    let ms = r.read_packed_i32()?;
    if ms < 0 {
        return nosql_err!(BadProtocolMessage, "negative request timeout {}", ms);
    }
    let table_name = r.read_string()?;
    Ok(RequestHeader {
        op_code,
        timeout: Duration::from_millis(ms as u64),
        table_name,
    })
}

pub(crate) fn expect_op(hdr: &RequestHeader, allowed: &[OpCode]) -> Result<(), NoSQLError> {
    if allowed.contains(&hdr.op_code) {
        return Ok(());
    }
    nosql_err!(
        ProtocolVersion,
        "unexpected opcode {:?}, expected one of {:?}",
        hdr.op_code,
        allowed
    )
}

pub(crate) fn write_durability(w: &mut Writer, d: Option<&Durability>) {
    w.write_byte(d.map(|d| d.to_byte()).unwrap_or(0));
}

pub(crate) fn read_durability(r: &mut Reader) -> Result<Option<Durability>, NoSQLError> {
    Durability::from_byte(r.read_byte()?)
}

// TTL: packed value (-1 when absent) followed by the unit byte when present.
pub(crate) fn write_ttl(w: &mut Writer, ttl: Option<&TimeToLive>) {
    match ttl {
        Some(t) => {
            w.write_packed_i64(t.value);
            w.write_byte(t.unit as u8);
        }
        None => w.write_packed_i64(-1),
    }
}

pub(crate) fn read_ttl(r: &mut Reader) -> Result<Option<TimeToLive>, NoSQLError> {
    let value = r.read_packed_i64()?;
    if value == -1 {
        return Ok(None);
    }
    let u = r.read_byte()?;
    match TtlUnit::try_from(u) {
        Ok(unit) => Ok(Some(TimeToLive { value, unit })),
        Err(_) => nosql_err!(BadProtocolMessage, "invalid TTL unit {}", u),
    }
}

pub(crate) fn write_ok_status(w: &mut Writer) {
    w.write_byte(0);
}

pub(crate) fn write_error_response(w: &mut Writer, code: u8, message: &str) {
    w.write_byte(code);
    w.write_string(message);
}

/// Read the status byte of a response, surfacing a service error if set.
pub(crate) fn read_response_status(r: &mut Reader) -> Result<(), NoSQLError> {
    let status = r.read_byte()?;
    if status == 0 {
        return Ok(());
    }
    let msg = r.read_string_opt()?.unwrap_or_default();
    Err(NoSQLError::from_int(status as i32, &msg))
}

// Consumed capacity is always three packed ints on the wire. It is
// surfaced only when billing is enabled for the handle.
pub(crate) fn write_consumed(w: &mut Writer, c: Option<&Capacity>) {
    let c = c.copied().unwrap_or_default();
    w.write_packed_i32(c.read_units);
    w.write_packed_i32(c.read_kb);
    w.write_packed_i32(c.write_kb);
}

pub(crate) fn read_consumed(
    r: &mut Reader,
    opts: &SerializeOptions,
) -> Result<Option<Capacity>, NoSQLError> {
    let c = Capacity {
        read_units: r.read_packed_i32()?,
        read_kb: r.read_packed_i32()?,
        write_kb: r.read_packed_i32()?,
    };
    if opts.billing {
        return Ok(Some(c));
    }
    Ok(None)
}

/// Previous state of a row, returned by writes that asked for it.
#[derive(Default, Debug, Clone, PartialEq)]
pub(crate) struct ReturnRow {
    pub(crate) value: Option<MapValue>,
    pub(crate) version: Option<Version>,
    pub(crate) modification_time: Option<DateTime<Utc>>,
}

pub(crate) fn write_return_row(w: &mut Writer, rr: Option<&ReturnRow>) -> Result<(), NoSQLError> {
    let rr = match rr {
        Some(rr) => rr,
        None => {
            w.write_bool(false);
            return Ok(());
        }
    };
    w.write_bool(true);
    w.write_map_opt(rr.value.as_ref())?;
    w.write_bytes_opt(rr.version.as_deref());
    w.write_timestamp_opt(rr.modification_time.as_ref());
    Ok(())
}

pub(crate) fn read_return_row(r: &mut Reader) -> Result<Option<ReturnRow>, NoSQLError> {
    if !r.read_bool()? {
        return Ok(None);
    }
    Ok(Some(ReturnRow {
        value: r.read_map_opt()?,
        version: r.read_bytes_opt()?,
        modification_time: r.read_timestamp_opt()?,
    }))
}

pub(crate) fn write_field_value_opt(
    w: &mut Writer,
    v: Option<&FieldValue>,
) -> Result<(), NoSQLError> {
    match v {
        Some(v) => {
            w.write_bool(true);
            w.write_field_value(v)
        }
        None => {
            w.write_bool(false);
            Ok(())
        }
    }
}

pub(crate) fn read_field_value_opt(r: &mut Reader) -> Result<Option<FieldValue>, NoSQLError> {
    if r.read_bool()? {
        return Ok(Some(r.read_field_value()?));
    }
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::NoSQLErrorCode;

    #[test]
    fn header_round_trip() {
        let mut w = Writer::new();
        write_request_header(&mut w, OpCode::PutIfAbsent, &Duration::from_millis(2500), "t1");
        assert_eq!(&w.bytes()[0..2], &[0u8, 4u8]);
        let mut r = Reader::new().from_bytes(w.bytes());
        let hdr = read_request_header(&mut r).unwrap();
        assert_eq!(hdr.op_code, OpCode::PutIfAbsent);
        assert_eq!(hdr.timeout, Duration::from_millis(2500));
        assert_eq!(hdr.table_name, "t1");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn error_status_stops_decoding() {
        let mut w = Writer::new();
        write_error_response(&mut w, NoSQLErrorCode::TableNotFound as u8, "no table t1");
        // trailing garbage must not be read
        w.write_byte(0xff);
        let mut r = Reader::new().from_bytes(w.bytes());
        let err = read_response_status(&mut r).unwrap_err();
        assert_eq!(err.code, NoSQLErrorCode::TableNotFound);
        assert_eq!(err.message, "no table t1");
        assert!(err.is_service_error());
        assert_eq!(r.remaining(), 1);
    }

    #[test]
    fn consumed_respects_billing() {
        let c = Capacity {
            read_units: 2,
            read_kb: 1,
            write_kb: 3,
        };
        let mut w = Writer::new();
        write_consumed(&mut w, Some(&c));
        w.write_byte(42);

        let billed = SerializeOptions::default();
        let mut r = Reader::new().from_bytes(w.bytes());
        assert_eq!(read_consumed(&mut r, &billed).unwrap(), Some(c));
        assert_eq!(r.read_byte().unwrap(), 42);

        let unbilled = SerializeOptions {
            billing: false,
            ..Default::default()
        };
        let mut r = Reader::new().from_bytes(w.bytes());
        assert_eq!(read_consumed(&mut r, &unbilled).unwrap(), None);
        // the same bytes are consumed either way
        assert_eq!(r.read_byte().unwrap(), 42);
    }

    #[test]
    fn ttl_absent_and_present() {
        let mut w = Writer::new();
        write_ttl(&mut w, None);
        write_ttl(&mut w, Some(&TimeToLive::days(3)));
        let mut r = Reader::new().from_bytes(w.bytes());
        assert_eq!(read_ttl(&mut r).unwrap(), None);
        assert_eq!(read_ttl(&mut r).unwrap(), Some(TimeToLive::days(3)));
    }
}
