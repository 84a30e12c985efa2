//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use bigdecimal::BigDecimal;
use chrono::{FixedOffset, TimeZone};
use std::error::Error;
use std::result::Result;
use std::str::FromStr;

use crate::error::NoSQLErrorCode;
use crate::reader::Reader;
use crate::types::{FieldValue, MapValue, NoSQLColumnToFieldValue, MAX_NESTING_DEPTH};
use crate::writer::Writer;

fn round_trip(fv: &FieldValue) -> Result<FieldValue, Box<dyn Error>> {
    let mut w = Writer::new();
    w.write_field_value(fv)?;
    let mut r = Reader::new().from_bytes(w.bytes());
    let out = r.read_field_value()?;
    assert_eq!(r.remaining(), 0);
    Ok(out)
}

fn nested_maps(levels: usize) -> FieldValue {
    let mut v = FieldValue::Integer(1);
    for _ in 0..levels {
        v = FieldValue::Map(MapValue::new().column("a", v));
    }
    v
}

#[test]
fn test_scalar_values() -> Result<(), Box<dyn Error>> {
    let tz = FixedOffset::west_opt(8 * 3600).unwrap();
    let values = vec![
        FieldValue::Integer(i32::MIN),
        FieldValue::Long(98765432198765),
        FieldValue::Double(2345.0023456),
        FieldValue::Boolean(true),
        FieldValue::String("This is a string value".to_string()),
        FieldValue::String(String::new()),
        FieldValue::Binary(vec![]),
        FieldValue::Binary(vec![0, 1, 2, 3, 4, 5]),
        FieldValue::Timestamp(tz.with_ymd_and_hms(2023, 11, 5, 1, 30, 15).unwrap()),
        FieldValue::Number(BigDecimal::from_str("-12345678901234567890.000123")?),
        FieldValue::JsonNull,
        FieldValue::Null,
    ];
    for v in values.iter() {
        assert_eq!(&round_trip(v)?, v);
    }
    Ok(())
}

#[test]
fn test_null_and_empty_are_distinct() -> Result<(), Box<dyn Error>> {
    let m = MapValue::new()
        .column("s", "")
        .column("n", FieldValue::Null)
        .column("j", FieldValue::JsonNull)
        .binary("b", vec![]);
    let out = round_trip(&FieldValue::Map(m))?;
    let out = out.as_map()?;
    assert_eq!(out.get_string("s"), Some(String::new()));
    assert_eq!(out.get_field_value("n"), Some(&FieldValue::Null));
    assert_eq!(out.get_field_value("j"), Some(&FieldValue::JsonNull));
    assert_eq!(out.get_binary("b"), Some(&vec![]));
    Ok(())
}

#[test]
fn test_nested_values_keep_order() -> Result<(), Box<dyn Error>> {
    let inner = MapValue::new().str("z", "last").i32("a", 1);
    let arr = vec![
        "array element 1".to_field_value(),
        FieldValue::Array(vec![FieldValue::Long(12121212), FieldValue::Null]),
        FieldValue::Map(inner.clone()),
    ];
    let m = MapValue::new()
        .i64("id", 7)
        .column("arr", FieldValue::Array(arr))
        .column("inner", FieldValue::Map(inner));
    let out = round_trip(&FieldValue::Map(m.clone()))?;
    assert_eq!(out, FieldValue::Map(m));
    let keys: Vec<&String> = out.as_map()?.get_map("inner").unwrap().iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["z", "a"]);
    Ok(())
}

#[test]
fn test_nesting_limit() -> Result<(), Box<dyn Error>> {
    let ok = nested_maps(MAX_NESTING_DEPTH);
    assert_eq!(round_trip(&ok)?, ok);

    let mut w = Writer::new();
    let err = w
        .write_field_value(&nested_maps(MAX_NESTING_DEPTH + 1))
        .unwrap_err();
    assert_eq!(err.code, NoSQLErrorCode::IllegalArgument);

    // same shape, built by hand so the writer's own guard is not involved
    let mut w = Writer::new();
    for _ in 0..=MAX_NESTING_DEPTH {
        w.write_byte(6);
        w.write_packed_i32(1);
        w.write_string("a");
    }
    w.write_byte(4);
    w.write_packed_i32(1);
    let mut r = Reader::new().from_bytes(w.bytes());
    let err = r.read_field_value().unwrap_err();
    assert_eq!(err.code, NoSQLErrorCode::BadProtocolMessage);
    Ok(())
}

#[test]
fn test_unknown_tags() {
    for tag in [12u8, 42, 255] {
        let mut r = Reader::new().from_bytes(&[tag, 0, 0]);
        let err = r.read_field_value().unwrap_err();
        assert_eq!(err.code, NoSQLErrorCode::ProtocolVersion, "tag {}", tag);
    }
    // a valid tag with its payload cut off is a different failure
    let mut r = Reader::new().from_bytes(&[5]);
    assert_eq!(
        r.read_field_value().unwrap_err().code,
        NoSQLErrorCode::TruncatedData
    );
}

#[test]
fn test_corrupt_counts() {
    // map claiming more entries than bytes left
    let mut w = Writer::new();
    w.write_byte(6);
    w.write_packed_i32(1_000_000);
    let mut r = Reader::new().from_bytes(w.bytes());
    assert_eq!(
        r.read_field_value().unwrap_err().code,
        NoSQLErrorCode::TruncatedData
    );

    let mut w = Writer::new();
    w.write_byte(0);
    w.write_packed_i32(-5);
    let mut r = Reader::new().from_bytes(w.bytes());
    assert_eq!(
        r.read_field_value().unwrap_err().code,
        NoSQLErrorCode::BadProtocolMessage
    );
}

#[test]
fn test_mapvalue_accessors() -> Result<(), Box<dyn Error>> {
    let mut m = MapValue::new().i32("i32val", 5).str("strval", "abc");
    m.put("i32val", 6);
    assert_eq!(m.len(), 2);
    assert_eq!(m.get_i32("i32val"), Some(6));
    assert_eq!(m.get_i64("i32val"), None);
    assert_eq!(m.take_field_value("strval")?, FieldValue::String("abc".to_string()));
    assert!(m.take_field_value("strval").is_err());
    assert_eq!(m.len(), 1);
    Ok(())
}
