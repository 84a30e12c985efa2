//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::HashMap;
use std::result::Result;
use std::time::Duration;

use num_enum::TryFromPrimitive;

use crate::error::{ia_err, nosql_err, NoSQLError};

/// Row version: an opaque byte string assigned by the service on every write.
pub type Version = Vec<u8>;

/// Values nested deeper than this are rejected by the codec.
pub const MAX_NESTING_DEPTH: usize = 32;

// Wire tags for field values.
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub(crate) enum FieldType {
    // An ordered collection of zero or more elements.
    Array = 0,

    // An uninterpreted sequence of zero or more u8 bytes.
    Binary, // 1

    Boolean, // 2

    // IEEE-754 64-bit floating-point.
    Double, // 3

    // Signed 32-bit integer.
    Integer, // 4

    // Signed 64-bit integer.
    Long, // 5

    // String keys to values, in insertion order.
    Map, // 6

    String, // 7

    // A point in time, millisecond precision.
    Timestamp, // 8

    // Arbitrary precision number.
    Number, // 9

    // The JSON null value inside a JSON field.
    JsonNull, // 10

    // SQL null: the absence of a value.
    Null, // 11
}

impl FieldType {
    pub(crate) fn try_from_u8(val: u8) -> Result<Self, NoSQLError> {
        match FieldType::try_from(val) {
            Ok(ft) => Ok(ft),
            Err(_) => nosql_err!(ProtocolVersion, "unrecognized field type tag {}", val),
        }
    }
}

/// A single data item: a column value, a key component, or a nested element.
///
/// Maps and arrays nest arbitrarily, up to [`MAX_NESTING_DEPTH`] levels.
/// `Null` is a value in its own right and is distinct from an empty string
/// or an empty byte array.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    Array(Vec<FieldValue>),
    Binary(Vec<u8>),
    Boolean(bool),
    Double(f64),
    Integer(i32),
    Long(i64),
    Map(MapValue),
    String(String),
    Timestamp(DateTime<FixedOffset>),
    Number(BigDecimal),
    JsonNull,
    #[default]
    Null,
}

impl FieldValue {
    pub(crate) fn get_type(&self) -> FieldType {
        match self {
            FieldValue::Array(_) => FieldType::Array,
            FieldValue::Binary(_) => FieldType::Binary,
            FieldValue::Boolean(_) => FieldType::Boolean,
            FieldValue::Double(_) => FieldType::Double,
            FieldValue::Integer(_) => FieldType::Integer,
            FieldValue::Long(_) => FieldType::Long,
            FieldValue::Map(_) => FieldType::Map,
            FieldValue::String(_) => FieldType::String,
            FieldValue::Timestamp(_) => FieldType::Timestamp,
            FieldValue::Number(_) => FieldType::Number,
            FieldValue::JsonNull => FieldType::JsonNull,
            FieldValue::Null => FieldType::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null | FieldValue::JsonNull)
    }

    pub fn as_i32(&self) -> Result<i32, NoSQLError> {
        if let FieldValue::Integer(i) = self {
            return Ok(*i);
        }
        ia_err!("value is not an Integer: {:?}", self)
    }

    pub fn as_i64(&self) -> Result<i64, NoSQLError> {
        match self {
            FieldValue::Long(l) => Ok(*l),
            FieldValue::Integer(i) => Ok(*i as i64),
            _ => ia_err!("value is not a Long: {:?}", self),
        }
    }

    pub fn as_str(&self) -> Result<&str, NoSQLError> {
        if let FieldValue::String(s) = self {
            return Ok(s);
        }
        ia_err!("value is not a String: {:?}", self)
    }

    pub fn as_map(&self) -> Result<&MapValue, NoSQLError> {
        if let FieldValue::Map(m) = self {
            return Ok(m);
        }
        ia_err!("value is not a Map: {:?}", self)
    }

    pub fn as_array(&self) -> Result<&Vec<FieldValue>, NoSQLError> {
        if let FieldValue::Array(a) = self {
            return Ok(a);
        }
        ia_err!("value is not an Array: {:?}", self)
    }
}

/// Conversion of native Rust values into [`FieldValue`]s, used by
/// [`MapValue::column()`].
pub trait NoSQLColumnToFieldValue {
    fn to_field_value(&self) -> FieldValue;
}

impl NoSQLColumnToFieldValue for FieldValue {
    fn to_field_value(&self) -> FieldValue {
        self.clone()
    }
}
impl NoSQLColumnToFieldValue for f64 {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Double(*self)
    }
}
impl NoSQLColumnToFieldValue for i64 {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Long(*self)
    }
}
impl NoSQLColumnToFieldValue for i32 {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Integer(*self)
    }
}
impl NoSQLColumnToFieldValue for String {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::String(self.clone())
    }
}
impl NoSQLColumnToFieldValue for &str {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::String(self.to_string())
    }
}
impl NoSQLColumnToFieldValue for bool {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Boolean(*self)
    }
}
impl NoSQLColumnToFieldValue for BigDecimal {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Number(self.clone())
    }
}
impl NoSQLColumnToFieldValue for MapValue {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Map(self.clone())
    }
}
impl NoSQLColumnToFieldValue for DateTime<FixedOffset> {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Timestamp(*self)
    }
}
impl<T: NoSQLColumnToFieldValue> NoSQLColumnToFieldValue for Option<T> {
    fn to_field_value(&self) -> FieldValue {
        match self {
            Some(v) => v.to_field_value(),
            None => FieldValue::Null,
        }
    }
}
impl<T: NoSQLColumnToFieldValue> NoSQLColumnToFieldValue for Vec<T> {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Array(self.iter().map(|v| v.to_field_value()).collect())
    }
}

/// A row, a primary key, or a nested map: string keys to [`FieldValue`]s.
///
/// Keys are unique and iteration follows insertion order, which is also
/// the order entries appear on the wire. Putting an existing key replaces
/// its value in place. Lookups go through a key index, and two maps are
/// equal when they hold the same entries in any order.
#[derive(Default, Debug, Clone)]
pub struct MapValue {
    m: Vec<(String, FieldValue)>,
    // position of each key in `m`
    index: HashMap<String, usize>,
}

impl PartialEq for MapValue {
    fn eq(&self, other: &MapValue) -> bool {
        self.m.len() == other.m.len()
            && self
                .m
                .iter()
                .all(|(k, v)| other.get_field_value(k) == Some(v))
    }
}

impl MapValue {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.m.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.m.iter().map(|(k, v)| (k, v))
    }

    pub fn put_field_value(&mut self, key: &str, val: FieldValue) {
        if let Some(&pos) = self.index.get(key) {
            self.m[pos].1 = val;
            return;
        }
        self.index.insert(key.to_string(), self.m.len());
        self.m.push((key.to_string(), val));
    }

    pub fn get_field_value(&self, key: &str) -> Option<&FieldValue> {
        self.index.get(key).map(|&pos| &self.m[pos].1)
    }

    pub fn take_field_value(&mut self, key: &str) -> Result<FieldValue, NoSQLError> {
        let pos = match self.index.remove(key) {
            Some(pos) => pos,
            None => return ia_err!("field '{}' does not exist in map", key),
        };
        let (_, val) = self.m.remove(pos);
        for (k, _) in &self.m[pos..] {
            if let Some(p) = self.index.get_mut(k) {
                *p -= 1;
            }
        }
        Ok(val)
    }

    pub fn put(&mut self, key: &str, val: impl NoSQLColumnToFieldValue) {
        self.put_field_value(key, val.to_field_value());
    }

    pub fn column(mut self, key: &str, val: impl NoSQLColumnToFieldValue) -> MapValue {
        self.put(key, val);
        self
    }

    pub fn i32(mut self, key: &str, val: i32) -> MapValue {
        self.put_field_value(key, FieldValue::Integer(val));
        self
    }
    pub fn get_i32(&self, key: &str) -> Option<i32> {
        if let FieldValue::Integer(i) = self.get_field_value(key)? {
            Some(*i)
        } else {
            None
        }
    }

    pub fn i64(mut self, key: &str, val: i64) -> MapValue {
        self.put_field_value(key, FieldValue::Long(val));
        self
    }
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        if let FieldValue::Long(i) = self.get_field_value(key)? {
            Some(*i)
        } else {
            None
        }
    }

    pub fn str(mut self, key: &str, val: &str) -> MapValue {
        self.put_field_value(key, FieldValue::String(val.to_string()));
        self
    }
    pub fn get_string(&self, key: &str) -> Option<String> {
        if let FieldValue::String(s) = self.get_field_value(key)? {
            Some(s.clone())
        } else {
            None
        }
    }

    pub fn binary(mut self, key: &str, val: Vec<u8>) -> MapValue {
        self.put_field_value(key, FieldValue::Binary(val));
        self
    }
    pub fn get_binary(&self, key: &str) -> Option<&Vec<u8>> {
        if let FieldValue::Binary(b) = self.get_field_value(key)? {
            Some(b)
        } else {
            None
        }
    }

    pub fn timestamp(mut self, key: &str, val: &DateTime<FixedOffset>) -> MapValue {
        self.put_field_value(key, FieldValue::Timestamp(*val));
        self
    }
    pub fn get_timestamp(&self, key: &str) -> Option<DateTime<FixedOffset>> {
        if let FieldValue::Timestamp(t) = self.get_field_value(key)? {
            Some(*t)
        } else {
            None
        }
    }

    pub fn get_map(&self, key: &str) -> Option<&MapValue> {
        if let FieldValue::Map(m) = self.get_field_value(key)? {
            Some(m)
        } else {
            None
        }
    }
}

impl std::fmt::Display for MapValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:#?}", self)
    }
}

/// Consistency is used to provide consistency guarantees for read operations.
///
/// 1. Eventual consistency means that the values read may be very slightly out of date. This is the default.
///
/// 2. Absolute consistency may be specified to guarantee that current values are read.
///
/// Absolute consistency results in higher cost, consuming twice the number of
/// read units for the same data relative to Eventual consistency, and should
/// only be used when required.
#[derive(Clone, Copy, Default, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum Consistency {
    Absolute = 1,
    #[default]
    Eventual = 2,
}

/// Disk sync policy applied by a replica when committing a write.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum SyncPolicy {
    Sync = 1,
    NoSync = 2,
    WriteNoSync = 3,
}

/// How many replicas must acknowledge a write before it is reported committed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum ReplicaAckPolicy {
    All = 1,
    None = 2,
    SimpleMajority = 3,
}

/// Durability requested for a write operation.
///
/// Only honored by on-premises servers. When not set, the server default applies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Durability {
    pub master_sync: SyncPolicy,
    pub replica_sync: SyncPolicy,
    pub replica_ack: ReplicaAckPolicy,
}

impl Durability {
    pub fn new(
        master_sync: SyncPolicy,
        replica_sync: SyncPolicy,
        replica_ack: ReplicaAckPolicy,
    ) -> Durability {
        Durability {
            master_sync,
            replica_sync,
            replica_ack,
        }
    }

    // Packed into one byte, two bits per policy. Zero means "server default".
    pub(crate) fn to_byte(&self) -> u8 {
        (self.master_sync as u8) | ((self.replica_sync as u8) << 2) | ((self.replica_ack as u8) << 4)
    }

    pub(crate) fn from_byte(b: u8) -> Result<Option<Durability>, NoSQLError> {
        if b == 0 {
            return Ok(None);
        }
        let master = SyncPolicy::try_from(b & 0x03);
        let replica = SyncPolicy::try_from((b >> 2) & 0x03);
        let ack = ReplicaAckPolicy::try_from((b >> 4) & 0x03);
        match (master, replica, ack) {
            (Ok(m), Ok(r), Ok(a)) if b >> 6 == 0 => Ok(Some(Durability::new(m, r, a))),
            _ => nosql_err!(BadProtocolMessage, "invalid durability byte {:#04x}", b),
        }
    }
}

/// Unit of a [`TimeToLive`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum TtlUnit {
    Hours = 1,
    Days = 2,
}

/// Time to live for a row, in whole hours or days.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimeToLive {
    pub value: i64,
    pub unit: TtlUnit,
}

impl TimeToLive {
    pub fn hours(value: i64) -> TimeToLive {
        TimeToLive {
            value,
            unit: TtlUnit::Hours,
        }
    }

    pub fn days(value: i64) -> TimeToLive {
        TimeToLive {
            value,
            unit: TtlUnit::Days,
        }
    }

    /// Convert a [`Duration`] to a TTL.
    ///
    /// The service only accepts whole hours or days: the duration is
    /// truncated to whole hours (minimum one), and expressed in days when
    /// the hour count is a multiple of 24.
    pub fn from_duration(d: &Duration) -> TimeToLive {
        let hours = std::cmp::max(d.as_secs() / 3600, 1) as i64;
        if hours % 24 == 0 {
            return TimeToLive::days(hours / 24);
        }
        TimeToLive::hours(hours)
    }
}

/// Read/write throughput consumed by an operation.
///
/// Only reported when the handle has billing enabled, which is the default
/// for the NoSQL Cloud Service.
#[derive(Clone, Copy, Default, Debug, Eq, PartialEq)]
pub struct Capacity {
    /// Read units consumed. An eventually consistent read of up to 1 KB
    /// costs one unit; an absolutely consistent read costs two.
    pub read_units: i32,

    /// Kilobytes read.
    pub read_kb: i32,

    /// Kilobytes written.
    pub write_kb: i32,
}

impl Capacity {
    pub(crate) fn add(&mut self, c: &Capacity) {
        self.read_units = self.read_units.saturating_add(c.read_units);
        self.read_kb = self.read_kb.saturating_add(c.read_kb);
        self.write_kb = self.write_kb.saturating_add(c.write_kb);
    }
}

/// Operation codes, as sent in the first two bytes of every request.
///
/// Conditional variants are fixed offsets from their base operation:
/// `PutIfAbsent`, `PutIfPresent` and `PutIfVersion` are `Put` + 1, 2, 3 and
/// `DeleteIfVersion` is `Delete` + 1.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, TryFromPrimitive)]
#[repr(i16)]
pub enum OpCode {
    Delete = 0,
    DeleteIfVersion = 1,
    Get = 2,
    Put = 3,
    PutIfAbsent = 4,
    PutIfPresent = 5,
    PutIfVersion = 6,
    WriteMany = 9,
    DeleteRange = 10,
}

/// The operation family an [`OpCode`] belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BaseOp {
    Get,
    Put,
    Delete,
    DeleteRange,
    WriteMany,
}

/// The condition attached to a write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpVariant {
    Plain,
    IfAbsent,
    IfPresent,
    IfVersion,
}

impl OpCode {
    pub(crate) const ALL: [OpCode; 9] = [
        OpCode::Delete,
        OpCode::DeleteIfVersion,
        OpCode::Get,
        OpCode::Put,
        OpCode::PutIfAbsent,
        OpCode::PutIfPresent,
        OpCode::PutIfVersion,
        OpCode::WriteMany,
        OpCode::DeleteRange,
    ];

    /// Map an operation family and condition to its wire opcode.
    ///
    /// Every pair is listed; pairs the service has no opcode for are
    /// rejected with `IllegalArgument`.
    pub fn compose(base: BaseOp, variant: OpVariant) -> Result<OpCode, NoSQLError> {
        use BaseOp as B;
        use OpVariant as V;
        match (base, variant) {
            (B::Get, V::Plain) => Ok(OpCode::Get),
            (B::Put, V::Plain) => Ok(OpCode::Put),
            (B::Put, V::IfAbsent) => Ok(OpCode::PutIfAbsent),
            (B::Put, V::IfPresent) => Ok(OpCode::PutIfPresent),
            (B::Put, V::IfVersion) => Ok(OpCode::PutIfVersion),
            (B::Delete, V::Plain) => Ok(OpCode::Delete),
            (B::Delete, V::IfVersion) => Ok(OpCode::DeleteIfVersion),
            (B::DeleteRange, V::Plain) => Ok(OpCode::DeleteRange),
            (B::WriteMany, V::Plain) => Ok(OpCode::WriteMany),
            (B::Get, V::IfAbsent | V::IfPresent | V::IfVersion)
            | (B::Delete, V::IfAbsent | V::IfPresent)
            | (B::DeleteRange, V::IfAbsent | V::IfPresent | V::IfVersion)
            | (B::WriteMany, V::IfAbsent | V::IfPresent | V::IfVersion) => {
                ia_err!("{:?} has no {:?} variant", base, variant)
            }
        }
    }

    pub fn base(self) -> BaseOp {
        match self {
            OpCode::Get => BaseOp::Get,
            OpCode::Put | OpCode::PutIfAbsent | OpCode::PutIfPresent | OpCode::PutIfVersion => {
                BaseOp::Put
            }
            OpCode::Delete | OpCode::DeleteIfVersion => BaseOp::Delete,
            OpCode::DeleteRange => BaseOp::DeleteRange,
            OpCode::WriteMany => BaseOp::WriteMany,
        }
    }

    pub fn variant(self) -> OpVariant {
        match self {
            OpCode::PutIfAbsent => OpVariant::IfAbsent,
            OpCode::PutIfPresent => OpVariant::IfPresent,
            OpCode::PutIfVersion | OpCode::DeleteIfVersion => OpVariant::IfVersion,
            OpCode::Get
            | OpCode::Put
            | OpCode::Delete
            | OpCode::DeleteRange
            | OpCode::WriteMany => OpVariant::Plain,
        }
    }

    pub(crate) fn from_wire(val: i16) -> Result<OpCode, NoSQLError> {
        match OpCode::try_from(val) {
            Ok(op) => Ok(op),
            Err(_) => nosql_err!(ProtocolVersion, "unknown opcode {}", val),
        }
    }
}

pub(crate) fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>, NoSQLError> {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(dt) => Ok(dt),
        None => nosql_err!(BadProtocolMessage, "timestamp {} ms is out of range", ms),
    }
}
