//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::binary_protocol::*;
use crate::error::{ia_err, NoSQLError};
use crate::handle::Handle;
use crate::reader::Reader;
use crate::types::{
    BaseOp, Capacity, Durability, FieldValue, MapValue, OpCode, OpVariant, TimeToLive, Version,
};
use crate::writer::Writer;
use chrono::{DateTime, Utc};
use std::result::Result;
use std::time::Duration;

/// Struct used for inserting a single row of data into a NoSQL table.
///
/// This request can perform unconditional and conditional puts:
/// - Overwrite existing row. This is the default.
/// - Succeed only if the row does not exist. Use [`if_absent()`](PutRequest::if_absent()) for this case.
/// - Succeed only if the row exists. Use [`if_present()`](PutRequest::if_present()) for this case.
/// - Succeed only if the row exists and its [`Version`] matches a specific [`Version`]. Use [`if_version()`](PutRequest::if_version()) for this case.
///
/// Information about the existing row can be returned from a put operation using [`return_row(true)`](PutRequest::return_row()). Requesting this information incurs additional cost and may affect operation latency.
///
/// On successful operation, [`PutResult::version()`] is `Some`. This Version may
/// be used in subsequent PutRequests.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct PutRequest {
    pub(crate) table_name: String,
    pub(crate) value: MapValue,
    pub(crate) timeout: Option<Duration>,
    pub(crate) abort_on_fail: bool,
    pub(crate) return_row: bool,
    if_present: bool,
    if_absent: bool,
    match_version: Option<Version>,
    pub(crate) durability: Option<Durability>,
    pub(crate) ttl: Option<TimeToLive>,
    pub(crate) use_table_ttl: bool,
    pub(crate) exact_match: bool,
    pub(crate) identity_cache_size: i32,
}

/// Struct representing the result of a [`PutRequest`] execution.
///
/// This struct is returned from a [`PutRequest::execute()`] call.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct PutResult {
    pub(crate) version: Option<Version>,
    pub(crate) consumed: Option<Capacity>,
    pub(crate) generated_value: Option<FieldValue>,
    pub(crate) existing_modification_time: Option<DateTime<Utc>>,
    pub(crate) existing_value: Option<MapValue>,
    pub(crate) existing_version: Option<Version>,
}

impl PutResult {
    /// Whether the put took place. A conditional put that did not match returns `false`.
    pub fn success(&self) -> bool {
        self.version.is_some()
    }
    /// Get the Version of the now-current record. This value is `Some` if the put operation succeeded. It
    /// may be used in subsequent [`PutRequest::if_version()`] calls.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }
    /// Get the consumed capacity (read/write units) of the operation. This is only valid when billing is enabled.
    pub fn consumed(&self) -> Option<&Capacity> {
        self.consumed.as_ref()
    }
    /// Get the value generated if the operation created a new value. This can happen if the table contains an
    /// identity column or string column declared as a generated UUID. If the table has no such column, this value is `None`.
    pub fn generated_value(&self) -> Option<&FieldValue> {
        self.generated_value.as_ref()
    }
    /// Get the modification time of the previous row if the put operation succeeded, or the modification time of the
    /// current row if the operation failed due to a `if_version()` or `if_absent()` mismatch.
    ///
    /// In either case, this is only valid if [`return_row(true)`](PutRequest::return_row()) was called on
    /// the [`PutRequest`] and a previous row existed.
    pub fn existing_modification_time(&self) -> Option<DateTime<Utc>> {
        self.existing_modification_time
    }
    /// Get the value of the previous row, under the same conditions as
    /// [`existing_modification_time()`](PutResult::existing_modification_time()).
    pub fn existing_value(&self) -> Option<&MapValue> {
        self.existing_value.as_ref()
    }
    /// Get the Version of the previous row, under the same conditions as
    /// [`existing_modification_time()`](PutResult::existing_modification_time()).
    pub fn existing_version(&self) -> Option<&Version> {
        self.existing_version.as_ref()
    }

    pub(crate) fn set_return_row(&mut self, rr: Option<ReturnRow>) {
        if let Some(rr) = rr {
            self.existing_value = rr.value;
            self.existing_version = rr.version;
            self.existing_modification_time = rr.modification_time;
        }
    }

    pub(crate) fn return_row(&self) -> Option<ReturnRow> {
        if self.existing_value.is_none()
            && self.existing_version.is_none()
            && self.existing_modification_time.is_none()
        {
            return None;
        }
        Some(ReturnRow {
            value: self.existing_value.clone(),
            version: self.existing_version.clone(),
            modification_time: self.existing_modification_time,
        })
    }
}

impl PutRequest {
    /// Create a new PutRequest.
    ///
    /// `table_name` should be the name of the table to insert the record into. It is required to be non-empty.
    pub fn new(table_name: &str) -> PutRequest {
        PutRequest {
            table_name: table_name.to_string(),
            ..Default::default()
        }
    }

    /// Set the row value to use for the put operation, from a [`MapValue`].
    ///
    /// ```no_run
    /// use nosql_wire_driver::PutRequest;
    /// use nosql_wire_driver::types::*;
    /// # use nosql_wire_driver::Handle;
    /// # #[tokio::main]
    /// # pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let handle = Handle::builder().build().await?;
    /// let user = MapValue::new()
    ///      .column("shard", 1)
    ///      .column("id", 123456788i64)
    ///      .column("name", "Jane");
    ///
    /// let put_result = PutRequest::new("users")
    ///                  .value(user)
    ///                  .execute(&handle).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn value(mut self, val: MapValue) -> PutRequest {
        self.value = val;
        self
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If set, it must be greater than or equal to 1 millisecond, otherwise an
    /// IllegalArgument error will be returned.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    pub fn timeout(mut self, t: &Duration) -> PutRequest {
        self.timeout = Some(*t);
        self
    }

    /// Return information about the existing row, if present.
    /// Requesting this information incurs additional cost and may affect operation latency.
    pub fn return_row(mut self, val: bool) -> PutRequest {
        self.return_row = val;
        self
    }

    /// Specifies the optional time to live (TTL) value, causing the time to live on
    /// the row to be set to the specified value on put.
    ///
    /// Note: Internally, NoSQL uses a resolution of one hour for TTL values. This
    /// value will be converted to a whole number of hours. The minimum
    /// number of hours is 1.
    pub fn ttl(mut self, val: &Duration) -> PutRequest {
        self.ttl = Some(TimeToLive::from_duration(val));
        self
    }

    /// Specifies whether to use the table's default TTL for the row.
    /// If true, and there is an existing row, causes the operation to update
    /// the time to live (TTL) value of the row based on the table's default
    /// TTL if set. If the table has no default TTL this setting has no effect.
    /// By default updating an existing row has no effect on its TTL.
    pub fn use_table_ttl(mut self, val: bool) -> PutRequest {
        self.use_table_ttl = val;
        self
    }

    /// Succeed only if the given row exists and its version matches the given version.
    pub fn if_version(mut self, version: &Version) -> PutRequest {
        self.match_version = Some(version.clone());
        self.if_present = false;
        self.if_absent = false;
        self
    }

    /// Succeed only if the given row does not already exist.
    pub fn if_absent(mut self) -> PutRequest {
        self.if_absent = true;
        self.if_present = false;
        self.match_version = None;
        self
    }

    /// Succeed only if the given row already exists.
    pub fn if_present(mut self) -> PutRequest {
        self.if_present = true;
        self.if_absent = false;
        self.match_version = None;
        self
    }

    /// Require the value to match the table schema exactly. By default, extra
    /// fields in the value are ignored.
    pub fn exact_match(mut self, val: bool) -> PutRequest {
        self.exact_match = val;
        self
    }

    /// Number of identity values the server should cache for this table
    /// when generating a value. Zero uses the table default.
    pub fn identity_cache_size(mut self, size: i32) -> PutRequest {
        self.identity_cache_size = size;
        self
    }

    /// Set the [`Durability`] for the write. Only honored by on-premises servers.
    pub fn durability(mut self, d: Durability) -> PutRequest {
        self.durability = Some(d);
        self
    }

    /// Abort the whole [`WriteManyRequest`](crate::WriteManyRequest) if this put fails.
    /// Ignored when the put is executed on its own.
    pub fn abort_on_fail(mut self, val: bool) -> PutRequest {
        self.abort_on_fail = val;
        self
    }

    pub async fn execute(&self, h: &Handle) -> Result<PutResult, NoSQLError> {
        h.execute(self).await
    }

    pub(crate) fn variant(&self) -> OpVariant {
        if self.match_version.is_some() {
            OpVariant::IfVersion
        } else if self.if_present {
            OpVariant::IfPresent
        } else if self.if_absent {
            OpVariant::IfAbsent
        } else {
            OpVariant::Plain
        }
    }

    fn validate(&self) -> Result<(), NoSQLError> {
        if self.table_name.is_empty() {
            return ia_err!("table name must be non-empty");
        }
        self.validate_payload()
    }

    pub(crate) fn validate_payload(&self) -> Result<(), NoSQLError> {
        if self.value.is_empty() {
            return ia_err!("put value must be non-empty");
        }
        if self.identity_cache_size < 0 {
            return ia_err!("identity cache size must not be negative");
        }
        Ok(())
    }

    // Fields shared by a single put and a put inside a WriteMany.
    pub(crate) fn write_payload(&self, w: &mut Writer) -> Result<(), NoSQLError> {
        w.write_bool(self.exact_match);
        w.write_packed_i32(self.identity_cache_size);
        w.write_map(&self.value)?;
        w.write_bool(self.use_table_ttl);
        if self.use_table_ttl {
            write_ttl(w, None);
        } else {
            write_ttl(w, self.ttl.as_ref());
        }
        if let Some(v) = &self.match_version {
            w.write_bytes(v);
        }
        Ok(())
    }

    pub(crate) fn read_payload(
        r: &mut Reader,
        op: OpCode,
        table_name: &str,
        return_row: bool,
    ) -> Result<PutRequest, NoSQLError> {
        let mut req = PutRequest::new(table_name).return_row(return_row);
        req.exact_match = r.read_bool()?;
        req.identity_cache_size = r.read_packed_i32()?;
        req.value = r.read_map()?;
        req.use_table_ttl = r.read_bool()?;
        req.ttl = read_ttl(r)?;
        match op {
            OpCode::PutIfAbsent => req = req.if_absent(),
            OpCode::PutIfPresent => req = req.if_present(),
            OpCode::PutIfVersion => req.match_version = Some(r.read_bytes()?),
            _ => {}
        }
        Ok(req)
    }

    pub(crate) fn deserialize_request(r: &mut Reader) -> Result<PutRequest, NoSQLError> {
        let hdr = read_request_header(r)?;
        expect_op(
            &hdr,
            &[
                OpCode::Put,
                OpCode::PutIfAbsent,
                OpCode::PutIfPresent,
                OpCode::PutIfVersion,
            ],
        )?;
        let durability = read_durability(r)?;
        let return_row = r.read_bool()?;
        let mut req = PutRequest::read_payload(r, hdr.op_code, &hdr.table_name, return_row)?;
        req.timeout = Some(hdr.timeout);
        req.durability = durability;
        Ok(req)
    }

    pub(crate) fn write_result(res: &PutResult, w: &mut Writer) -> Result<(), NoSQLError> {
        w.write_bool(res.version.is_some());
        if let Some(v) = &res.version {
            w.write_bytes(v);
        }
        write_return_row(w, res.return_row().as_ref())?;
        write_field_value_opt(w, res.generated_value.as_ref())
    }

    pub(crate) fn read_result(r: &mut Reader) -> Result<PutResult, NoSQLError> {
        let mut res = PutResult::default();
        if r.read_bool()? {
            res.version = Some(r.read_bytes()?);
        }
        res.set_return_row(read_return_row(r)?);
        res.generated_value = read_field_value_opt(r)?;
        Ok(res)
    }

    pub(crate) fn serialize_result(res: &PutResult, w: &mut Writer) -> Result<(), NoSQLError> {
        write_consumed(w, res.consumed.as_ref());
        PutRequest::write_result(res, w)
    }
}

impl ProtocolRequest for PutRequest {
    type Result = PutResult;

    fn op_code(&self) -> Result<OpCode, NoSQLError> {
        OpCode::compose(BaseOp::Put, self.variant())
    }

    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn serialize(&self, w: &mut Writer, opts: &SerializeOptions) -> Result<(), NoSQLError> {
        self.validate()?;
        write_request_header(w, self.op_code()?, &opts.timeout, &self.table_name);
        write_durability(w, self.durability.as_ref());
        w.write_bool(self.return_row);
        self.write_payload(w)
    }

    fn deserialize(r: &mut Reader, opts: &SerializeOptions) -> Result<PutResult, NoSQLError> {
        let consumed = read_consumed(r, opts)?;
        let mut res = PutRequest::read_result(r)?;
        res.consumed = consumed;
        Ok(res)
    }
}
