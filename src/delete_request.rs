//
// Copyright (c) 2024 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::binary_protocol::*;
use crate::error::{ia_err, NoSQLError};
use crate::handle::Handle;
use crate::reader::Reader;
use crate::types::{BaseOp, Capacity, Durability, MapValue, OpCode, OpVariant, Version};
use crate::writer::Writer;
use chrono::{DateTime, Utc};
use std::result::Result;
use std::time::Duration;

/// Struct used for deleting a single row from a table in the NoSQL Database.
///
/// This request can be used to perform unconditional and conditional deletes:
///
/// - Delete any existing row. This is the default.
/// - Succeed only if the row exists and its Version matches a specific Version. Use
///   [`if_version()`](DeleteRequest::if_version()) for this case.
///
/// Information about the existing row can be returned from a delete operation using
/// [`return_row(true)`](DeleteRequest::return_row()). Requesting this information incurs
/// additional cost and may affect operation latency.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub(crate) key: MapValue,
    pub(crate) table_name: String,
    pub(crate) timeout: Option<Duration>,
    pub(crate) abort_on_fail: bool,
    pub(crate) return_row: bool,
    pub(crate) durability: Option<Durability>,
    match_version: Option<Version>,
}

/// Struct representing the result of a [`DeleteRequest`] execution.
///
/// This struct is returned from a [`DeleteRequest::execute()`] call.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct DeleteResult {
    pub(crate) success: bool,
    pub(crate) consumed: Option<Capacity>,
    pub(crate) existing_modification_time: Option<DateTime<Utc>>,
    pub(crate) existing_value: Option<MapValue>,
    pub(crate) existing_version: Option<Version>,
}

impl DeleteResult {
    /// Get the result of the operation: `true` if the row was deleted from the table.
    pub fn success(&self) -> bool {
        self.success
    }
    /// Get the consumed capacity (read/write units) of the operation. This is only valid when billing is enabled.
    pub fn consumed(&self) -> Option<&Capacity> {
        self.consumed.as_ref()
    }
    /// Get the modification time of the deleted row if the delete operation succeeded, or the modification time of the
    /// current row if the operation failed due to a `if_version()` mismatch.
    ///
    /// In either case, this is only valid if [`return_row(true)`](DeleteRequest::return_row()) was called on
    /// the [`DeleteRequest`] and a previous row existed.
    pub fn existing_modification_time(&self) -> Option<DateTime<Utc>> {
        self.existing_modification_time
    }
    /// Get the value of the deleted row if the delete operation succeeded, or the value of the
    /// current row if the operation failed due to a `if_version()` mismatch.
    pub fn existing_value(&self) -> Option<&MapValue> {
        self.existing_value.as_ref()
    }
    /// Get the Version of the deleted row if the delete operation succeeded, or the Version of the
    /// current row if the operation failed due to a `if_version()` mismatch.
    pub fn existing_version(&self) -> Option<&Version> {
        self.existing_version.as_ref()
    }

    fn set_return_row(&mut self, rr: Option<ReturnRow>) {
        if let Some(rr) = rr {
            self.existing_value = rr.value;
            self.existing_version = rr.version;
            self.existing_modification_time = rr.modification_time;
        }
    }

    fn return_row(&self) -> Option<ReturnRow> {
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

impl DeleteRequest {
    /// Create a new `DeleteRequest`.
    ///
    /// `table_name` and `key` are required and must be non-empty.
    ///
    /// `key` must contain all fields required to construct the primary key for the table.
    pub fn new(table_name: &str, key: MapValue) -> DeleteRequest {
        DeleteRequest {
            table_name: table_name.to_string(),
            key,
            ..Default::default()
        }
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If set, it must be greater than or equal to 1 millisecond, otherwise an
    /// IllegalArgument error will be returned.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    pub fn timeout(mut self, t: &Duration) -> DeleteRequest {
        self.timeout = Some(*t);
        self
    }

    /// Succeed only if the record already exists its version matches the given version.
    pub fn if_version(mut self, version: &Version) -> DeleteRequest {
        self.match_version = Some(version.clone());
        self
    }

    /// Return information about the existing row. Requesting this information incurs
    /// additional cost and may affect operation latency.
    pub fn return_row(mut self, val: bool) -> DeleteRequest {
        self.return_row = val;
        self
    }

    /// Set the [`Durability`] for the write. Only honored by on-premises servers.
    pub fn durability(mut self, d: Durability) -> DeleteRequest {
        self.durability = Some(d);
        self
    }

    /// Abort the whole [`WriteManyRequest`](crate::WriteManyRequest) if this delete fails.
    /// Ignored when the delete is executed on its own.
    pub fn abort_on_fail(mut self, val: bool) -> DeleteRequest {
        self.abort_on_fail = val;
        self
    }

    pub async fn execute(&self, h: &Handle) -> Result<DeleteResult, NoSQLError> {
        h.execute(self).await
    }

    pub(crate) fn variant(&self) -> OpVariant {
        match self.match_version {
            Some(_) => OpVariant::IfVersion,
            None => OpVariant::Plain,
        }
    }

    fn validate(&self) -> Result<(), NoSQLError> {
        if self.table_name.is_empty() {
            return ia_err!("table name must be non-empty");
        }
        self.validate_payload()
    }

    pub(crate) fn validate_payload(&self) -> Result<(), NoSQLError> {
        if self.key.is_empty() {
            return ia_err!("primary key must be non-empty");
        }
        Ok(())
    }

    pub(crate) fn write_payload(&self, w: &mut Writer) -> Result<(), NoSQLError> {
        w.write_map(&self.key)?;
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
    ) -> Result<DeleteRequest, NoSQLError> {
        let mut req = DeleteRequest::new(table_name, r.read_map()?).return_row(return_row);
        if op == OpCode::DeleteIfVersion {
            req.match_version = Some(r.read_bytes()?);
        }
        Ok(req)
    }

    pub(crate) fn deserialize_request(r: &mut Reader) -> Result<DeleteRequest, NoSQLError> {
        let hdr = read_request_header(r)?;
        expect_op(&hdr, &[OpCode::Delete, OpCode::DeleteIfVersion])?;
        let durability = read_durability(r)?;
        let return_row = r.read_bool()?;
        let mut req = DeleteRequest::read_payload(r, hdr.op_code, &hdr.table_name, return_row)?;
        req.timeout = Some(hdr.timeout);
        req.durability = durability;
        Ok(req)
    }

    pub(crate) fn write_result(res: &DeleteResult, w: &mut Writer) -> Result<(), NoSQLError> {
        w.write_bool(res.success);
        write_return_row(w, res.return_row().as_ref())
    }

    pub(crate) fn read_result(r: &mut Reader) -> Result<DeleteResult, NoSQLError> {
        let mut res = DeleteResult {
            success: r.read_bool()?,
            ..Default::default()
        };
        res.set_return_row(read_return_row(r)?);
        Ok(res)
    }

    pub(crate) fn serialize_result(res: &DeleteResult, w: &mut Writer) -> Result<(), NoSQLError> {
        write_consumed(w, res.consumed.as_ref());
        DeleteRequest::write_result(res, w)
    }
}

impl ProtocolRequest for DeleteRequest {
    type Result = DeleteResult;

    fn op_code(&self) -> Result<OpCode, NoSQLError> {
        OpCode::compose(BaseOp::Delete, self.variant())
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

    fn deserialize(r: &mut Reader, opts: &SerializeOptions) -> Result<DeleteResult, NoSQLError> {
        let consumed = read_consumed(r, opts)?;
        let mut res = DeleteRequest::read_result(r)?;
        res.consumed = consumed;
        Ok(res)
    }
}
