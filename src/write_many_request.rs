//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::binary_protocol::*;
use crate::delete_request::DeleteRequest;
use crate::error::{ia_err, nosql_err, NoSQLError};
use crate::handle::Handle;
use crate::put_request::PutRequest;
use crate::reader::Reader;
use crate::types::{BaseOp, Capacity, Durability, FieldValue, MapValue, OpCode, Version};
use crate::writer::Writer;
use chrono::{DateTime, Utc};
use std::result::Result;
use std::time::Duration;

// For doc only
#[allow(unused_imports)]
use crate::{DeleteResult, PutResult};

/// One write inside a [`WriteManyRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOperation {
    Put(PutRequest),
    Delete(DeleteRequest),
}

impl WriteOperation {
    fn table_name(&self) -> &str {
        match self {
            WriteOperation::Put(p) => &p.table_name,
            WriteOperation::Delete(d) => &d.table_name,
        }
    }

    fn abort_on_fail(&self) -> bool {
        match self {
            WriteOperation::Put(p) => p.abort_on_fail,
            WriteOperation::Delete(d) => d.abort_on_fail,
        }
    }

    fn op_code(&self) -> Result<OpCode, NoSQLError> {
        match self {
            WriteOperation::Put(p) => OpCode::compose(BaseOp::Put, p.variant()),
            WriteOperation::Delete(d) => OpCode::compose(BaseOp::Delete, d.variant()),
        }
    }

    // abort flag, opcode, return-row flag, then the operation's own fields
    fn write(&self, w: &mut Writer, abort_batch: bool) -> Result<(), NoSQLError> {
        let op = self.op_code()?;
        w.write_bool(self.abort_on_fail() || abort_batch);
        w.write_i16(op as i16);
        match self {
            WriteOperation::Put(p) => {
                w.write_bool(p.return_row);
                p.write_payload(w)
            }
            WriteOperation::Delete(d) => {
                w.write_bool(d.return_row);
                d.write_payload(w)
            }
        }
    }
}

impl From<PutRequest> for WriteOperation {
    fn from(p: PutRequest) -> Self {
        WriteOperation::Put(p)
    }
}

impl From<DeleteRequest> for WriteOperation {
    fn from(d: DeleteRequest) -> Self {
        WriteOperation::Delete(d)
    }
}

/// Struct used to perform multiple [`PutRequest`]s and/or [`DeleteRequest`]s in a single operation.
///
/// All operations must target the same table, or leave their table name empty
/// to use the table of the `WriteManyRequest`. The operations are applied
/// atomically: if one of them fails and it, or the whole batch, is marked
/// abort-on-fail, none of them is applied.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct WriteManyRequest {
    pub(crate) table_name: String,
    pub(crate) timeout: Option<Duration>,
    pub(crate) operations: Vec<WriteOperation>,
    pub(crate) abort_on_fail: bool,
    pub(crate) durability: Option<Durability>,
}

/// Struct representing the result of a single sub-operation of a [`WriteManyRequest`].
#[derive(Default, Debug, Clone, PartialEq)]
pub struct SubOperationResult {
    pub(crate) success: bool,
    pub(crate) version: Option<Version>,
    pub(crate) generated_value: Option<FieldValue>,
    pub(crate) existing_modification_time: Option<DateTime<Utc>>,
    pub(crate) existing_value: Option<MapValue>,
    pub(crate) existing_version: Option<Version>,
}

impl SubOperationResult {
    /// Get the success result of the sub-operation.
    pub fn success(&self) -> bool {
        self.success
    }
    /// For `Put` operations, the Version of the now-current record. `Some` if the put succeeded.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }
    /// For `Put` operations, the value generated for an identity or UUID column, if any.
    pub fn generated_value(&self) -> Option<&FieldValue> {
        self.generated_value.as_ref()
    }
    /// See [`PutResult::existing_modification_time()`] and [`DeleteResult::existing_modification_time()`].
    pub fn existing_modification_time(&self) -> Option<DateTime<Utc>> {
        self.existing_modification_time
    }
    /// See [`PutResult::existing_value()`] and [`DeleteResult::existing_value()`].
    pub fn existing_value(&self) -> Option<&MapValue> {
        self.existing_value.as_ref()
    }
    /// See [`PutResult::existing_version()`] and [`DeleteResult::existing_version()`].
    pub fn existing_version(&self) -> Option<&Version> {
        self.existing_version.as_ref()
    }

    fn write(&self, w: &mut Writer) -> Result<(), NoSQLError> {
        w.write_bool(self.success);
        w.write_bytes_opt(self.version.as_deref());
        let rr = if self.existing_value.is_none()
            && self.existing_version.is_none()
            && self.existing_modification_time.is_none()
        {
            None
        } else {
            Some(ReturnRow {
                value: self.existing_value.clone(),
                version: self.existing_version.clone(),
                modification_time: self.existing_modification_time,
            })
        };
        write_return_row(w, rr.as_ref())?;
        write_field_value_opt(w, self.generated_value.as_ref())
    }

    fn read(r: &mut Reader) -> Result<SubOperationResult, NoSQLError> {
        let mut res = SubOperationResult {
            success: r.read_bool()?,
            version: r.read_bytes_opt()?,
            ..Default::default()
        };
        if let Some(rr) = read_return_row(r)? {
            res.existing_value = rr.value;
            res.existing_version = rr.version;
            res.existing_modification_time = rr.modification_time;
        }
        res.generated_value = read_field_value_opt(r)?;
        Ok(res)
    }
}

/// Struct representing the combined results of a [`WriteManyRequest`] operation.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct WriteManyResult {
    pub(crate) results: Vec<SubOperationResult>,
    pub(crate) failed_operation_index: i32,
    pub(crate) failed_result: Option<SubOperationResult>,
    pub(crate) consumed: Option<Capacity>,
}

impl WriteManyResult {
    /// Whether all operations were applied.
    pub fn success(&self) -> bool {
        self.failed_operation_index < 0
    }
    /// Get a vector of sub-operation results, in the same order as the
    /// operations were added to the `WriteManyRequest`. Empty if the batch was aborted.
    pub fn results(&self) -> &Vec<SubOperationResult> {
        &self.results
    }
    /// Get the offset of the operation that aborted the batch.
    /// If there are no failures, -1 is returned.
    pub fn failed_operation_index(&self) -> i32 {
        self.failed_operation_index
    }
    /// Result of the operation that aborted the batch, if any.
    pub fn failed_operation_result(&self) -> Option<&SubOperationResult> {
        self.failed_result.as_ref()
    }
    /// Get the consumed capacity (read/write units) of the overall operation. This is only valid when billing is enabled.
    pub fn consumed(&self) -> Option<&Capacity> {
        self.consumed.as_ref()
    }
}

impl WriteManyRequest {
    pub fn new(table_name: &str) -> WriteManyRequest {
        WriteManyRequest {
            table_name: table_name.to_string(),
            ..Default::default()
        }
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If set, it must be greater than or equal to 1 millisecond, otherwise an
    /// IllegalArgument error will be returned.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    pub fn timeout(mut self, t: &Duration) -> Self {
        self.timeout = Some(*t);
        self
    }

    /// Add a [`PutRequest`] or [`DeleteRequest`] to the batch.
    pub fn add(mut self, op: impl Into<WriteOperation>) -> WriteManyRequest {
        self.operations.push(op.into());
        self
    }

    /// Add a put of each value in the collection.
    pub fn put<T>(mut self, collection: T) -> WriteManyRequest
    where
        T: IntoIterator<Item = MapValue>,
    {
        for value in collection {
            self.operations
                .push(WriteOperation::Put(PutRequest::new("").value(value)));
        }
        self
    }

    /// Add a delete of each primary key in the collection.
    pub fn delete<T>(mut self, collection: T) -> WriteManyRequest
    where
        T: IntoIterator<Item = MapValue>,
    {
        for key in collection {
            self.operations
                .push(WriteOperation::Delete(DeleteRequest::new("", key)));
        }
        self
    }

    /// Abort the batch if any operation fails, regardless of each
    /// operation's own abort-on-fail setting.
    pub fn abort_on_fail(mut self, val: bool) -> WriteManyRequest {
        self.abort_on_fail = val;
        self
    }

    /// Set the [`Durability`] for the batch. Only honored by on-premises servers.
    pub fn durability(mut self, d: Durability) -> WriteManyRequest {
        self.durability = Some(d);
        self
    }

    /// Number of operations in the batch.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub async fn execute(&self, h: &Handle) -> Result<WriteManyResult, NoSQLError> {
        h.execute(self).await
    }

    fn validate(&self) -> Result<(), NoSQLError> {
        if self.table_name.is_empty() {
            return ia_err!("table name must be non-empty");
        }
        if self.operations.is_empty() {
            return ia_err!("WriteManyRequest requires at least one operation");
        }
        for (i, op) in self.operations.iter().enumerate() {
            let t = op.table_name();
            if !t.is_empty() && !t.eq_ignore_ascii_case(&self.table_name) {
                return ia_err!(
                    "operation {} targets table {}, expected {}",
                    i,
                    t,
                    self.table_name
                );
            }
            match op {
                WriteOperation::Put(p) => p.validate_payload()?,
                WriteOperation::Delete(d) => d.validate_payload()?,
            }
        }
        Ok(())
    }

    pub(crate) fn deserialize_request(r: &mut Reader) -> Result<WriteManyRequest, NoSQLError> {
        let hdr = read_request_header(r)?;
        expect_op(&hdr, &[OpCode::WriteMany])?;
        let durability = read_durability(r)?;
        let n = r.read_packed_i32()?;
        if n < 0 {
            return nosql_err!(BadProtocolMessage, "invalid operation count {}", n);
        }
        let mut operations = Vec::new();
        for _ in 0..n {
            let abort = r.read_bool()?;
            let op = OpCode::from_wire(r.read_i16()?)?;
            let return_row = r.read_bool()?;
            let wop = match op.base() {
                BaseOp::Put => {
                    let p = PutRequest::read_payload(r, op, &hdr.table_name, return_row)?;
                    WriteOperation::Put(p.abort_on_fail(abort))
                }
                BaseOp::Delete => {
                    let d = DeleteRequest::read_payload(r, op, &hdr.table_name, return_row)?;
                    WriteOperation::Delete(d.abort_on_fail(abort))
                }
                _ => {
                    return nosql_err!(
                        BadProtocolMessage,
                        "opcode {:?} is not allowed in WriteMany",
                        op
                    )
                }
            };
            operations.push(wop);
        }
        Ok(WriteManyRequest {
            table_name: hdr.table_name,
            timeout: Some(hdr.timeout),
            operations,
            abort_on_fail: false,
            durability,
        })
    }

    pub(crate) fn serialize_result(res: &WriteManyResult, w: &mut Writer) -> Result<(), NoSQLError> {
        let failed = match (&res.failed_result, res.failed_operation_index) {
            (Some(f), idx) if idx >= 0 => Some((idx, f)),
            _ => None,
        };
        w.write_bool(failed.is_none());
        write_consumed(w, res.consumed.as_ref());
        match failed {
            None => {
                w.write_packed_i32(res.results.len() as i32);
                for sub in &res.results {
                    sub.write(w)?;
                }
            }
            Some((idx, f)) => {
                w.write_packed_i32(idx);
                f.write(w)?;
            }
        }
        Ok(())
    }
}

impl ProtocolRequest for WriteManyRequest {
    type Result = WriteManyResult;

    fn op_code(&self) -> Result<OpCode, NoSQLError> {
        Ok(OpCode::WriteMany)
    }

    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn serialize(&self, w: &mut Writer, opts: &SerializeOptions) -> Result<(), NoSQLError> {
        self.validate()?;
        let begin = w.size();
        write_request_header(w, OpCode::WriteMany, &opts.timeout, &self.table_name);
        write_durability(w, self.durability.as_ref());
        w.write_packed_i32(self.operations.len() as i32);
        for (i, op) in self.operations.iter().enumerate() {
            let start = w.size();
            if let Err(e) = op.write(w, self.abort_on_fail) {
                w.truncate(begin);
                return Err(e);
            }
            let span = w.size() - start;
            if span > opts.max_operation_size {
                w.truncate(begin);
                return nosql_err!(
                    RequestSizeLimitExceeded,
                    "operation {} encodes to {} bytes, limit is {}",
                    i,
                    span,
                    opts.max_operation_size
                );
            }
        }
        Ok(())
    }

    fn deserialize(r: &mut Reader, opts: &SerializeOptions) -> Result<WriteManyResult, NoSQLError> {
        let success = r.read_bool()?;
        let mut res = WriteManyResult {
            consumed: read_consumed(r, opts)?,
            failed_operation_index: -1,
            ..Default::default()
        };
        if success {
            let n = r.read_packed_i32()?;
            if n < 0 {
                return nosql_err!(BadProtocolMessage, "invalid result count {}", n);
            }
            for _ in 0..n {
                res.results.push(SubOperationResult::read(r)?);
            }
        } else {
            let idx = r.read_packed_i32()?;
            if idx < 0 {
                return nosql_err!(BadProtocolMessage, "invalid failed operation index {}", idx);
            }
            res.failed_operation_index = idx;
            res.failed_result = Some(SubOperationResult::read(r)?);
        }
        Ok(res)
    }
}
