//
// Copyright (c) 2024 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::binary_protocol::*;
use crate::error::{ia_err, nosql_err, NoSQLError};
use crate::handle::Handle;
use crate::reader::Reader;
use crate::types::{Capacity, Durability, FieldValue, MapValue, OpCode};
use crate::writer::Writer;
use std::result::Result;
use std::time::Duration;
use tracing::trace;

/// A range of values to be used in a [`DeleteRangeRequest`] operation.
///
/// `FieldRange` is used as the least significant component in a partially
/// specified key value in order to create a value range for an operation that
/// affects multiple rows. The data types supported by `FieldRange` are
/// limited to the atomic types which are valid for primary keys.
///
/// The least significant component of a key is the first component of the key
/// that is not fully specified. For example, if the primary key for a table is
/// defined as the tuple:
///
///   <a, b, c>
///
/// A `FieldRange` can be specified for:
///
///   "a" if the primary key supplied is empty.
///   "b" if the primary key supplied to the operation has a concrete value for "a" but not for "b" or "c".
///
/// The `field_path` must name a field in the table's primary key. The `start`
/// and `end` values must be of the same type, matching the type of that field.
/// The server validates this when the range is used.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct FieldRange {
    /// Path to the key field the range applies to.
    pub field_path: String,

    /// Start of the range. `None` means unbounded.
    pub start: Option<FieldValue>,

    /// Whether `start` itself is in the range. Ignored without a start value.
    pub start_inclusive: bool,

    /// End of the range. `None` means unbounded.
    pub end: Option<FieldValue>,

    /// Whether `end` itself is in the range. Ignored without an end value.
    pub end_inclusive: bool,
}

impl FieldRange {
    pub fn new(field_path: &str) -> FieldRange {
        FieldRange {
            field_path: field_path.to_string(),
            ..Default::default()
        }
    }

    pub fn start(mut self, val: FieldValue, inclusive: bool) -> FieldRange {
        self.start = Some(val);
        self.start_inclusive = inclusive;
        self
    }

    pub fn end(mut self, val: FieldValue, inclusive: bool) -> FieldRange {
        self.end = Some(val);
        self.end_inclusive = inclusive;
        self
    }

    fn validate(&self) -> Result<(), NoSQLError> {
        if self.field_path.is_empty() {
            return ia_err!("field range requires a field path");
        }
        if self.start.is_none() && self.end.is_none() {
            return ia_err!("field range requires a start or end value");
        }
        Ok(())
    }

    fn write(&self, w: &mut Writer) -> Result<(), NoSQLError> {
        w.write_string(&self.field_path);
        write_field_value_opt(w, self.start.as_ref())?;
        w.write_bool(self.start_inclusive);
        write_field_value_opt(w, self.end.as_ref())?;
        w.write_bool(self.end_inclusive);
        Ok(())
    }

    fn read(r: &mut Reader) -> Result<FieldRange, NoSQLError> {
        Ok(FieldRange {
            field_path: r.read_string()?,
            start: read_field_value_opt(r)?,
            start_inclusive: r.read_bool()?,
            end: read_field_value_opt(r)?,
            end_inclusive: r.read_bool()?,
        })
    }
}

/// Struct used for deleting a range of rows from a NoSQL table.
///
/// All rows matching the partial primary key (and the optional [`FieldRange`])
/// are deleted. The server may stop after deleting part of the range; in that
/// case [`DeleteRangeResult::continuation_key()`] is `Some` and should be passed
/// back via [`DeleteRangeRequest::continuation_key()`] to continue. Use
/// [`execute_all()`](DeleteRangeRequest::execute_all()) to do this automatically.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct DeleteRangeRequest {
    pub(crate) table_name: String,
    pub(crate) key: MapValue,
    pub(crate) continuation_key: Option<Vec<u8>>,
    pub(crate) field_range: Option<FieldRange>,
    pub(crate) max_write_kb: i32,
    pub(crate) timeout: Option<Duration>,
    pub(crate) durability: Option<Durability>,
}

/// Struct representing the result of a [`DeleteRangeRequest`] operation.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct DeleteRangeResult {
    pub(crate) num_deleted: i32,
    pub(crate) continuation_key: Option<Vec<u8>>,
    pub(crate) consumed: Option<Capacity>,
}

impl DeleteRangeResult {
    /// Get the number of records deleted by this page of the operation.
    pub fn num_deleted(&self) -> i32 {
        self.num_deleted
    }
    /// Continuation key to resume the operation. `None` when the range is exhausted.
    pub fn continuation_key(&self) -> Option<&Vec<u8>> {
        self.continuation_key.as_ref()
    }
    /// Get the consumed capacity (read/write units) of the operation. This is only valid when billing is enabled.
    pub fn consumed(&self) -> Option<&Capacity> {
        self.consumed.as_ref()
    }
}

impl DeleteRangeRequest {
    /// Create a new `DeleteRangeRequest`.
    ///
    /// `table_name` specifies the name of table for the request.
    /// It is required and must be non-empty.
    ///
    /// `partial_key` specifies the partial primary key used for the request.
    pub fn new(table_name: &str, partial_key: MapValue) -> DeleteRangeRequest {
        DeleteRangeRequest {
            table_name: table_name.to_string(),
            key: partial_key,
            ..Default::default()
        }
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If set, it must be greater than or equal to 1 millisecond, otherwise an
    /// IllegalArgument error will be returned.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    pub fn timeout(mut self, t: &Duration) -> DeleteRangeRequest {
        self.timeout = Some(*t);
        self
    }

    /// Specify the [`FieldRange`] to be used for the operation.
    ///
    /// It is optional, but required to delete a specific range of rows.
    pub fn field_range(mut self, field_range: FieldRange) -> DeleteRangeRequest {
        self.field_range = Some(field_range);
        self
    }

    /// Specify the continuation key to use to continue the operation.
    ///
    /// This is typically populated from a previous [`DeleteRangeResult::continuation_key()`].
    pub fn continuation_key(mut self, key: Vec<u8>) -> DeleteRangeRequest {
        self.continuation_key = Some(key);
        self
    }

    /// Specify the limit on the total KB written during one page of this operation.
    ///
    /// If not set, or set to 0, the server limit applies. This value can
    /// only reduce the server limit.
    pub fn max_write_kb(mut self, max_write_kb: i32) -> DeleteRangeRequest {
        self.max_write_kb = max_write_kb;
        self
    }

    /// Set the [`Durability`] for the write. Only honored by on-premises servers.
    pub fn durability(mut self, d: Durability) -> DeleteRangeRequest {
        self.durability = Some(d);
        self
    }

    /// Delete one page of the range.
    pub async fn execute(&self, h: &Handle) -> Result<DeleteRangeResult, NoSQLError> {
        h.execute(self).await
    }

    /// Delete the whole range, following continuation keys until the range is exhausted.
    ///
    /// The returned result holds the total number of rows deleted and the summed
    /// consumed capacity. Its continuation key is always `None`.
    pub async fn execute_all(&self, h: &Handle) -> Result<DeleteRangeResult, NoSQLError> {
        let mut req = self.clone();
        let mut total = DeleteRangeResult::default();
        let mut pages = 0;
        loop {
            let res = h.execute(&req).await?;
            pages += 1;
            total.num_deleted = total.num_deleted.saturating_add(res.num_deleted);
            if let Some(c) = &res.consumed {
                total.consumed.get_or_insert_with(Capacity::default).add(c);
            }
            match res.continuation_key {
                Some(k) if req.continuation_key.as_ref() == Some(&k) => {
                    return nosql_err!(
                        BadProtocolMessage,
                        "delete range on {} returned the same continuation key twice",
                        self.table_name
                    );
                }
                Some(k) => req.continuation_key = Some(k),
                None => break,
            }
        }
        trace!(
            "delete range on {} removed {} rows in {} pages",
            self.table_name,
            total.num_deleted,
            pages
        );
        Ok(total)
    }

    fn validate(&self) -> Result<(), NoSQLError> {
        if self.table_name.is_empty() {
            return ia_err!("table name must be non-empty");
        }
        if self.max_write_kb < 0 {
            return ia_err!("max_write_kb must not be negative");
        }
        if let Some(fr) = &self.field_range {
            fr.validate()?;
        }
        Ok(())
    }

    pub(crate) fn deserialize_request(r: &mut Reader) -> Result<DeleteRangeRequest, NoSQLError> {
        let hdr = read_request_header(r)?;
        expect_op(&hdr, &[OpCode::DeleteRange])?;
        let durability = read_durability(r)?;
        let key = r.read_map()?;
        let field_range = match r.read_bool()? {
            true => Some(FieldRange::read(r)?),
            false => None,
        };
        Ok(DeleteRangeRequest {
            table_name: hdr.table_name,
            timeout: Some(hdr.timeout),
            durability,
            key,
            field_range,
            max_write_kb: r.read_packed_i32()?,
            continuation_key: r.read_bytes_opt()?,
        })
    }

    pub(crate) fn serialize_result(
        res: &DeleteRangeResult,
        w: &mut Writer,
    ) -> Result<(), NoSQLError> {
        write_consumed(w, res.consumed.as_ref());
        w.write_packed_i32(res.num_deleted);
        w.write_bytes_opt(res.continuation_key.as_deref());
        Ok(())
    }
}

impl ProtocolRequest for DeleteRangeRequest {
    type Result = DeleteRangeResult;

    fn op_code(&self) -> Result<OpCode, NoSQLError> {
        Ok(OpCode::DeleteRange)
    }

    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn serialize(&self, w: &mut Writer, opts: &SerializeOptions) -> Result<(), NoSQLError> {
        self.validate()?;
        write_request_header(w, OpCode::DeleteRange, &opts.timeout, &self.table_name);
        write_durability(w, self.durability.as_ref());
        w.write_map(&self.key)?;
        match &self.field_range {
            Some(fr) => {
                w.write_bool(true);
                fr.write(w)?;
            }
            None => w.write_bool(false),
        }
        w.write_packed_i32(self.max_write_kb);
        w.write_bytes_opt(self.continuation_key.as_deref());
        Ok(())
    }

    fn deserialize(
        r: &mut Reader,
        opts: &SerializeOptions,
    ) -> Result<DeleteRangeResult, NoSQLError> {
        Ok(DeleteRangeResult {
            consumed: read_consumed(r, opts)?,
            num_deleted: r.read_packed_i32()?,
            continuation_key: r.read_bytes_opt()?,
        })
    }
}
