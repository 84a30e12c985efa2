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
use crate::types::{Capacity, Consistency, MapValue, OpCode, Version};
use crate::writer::Writer;
use chrono::{DateTime, Utc};
use std::result::Result;
use std::time::Duration;

/// Struct used for getting a single row of data from a NoSQL Database table.
///
/// The row is identified by its full primary key. The key must contain all
/// fields that make up the primary key of the table.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct GetRequest {
    pub(crate) table_name: String,
    pub(crate) key: MapValue,
    pub(crate) timeout: Option<Duration>,
    pub(crate) consistency: Consistency,
}

/// Struct representing the result of a [`GetRequest`] operation.
///
/// This struct is returned from a [`GetRequest::execute()`] call.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct GetResult {
    pub(crate) row: Option<MapValue>,
    pub(crate) consumed: Option<Capacity>,
    pub(crate) modification_time: Option<DateTime<Utc>>,
    pub(crate) expiration_time: Option<DateTime<Utc>>,
    pub(crate) version: Option<Version>,
}

impl GetResult {
    /// Get the returned row. If the row does not exist in the table, this value will be `None`.
    pub fn row(&self) -> Option<&MapValue> {
        self.row.as_ref()
    }
    /// Get the consumed capacity (read/write units) of the operation. This is only valid when billing is enabled.
    pub fn consumed(&self) -> Option<&Capacity> {
        self.consumed.as_ref()
    }
    /// Get the last modification time of the row. This is only valid if the row exists.
    pub fn modification_time(&self) -> Option<DateTime<Utc>> {
        self.modification_time
    }
    /// Get the expiration time of the row. `None` if the row does not exist or never expires.
    pub fn expiration_time(&self) -> Option<DateTime<Utc>> {
        self.expiration_time
    }
    /// Get the version of the row. This is only valid if the row exists.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }
}

impl GetRequest {
    /// Create a new `GetRequest`.
    ///
    /// `table_name` is required and must be non-empty.
    pub fn new(table_name: &str) -> GetRequest {
        GetRequest {
            table_name: table_name.to_string(),
            ..Default::default()
        }
    }

    /// Specify the primary key to use to find the row (record) in the table.
    ///
    /// `key` must contain all fields required to construct the primary key for the table.
    pub fn key(mut self, key: MapValue) -> GetRequest {
        self.key = key;
        self
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If set, it must be greater than or equal to 1 millisecond, otherwise an
    /// IllegalArgument error will be returned.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    pub fn timeout(mut self, t: &Duration) -> GetRequest {
        self.timeout = Some(*t);
        self
    }

    /// Specify the desired [`Consistency`] for the operation.
    pub fn consistency(mut self, c: Consistency) -> GetRequest {
        self.consistency = c;
        self
    }

    /// Execute the request, returning a [`GetResult`].
    ///
    /// If the record exists in the table, [`GetResult::row`] will be `Some()`.
    pub async fn execute(&self, h: &Handle) -> Result<GetResult, NoSQLError> {
        h.execute(self).await
    }

    fn validate(&self) -> Result<(), NoSQLError> {
        if self.table_name.is_empty() {
            return ia_err!("table name must be non-empty");
        }
        if self.key.is_empty() {
            return ia_err!("primary key must be non-empty");
        }
        Ok(())
    }

    pub(crate) fn deserialize_request(r: &mut Reader) -> Result<GetRequest, NoSQLError> {
        let hdr = read_request_header(r)?;
        expect_op(&hdr, &[OpCode::Get])?;
        let c = r.read_byte()?;
        let consistency = match Consistency::try_from(c) {
            Ok(c) => c,
            Err(_) => return crate::error::nosql_err!(BadProtocolMessage, "invalid consistency {}", c),
        };
        Ok(GetRequest {
            table_name: hdr.table_name,
            timeout: Some(hdr.timeout),
            consistency,
            key: r.read_map()?,
        })
    }

    pub(crate) fn serialize_result(res: &GetResult, w: &mut Writer) -> Result<(), NoSQLError> {
        write_consumed(w, res.consumed.as_ref());
        match &res.row {
            Some(row) => {
                w.write_bool(true);
                w.write_map(row)?;
                w.write_timestamp_opt(res.expiration_time.as_ref());
                w.write_timestamp_opt(res.modification_time.as_ref());
                w.write_bytes_opt(res.version.as_deref());
            }
            None => w.write_bool(false),
        }
        Ok(())
    }
}

impl ProtocolRequest for GetRequest {
    type Result = GetResult;

    fn op_code(&self) -> Result<OpCode, NoSQLError> {
        Ok(OpCode::Get)
    }

    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn serialize(&self, w: &mut Writer, opts: &SerializeOptions) -> Result<(), NoSQLError> {
        self.validate()?;
        write_request_header(w, OpCode::Get, &opts.timeout, &self.table_name);
        w.write_byte(self.consistency as u8);
        w.write_map(&self.key)
    }

    fn deserialize(r: &mut Reader, opts: &SerializeOptions) -> Result<GetResult, NoSQLError> {
        let mut res = GetResult {
            consumed: read_consumed(r, opts)?,
            ..Default::default()
        };
        if r.read_bool()? {
            res.row = Some(r.read_map()?);
            res.expiration_time = r.read_timestamp_opt()?;
            res.modification_time = r.read_timestamp_opt()?;
            res.version = r.read_bytes_opt()?;
        }
        Ok(res)
    }
}
