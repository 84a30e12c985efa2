//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Binary-protocol driver for Oracle NoSQL Database data operations
//!
//! This crate sends single-row and multi-row data operations to the
//! [Oracle NoSQL Database Cloud Service](https://www.oracle.com/database/nosql-cloud.html),
//! an on-premises Oracle NoSQL Database proxy, or the Cloud Simulator, using the
//! service's binary wire protocol over https.
//!
//! All methods are `async` and run on the [tokio](https://crates.io/crates/tokio) runtime.
//!
//! The general flow for an application is:
//! - Create a [`HandleBuilder`] with all needed parameters
//! - Create a [`Handle`] from the [`HandleBuilder`] that will be used throughout the application, across all threads
//! - Execute requests such as [`GetRequest`], [`PutRequest`], [`DeleteRequest`],
//!   [`DeleteRangeRequest`] and [`WriteManyRequest`] against the [`Handle`]
//!
//! ## Simple Example
//! ```no_run
//! use nosql_wire_driver::{Handle, GetRequest, PutRequest};
//! use nosql_wire_driver::types::MapValue;
//! use std::error::Error;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn Error>> {
//!     let handle = Handle::builder()
//!         .endpoint("http://localhost:8080")?
//!         .mode(nosql_wire_driver::HandleMode::Cloudsim)?
//!         .build()
//!         .await?;
//!     PutRequest::new("test_table")
//!         .value(MapValue::new().i32("id", 10).str("name", "jane"))
//!         .execute(&handle)
//!         .await?;
//!     let getres = GetRequest::new("test_table")
//!         .key(MapValue::new().i32("id", 10))
//!         .execute(&handle)
//!         .await?;
//!     println!("GetResult={:?}", getres);
//!     Ok(())
//! }
//! ```
//!
//! ## Authorization
//!
//! - **Cloud Service**: requests are signed with the user's RSA key. Credentials come
//!   from an OCI config file ([`HandleBuilder::cloud_auth_from_file()`]), are given
//!   directly ([`HandleBuilder::cloud_auth()`]) or come from any
//!   [`CredentialSource`](auth_common::credentials::CredentialSource)
//!   ([`HandleBuilder::cloud_auth_from_source()`]). The signed date is always UTC.
//! - **On-premises**: a secure store is accessed with a session token obtained with a
//!   user name and password ([`HandleBuilder::onprem_auth()`],
//!   [`HandleBuilder::onprem_auth_from_file()`]).
//! - **Cloud Simulator**: no credentials.
//!
//! Custom root certificates may be trusted with [`HandleBuilder::add_cert_from_pemfile()`].
//!
//! ## Errors and retries
//!
//! Every operation returns a [`NoSQLError`]. Errors raised while executing a request
//! carry an [`ErrorContext`] naming the operation, table and number of attempts.
//! Throttling, transient server errors, timeouts and dropped connections are retried
//! according to the handle's [`RetryPolicy`] until the request's timeout expires.
//!
//! ## Logging
//!
//! The crate logs with [tracing](https://crates.io/crates/tracing). Secrets are never logged.

pub mod auth_common;
pub use crate::auth_common::authorization_provider::{AuthRequest, AuthorizationProvider};

pub(crate) mod binary_protocol;

pub(crate) mod delete_range_request;
pub use crate::delete_range_request::{DeleteRangeRequest, DeleteRangeResult, FieldRange};

pub(crate) mod delete_request;
pub use crate::delete_request::{DeleteRequest, DeleteResult};

pub(crate) mod error;
pub use crate::error::{ErrorContext, NoSQLError, NoSQLErrorCode};

pub(crate) mod get_request;
pub use crate::get_request::{GetRequest, GetResult};

pub(crate) mod handle;
pub use crate::handle::Handle;

pub(crate) mod handle_builder;
pub use crate::handle_builder::{HandleBuilder, HandleMode};

pub(crate) mod packed_integer;

pub(crate) mod put_request;
pub use crate::put_request::{PutRequest, PutResult};

pub mod reader;

pub mod retry;
pub use crate::retry::{DefaultRetryPolicy, NoRetry, RetryDecision, RetryPolicy};

pub mod transport;
pub use crate::transport::{ReqwestTransport, Transport, TransportResponse};

pub mod types;
pub use crate::types::Version;

pub(crate) mod write_many_request;
pub use crate::write_many_request::{
    SubOperationResult, WriteManyRequest, WriteManyResult, WriteOperation,
};

pub mod writer;

#[cfg(test)]
pub(crate) mod field_value_tests;
#[cfg(test)]
pub(crate) mod pipeline_tests;
