//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, StatusCode};
use std::result::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use url::Url;

use crate::auth_common::authorization_provider::{AuthRequest, AuthorizationProvider};
use crate::binary_protocol::{read_response_status, ProtocolRequest, SerializeOptions, PROTOCOL_VERSION};
use crate::error::{nosql_err, user_agent, ErrorContext, NoSQLError, NoSQLErrorCode};
use crate::handle_builder::{HandleBuilder, HandleMode};
use crate::reader::Reader;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::transport::{Transport, TransportResponse};
use crate::types::OpCode;
use crate::writer::Writer;

pub(crate) const REQUEST_ID_HEADER: &str = "x-nosql-request-id";
pub(crate) const SERIAL_VERSION_HEADER: &str = "x-nosql-serial-version";

/// **The main database handle**.
///
/// This should be created once and used
/// throughout the application lifetime, across all threads.
///
/// Note: there is no need to enclose this struct in an `Rc` or [`Arc`], as it uses an
/// [`Arc`] internally, so calling `.clone()` on this struct will always return the
/// same underlying handle.
#[derive(Clone, Debug)]
pub struct Handle {
    // Use an inner Arc so cloning keeps the same contents
    pub(crate) inner: Arc<HandleRef>,
}

#[derive(Debug)]
pub(crate) struct HandleRef {
    pub(crate) mode: HandleMode,
    pub(crate) url: Url,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) auth: Option<Arc<dyn AuthorizationProvider>>,
    pub(crate) retry_policy: Arc<dyn RetryPolicy>,
    pub(crate) timeout: Duration,
    pub(crate) billing: bool,
    pub(crate) max_operation_size: usize,
    request_id: AtomicU64,
}

impl Handle {
    /// Create a new [`HandleBuilder`].
    pub fn builder() -> HandleBuilder {
        HandleBuilder::new()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        mode: HandleMode,
        url: Url,
        transport: Arc<dyn Transport>,
        auth: Option<Arc<dyn AuthorizationProvider>>,
        retry_policy: Arc<dyn RetryPolicy>,
        timeout: Duration,
        billing: bool,
        max_operation_size: usize,
    ) -> Handle {
        debug!(
            "Creating new Handle: mode={:?}, endpoint={}, auth={:?}",
            mode, url, auth
        );
        Handle {
            inner: Arc::new(HandleRef {
                mode,
                url,
                transport,
                auth,
                retry_policy,
                timeout,
                billing,
                max_operation_size,
                request_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn mode(&self) -> HandleMode {
        self.inner.mode
    }

    /// Full URL requests are posted to.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Default timeout for requests that do not set their own.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    // Build, sign, send, classify, then decode or retry.
    pub(crate) async fn execute<R: ProtocolRequest>(&self, req: &R) -> Result<R::Result, NoSQLError> {
        let op = req.op_code()?;
        let table = req.table_name();
        let timeout = req.timeout().unwrap_or(self.inner.timeout);
        let opts = SerializeOptions {
            timeout,
            billing: self.inner.billing,
            max_operation_size: self.inner.max_operation_size,
        };
        let ctx = |e: NoSQLError, attempts: u32| {
            e.with_context(ErrorContext {
                op_code: op,
                table_name: table.to_string(),
                attempts,
            })
        };

        let mut w = Writer::new();
        req.serialize(&mut w, &opts).map_err(|e| ctx(e, 0))?;
        let mut first_body = Some(Bytes::from(w.into_bytes()));

        let start = Instant::now();
        let deadline = start + timeout;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let body = match first_body.take() {
                Some(b) => b,
                None => {
                    // the wire timeout tells the service what is left of the budget
                    let retry_opts = SerializeOptions {
                        timeout: deadline.saturating_duration_since(Instant::now()),
                        ..opts.clone()
                    };
                    let mut w = Writer::new();
                    req.serialize(&mut w, &retry_opts)
                        .map_err(|e| ctx(e, attempt))?;
                    Bytes::from(w.into_bytes())
                }
            };
            let err = match self.send_once(op, body, deadline).await {
                Ok(resp) => match Self::decode::<R>(&resp, &opts) {
                    Ok(res) => return Ok(res),
                    Err(e) => e,
                },
                Err(e) => e,
            };

            if err.code == NoSQLErrorCode::RetryAuthentication {
                if let Some(auth) = &self.inner.auth {
                    auth.invalidate();
                }
            }
            if !err.is_retryable() {
                return Err(ctx(err, attempt));
            }
            let delay = match self
                .inner
                .retry_policy
                .should_retry(attempt, &err, start.elapsed())
            {
                RetryDecision::Retry(d) => d,
                RetryDecision::Stop => return Err(ctx(err, attempt)),
            };
            if Instant::now() + delay >= deadline {
                let e = NoSQLError::new(
                    NoSQLErrorCode::RequestTimeout,
                    &format!(
                        "request timed out after {:?} and {} attempts, last error: {}",
                        timeout, attempt, err
                    ),
                );
                return Err(ctx(e, attempt));
            }
            warn!(
                "{:?} on table {} failed on attempt {}, retrying in {:?}: {}",
                op, table, attempt, delay, err
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn decode<R: ProtocolRequest>(
        resp: &Bytes,
        opts: &SerializeOptions,
    ) -> Result<R::Result, NoSQLError> {
        let mut r = Reader::new().from_bytes(resp);
        read_response_status(&mut r)?;
        R::deserialize(&mut r, opts)
    }

    async fn send_once(&self, op: OpCode, body: Bytes, deadline: Instant) -> Result<Bytes, NoSQLError> {
        let request_id = self.inner.request_id.fetch_add(1, Ordering::Relaxed);
        trace!("sending {:?} request_id={}", op, request_id);

        let mut headers = HeaderMap::new();
        if let Some(auth) = &self.inner.auth {
            let req = AuthRequest {
                method: &Method::POST,
                url: &self.inner.url,
            };
            // Any failure to authorize ends the request, whatever code the provider used.
            headers = match tokio::time::timeout_at(deadline, auth.authorize(&req, deadline)).await {
                Ok(Ok(h)) => h,
                Ok(Err(e)) if e.code == NoSQLErrorCode::RequestTimeout => return Err(e),
                Ok(Err(e)) => {
                    return Err(NoSQLError::new(
                        NoSQLErrorCode::AuthenticationFailed,
                        &e.message,
                    ))
                }
                Err(_) => return nosql_err!(RequestTimeout, "timed out authorizing request"),
            };
        } else if self.inner.mode == HandleMode::Cloudsim {
            headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer rust"));
        }
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from(request_id));
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent())?);
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        headers.insert(SERIAL_VERSION_HEADER, HeaderValue::from(PROTOCOL_VERSION));

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return nosql_err!(RequestTimeout, "no time left to send request");
        }
        // The transport future is dropped on timeout, which releases its connection.
        let send = self
            .inner
            .transport
            .send(&self.inner.url, body, headers, remaining);
        let resp = match tokio::time::timeout_at(deadline, send).await {
            Ok(r) => r?,
            Err(_) => return nosql_err!(RequestTimeout, "request timed out after {:?}", remaining),
        };

        if !resp.status.is_success() {
            return Err(error_from_http(&resp));
        }
        if let Some(v) = resp.headers.get(REQUEST_ID_HEADER) {
            let rid = v.to_str().ok().and_then(|s| s.parse::<u64>().ok());
            if rid != Some(request_id) {
                return nosql_err!(
                    BadProtocolMessage,
                    "expected request_id {}, found {:?}",
                    request_id,
                    v
                );
            }
        }
        trace!("received response for request_id={}", request_id);
        Ok(resp.body)
    }
}

// A failed HTTP status. Prefer the error envelope in the body, if the service sent one.
fn error_from_http(resp: &TransportResponse) -> NoSQLError {
    let mut r = Reader::new().from_bytes(&resp.body);
    // Plain text bodies can start with a byte that looks like an error code,
    // so the envelope must span the whole body.
    if let Err(e) = read_response_status(&mut r) {
        if e.is_service_error() && e.code != NoSQLErrorCode::UnknownError && r.remaining() == 0 {
            return e;
        }
    }
    let text = String::from_utf8_lossy(&resp.body);
    let code = match resp.status {
        StatusCode::UNAUTHORIZED => NoSQLErrorCode::InvalidAuthorization,
        StatusCode::FORBIDDEN => NoSQLErrorCode::InsufficientPermission,
        StatusCode::NOT_FOUND => NoSQLErrorCode::ResourceNotFound,
        StatusCode::TOO_MANY_REQUESTS => NoSQLErrorCode::OperationLimitExceeded,
        StatusCode::SERVICE_UNAVAILABLE => NoSQLErrorCode::ServiceUnavailable,
        s if s.is_server_error() => NoSQLErrorCode::ServerError,
        _ => NoSQLErrorCode::UnknownError,
    };
    NoSQLError::new(
        code,
        &format!("unexpected http status {}: {}", resp.status, text),
    )
}

impl HandleRef {
    #[cfg(test)]
    pub(crate) fn next_request_id(&self) -> u64 {
        self.request_id.load(Ordering::Relaxed)
    }
}
