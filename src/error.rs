//
// Copyright (c) 2024 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use num_enum::TryFromPrimitive;
use std::error::Error as StdError;
use std::io;

use crate::types::OpCode;

include!(concat!(env!("OUT_DIR"), "/ua.rs"));

pub(crate) fn driver_version() -> &'static str {
    DRIVER_VERSION
}

pub(crate) fn user_agent() -> &'static str {
    USER_AGENT
}

/// Error returned by every fallible operation in this library.
///
/// Errors raised by the execution pipeline carry an [`ErrorContext`] naming
/// the operation, table and number of attempts made.
#[derive(Debug, Clone)]
pub struct NoSQLError {
    pub code: NoSQLErrorCode,
    pub message: String,
    pub(crate) context: Option<ErrorContext>,
    // set only for errors decoded from a response envelope
    from_service: bool,
}

/// Where an error happened: which operation, on which table, after how many attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorContext {
    pub op_code: OpCode,
    pub table_name: String,
    pub attempts: u32,
}

impl StdError for NoSQLError {}

impl std::fmt::Display for NoSQLError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "code={:?} message=\"{}\"", self.code, self.message)?;
        if let Some(ctx) = &self.context {
            write!(
                f,
                " op={:?} table={} attempts={}",
                ctx.op_code, ctx.table_name, ctx.attempts
            )?;
        }
        Ok(())
    }
}

impl NoSQLError {
    pub fn new(code: NoSQLErrorCode, msg: &str) -> NoSQLError {
        NoSQLError {
            code,
            message: msg.to_string(),
            context: None,
            from_service: false,
        }
    }

    /// Build an error from an integer code, as returned by the service.
    pub fn from_int(icode: i32, msg: &str) -> NoSQLError {
        let mut e = match NoSQLErrorCode::try_from(icode) {
            Ok(code) => NoSQLError::new(code, msg),
            Err(_) => NoSQLError::new(
                NoSQLErrorCode::UnknownError,
                &format!("invalid integer error code {}: {}", icode, msg),
            ),
        };
        e.from_service = true;
        e
    }

    /// The operation context, if this error came out of the execution pipeline.
    pub fn context(&self) -> Option<&ErrorContext> {
        self.context.as_ref()
    }

    pub(crate) fn with_context(mut self, ctx: ErrorContext) -> NoSQLError {
        self.context = Some(ctx);
        self
    }

    /// Returns true if the same request may succeed when sent again.
    ///
    /// This is a fixed property of the error code. Codec, authorization and
    /// argument errors are never retryable.
    pub fn is_retryable(&self) -> bool {
        use NoSQLErrorCode::*;
        matches!(
            self.code,
            ReadLimitExceeded
                | WriteLimitExceeded
                | OperationLimitExceeded
                | RequestTimeout
                | ServerError
                | ServiceUnavailable
                | TableBusy
                | SecurityInfoUnavailable
                | RetryAuthentication
                | ConnectionFailure
        )
    }

    /// Returns true if this error was decoded from a service error response.
    ///
    /// Errors raised locally are never service errors, even when they share
    /// a code with one the service can return.
    pub fn is_service_error(&self) -> bool {
        self.from_service
    }
}

macro_rules! ia_error {
    ($($t:tt)*) => {{
        let m = format!($($t)*);
        crate::error::NoSQLError::new(
            crate::error::NoSQLErrorCode::IllegalArgument,
            &format!("{} ({})", m, crate::error::driver_version()),
        )
    }};
}

pub(crate) use ia_error;

macro_rules! ia_err {
    ($($t:tt)*) => {{
        Err(crate::error::ia_error!($($t)*))
    }};
}

pub(crate) use ia_err;

macro_rules! nosql_err {
    ($code:ident, $($t:tt)*) => {{
        Err(crate::error::NoSQLError::new(
            crate::error::NoSQLErrorCode::$code,
            &format!($($t)*),
        ))
    }};
}

pub(crate) use nosql_err;

// Walk the source chain of a transport error looking for the root cause.
fn classify_transport_error(e: &(dyn StdError + 'static)) -> NoSQLErrorCode {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if let Some(ioe) = err.downcast_ref::<io::Error>() {
            match ioe.kind() {
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => return NoSQLErrorCode::ConnectionFailure,
                io::ErrorKind::TimedOut => return NoSQLErrorCode::RequestTimeout,
                _ => {}
            }
        }
        if let Some(tls) = err.downcast_ref::<rustls::Error>() {
            if matches!(
                tls,
                rustls::Error::InvalidCertificate(_) | rustls::Error::NoCertificatesPresented
            ) {
                return NoSQLErrorCode::CertificateRejected;
            }
        }
        let msg = err.to_string().to_lowercase();
        if msg.contains("dns error") || msg.contains("failed to lookup address") {
            return NoSQLErrorCode::NameResolutionFailure;
        }
        if msg.contains("invalid peer certificate") {
            return NoSQLErrorCode::CertificateRejected;
        }
        cur = err.source();
    }
    NoSQLErrorCode::TransportFailure
}

impl From<reqwest::Error> for NoSQLError {
    fn from(e: reqwest::Error) -> Self {
        let code = if e.is_timeout() {
            NoSQLErrorCode::RequestTimeout
        } else {
            let c = classify_transport_error(&e);
            if c == NoSQLErrorCode::TransportFailure && e.is_connect() {
                NoSQLErrorCode::ConnectionFailure
            } else {
                c
            }
        };
        NoSQLError::new(
            code,
            &format!("transport error: {} ({})", e, driver_version()),
        )
    }
}

impl From<reqwest::header::InvalidHeaderValue> for NoSQLError {
    fn from(e: reqwest::header::InvalidHeaderValue) -> Self {
        ia_error!("invalid header value: {}", e)
    }
}

impl From<url::ParseError> for NoSQLError {
    fn from(e: url::ParseError) -> Self {
        ia_error!("error parsing url: {}", e)
    }
}

// NoSQLErrorCode represents the error code.
// Error codes are divided into categories as follows:
//
// 1. Error codes for user-generated errors, range from 1 to 50(exclusive).
// These include illegal arguments, exceeding size limits for some objects,
// resource not found, etc.
//
// 2. Error codes for user throttling, range from 50 to 100(exclusive).
//
// 3. Error codes for server issues, range from 100 to 150(exclusive).
//
// 3.1 Retryable server issues, range from 100 to 125(exclusive), that represent
// internal problems, presumably temporary, and need to be sent back to the
// application for retry.
//
// 3.2 Other server issues, begin from 125.
// These include server illegal state, unknown server error, etc.
// They might be retryable, or not.
//
// 4. Errors raised inside the driver itself (codec, authorization and
// transport failures) begin from 1001 and never appear on the wire.
//
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(i32)]
pub enum NoSQLErrorCode {
    /// NoError represents there is no error.
    NoError = 0,

    /// UnknownOperation error represents the operation attempted is unknown.
    UnknownOperation = 1,

    /// TableNotFound error represents the operation attempted to access a table
    /// that does not exist or is not in a visible state.
    TableNotFound = 2,

    /// IndexNotFound error represents the operation attempted to access an index
    /// that does not exist or is not in a visible state.
    IndexNotFound = 3,

    /// IllegalArgument error represents the application provided an illegal
    /// argument for the operation.
    IllegalArgument = 4,

    /// RowSizeLimitExceeded error represents an attempt has been made to create
    /// a row with a size that exceeds the system defined limit.
    ///
    /// This is used for cloud service only.
    RowSizeLimitExceeded = 5,

    /// KeySizeLimitExceeded error represents an attempt has been made to create
    /// a row with a primary key or index key size that exceeds the system defined limit.
    ///
    /// This is used for cloud service only.
    KeySizeLimitExceeded = 6,

    /// BatchOpNumberLimitExceeded error represents that the number of operations
    /// included in Client.WriteMultiple operation exceeds the system defined limit.
    ///
    /// This is used for cloud service only.
    BatchOpNumberLimitExceeded = 7,

    /// RequestSizeLimitExceeded error represents that the size of a request
    /// exceeds the system defined limit.
    ///
    /// This is used for cloud service only.
    RequestSizeLimitExceeded = 8,

    /// TableExists error represents the operation attempted to create a table
    /// but the named table already exists.
    TableExists = 9,

    /// IndexExists error represents the operation attempted to create an index
    /// for a table but the named index already exists.
    IndexExists = 10,

    /// InvalidAuthorization error represents the client provides an invalid
    /// authorization string in the request header.
    InvalidAuthorization = 11,

    /// InsufficientPermission error represents an application does not have
    /// sufficient permission to perform a request.
    InsufficientPermission = 12,

    /// ResourceExists error represents the operation attempted to create a
    /// resource but it already exists.
    ResourceExists = 13,

    /// ResourceNotFound error represents the operation attempted to access a
    /// resource that does not exist or is not in a visible state.
    ResourceNotFound = 14,

    /// TableLimitExceeded error represents an attempt has been made to create a
    /// number of tables that exceeds the system defined limit.
    ///
    /// This is used for cloud service only.
    TableLimitExceeded = 15,

    /// IndexLimitExceeded error represents an attempt has been made to create
    /// more indexes on a table than the system defined limit.
    ///
    /// This is used for cloud service only.
    IndexLimitExceeded = 16,

    /// BadProtocolMessage error represents there is an error in the protocol
    /// used by client and server to exchange informations.
    BadProtocolMessage = 17,

    /// EvolutionLimitExceeded error represents an attempt has been made to evolve
    /// the schema of a table more times than allowed by the system defined limit.
    ///
    /// This is used for cloud service only.
    EvolutionLimitExceeded = 18,

    /// TableDeploymentLimitExceeded error represents an attempt has been made to
    /// create or modify a table using limits that exceed the maximum allowed for
    /// a single table.
    ///
    /// This is system-defined limit, used for cloud service only.
    TableDeploymentLimitExceeded = 19,

    /// TenantDeploymentLimitExceeded error represents an attempt has been made to
    /// create or modify a table using limits that cause the tenant's aggregate
    /// resources to exceed the maximum allowed for a tenant.
    ///
    /// This is system-defined limit, used for cloud service only.
    TenantDeploymentLimitExceeded = 20,

    /// OperationNotSupported error represents the operation attempted is not supported.
    /// This may be related to on-premise vs cloud service configurations.
    OperationNotSupported = 21,

    /// EtagMismatch is used only by the cloud REST service.
    EtagMismatch = 22,

    /// CannotCancelWorkRequest is used only by the cloud REST service.
    CannotCancelWorkRequest = 23,

    /// UnsupportedProtocol error indicates the server does not support the
    /// given driver protocol version. The driver should decrement its internal
    /// protocol version (and accompanying logic) and try again.
    UnsupportedProtocol = 24,

    /// ReadLimitExceeded error represents that the provisioned read throughput
    /// has been exceeded.
    ///
    /// Operations resulting in this error can be retried but it is recommended
    /// that callers use a delay before retrying in order to minimize the chance
    /// that a retry will also be throttled. Applications should attempt to avoid
    /// throttling errors by rate limiting themselves to the degree possible.
    ///
    /// Retries and behavior related to throttling can be managed by configuring
    /// a [`RetryPolicy`](crate::RetryPolicy) on the [`HandleBuilder`](crate::HandleBuilder).
    ///
    /// This is used for cloud service only.
    ReadLimitExceeded = 50,

    /// WriteLimitExceeded error represents that the provisioned write throughput
    /// has been exceeded.
    ///
    /// Operations resulting in this error can be retried but it is recommended
    /// that callers use a delay before retrying in order to minimize the chance
    /// that a retry will also be throttled. Applications should attempt to avoid
    /// throttling errors by rate limiting themselves to the degree possible.
    ///
    /// Retries and behavior related to throttling can be managed by configuring
    /// a [`RetryPolicy`](crate::RetryPolicy) on the [`HandleBuilder`](crate::HandleBuilder).
    ///
    /// This is used for cloud service only.
    WriteLimitExceeded = 51,

    /// SizeLimitExceeded error represents a table size limit has been exceeded
    /// by writing more data than the table can support.
    /// This error is not retryable because the conditions that lead to it being
    /// retuned, while potentially transient, typically require user intervention.
    SizeLimitExceeded = 52,

    /// OperationLimitExceeded error represents the operation attempted has exceeded
    /// the allowed limits for non-data operations defined by the system.
    ///
    /// This error is returned when a non-data operation is throttled.
    /// This can happen if an application attempts too many control operations
    /// such as table creation, deletion, or similar methods. Such operations
    /// do not use throughput or capacity provisioned for a given table but they
    /// consume system resources and their use is limited.
    ///
    /// Operations resulting in this error can be retried but it is recommended
    /// that callers use a relatively large delay before retrying in order to
    /// minimize the chance that a retry will also be throttled.
    ///
    /// This is used for cloud service only.
    OperationLimitExceeded = 53,

    /// RequestTimeout error represents the request cannot be processed or does
    /// not complete when the specified timeout duration elapses.
    ///
    /// The request may have been retried a number of times before the
    /// deadline elapsed; see [`NoSQLError::context()`].
    RequestTimeout = 100,

    /// ServerError represents there is an internal system problem.
    /// Most system problems are temporary.
    /// The operation that leads to this error may need to retry.
    ServerError = 101,

    /// ServiceUnavailable error represents the requested service is currently unavailable.
    /// This is usually a temporary error.
    /// The operation that leads to this error may need to retry.
    ServiceUnavailable = 102,

    /// TableBusy error represents the table is in use or busy.
    /// This error may be returned when a table operation fails.
    /// Note that only one modification operation at a time is allowed on a table.
    TableBusy = 103,

    /// SecurityInfoUnavailable error represents the security information is not
    /// ready in the system.
    /// This error will occur as the system acquires security information and
    /// must be retried in order for authorization to work properly.
    ///
    /// This is used for cloud service only.
    SecurityInfoUnavailable = 104,

    /// RetryAuthentication error represents the authentication failed and may need to retry.
    /// The service returns this when the session token or signature in the
    /// request has expired. The driver drops its cached authorization and
    /// retries with fresh credentials.
    RetryAuthentication = 105,

    /// UnknownError represents an unknown error has occurred on the server.
    UnknownError = 125,

    /// IllegalState error represents an illegal state.
    IllegalState = 126,

    /// TruncatedData is returned when a response ends before a complete
    /// value could be decoded.
    TruncatedData = 1001,

    /// ProtocolVersion is returned when a response carries an unknown
    /// opcode or value tag, or otherwise does not match the protocol
    /// version this driver declared.
    ProtocolVersion = 1002,

    /// AuthenticationFailed is returned when an authorization provider
    /// could not produce credentials for a request: login rejected,
    /// unreadable key material, or a credential source failure.
    AuthenticationFailed = 1003,

    /// ConnectionFailure is a transient transport error, such as a reset
    /// or refused connection. It is retryable.
    ConnectionFailure = 1004,

    /// NameResolutionFailure is returned when the service host name could
    /// not be resolved.
    NameResolutionFailure = 1005,

    /// CertificateRejected is returned when the server certificate chain
    /// does not validate against the configured trusted roots.
    CertificateRejected = 1006,

    /// TransportFailure covers any other transport error.
    TransportFailure = 1007,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn retryable_codes() {
        use NoSQLErrorCode::*;
        for c in [
            ReadLimitExceeded,
            WriteLimitExceeded,
            OperationLimitExceeded,
            RequestTimeout,
            ServerError,
            ServiceUnavailable,
            TableBusy,
            SecurityInfoUnavailable,
            RetryAuthentication,
            ConnectionFailure,
        ] {
            assert!(NoSQLError::new(c, "").is_retryable(), "{:?}", c);
        }
        for c in [
            IllegalArgument,
            TableNotFound,
            RequestSizeLimitExceeded,
            InvalidAuthorization,
            BadProtocolMessage,
            TruncatedData,
            ProtocolVersion,
            AuthenticationFailed,
            NameResolutionFailure,
            CertificateRejected,
            TransportFailure,
        ] {
            assert!(!NoSQLError::new(c, "").is_retryable(), "{:?}", c);
        }
    }

    #[test]
    fn service_codes() {
        let e = NoSQLError::from_int(2, "no such table");
        assert_eq!(e.code, NoSQLErrorCode::TableNotFound);
        assert!(e.is_service_error());
        let e = NoSQLError::from_int(77, "?");
        assert_eq!(e.code, NoSQLErrorCode::UnknownError);
        assert!(!NoSQLError::new(NoSQLErrorCode::TruncatedData, "").is_service_error());
    }

    #[test]
    fn local_errors_are_not_service_errors() {
        let e = NoSQLError::new(NoSQLErrorCode::IllegalArgument, "missing key");
        assert!(!e.is_service_error());
        let e = NoSQLError::from_int(NoSQLErrorCode::IllegalArgument as i32, "missing key");
        assert!(e.is_service_error());
        let e = e.with_context(ErrorContext {
            op_code: OpCode::Get,
            table_name: "users".to_string(),
            attempts: 1,
        });
        assert!(e.is_service_error());
    }

    #[test]
    fn classify_io_errors() {
        let e = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        assert_eq!(classify_transport_error(&e), NoSQLErrorCode::ConnectionFailure);
        let e = io::Error::new(io::ErrorKind::Other, "dns error: no record");
        assert_eq!(
            classify_transport_error(&e),
            NoSQLErrorCode::NameResolutionFailure
        );
        let e = io::Error::new(io::ErrorKind::Other, "something odd");
        assert_eq!(classify_transport_error(&e), NoSQLErrorCode::TransportFailure);
    }

    #[test]
    fn display_with_context() {
        let e = NoSQLError::new(NoSQLErrorCode::ServerError, "boom").with_context(ErrorContext {
            op_code: OpCode::Get,
            table_name: "users".to_string(),
            attempts: 3,
        });
        let s = e.to_string();
        assert!(s.contains("ServerError"));
        assert!(s.contains("op=Get table=users attempts=3"));
    }
}
