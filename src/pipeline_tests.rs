//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use crate::auth_common::authorization_provider::{AuthRequest, AuthorizationProvider};
use crate::auth_common::signature_provider::test::{FakeClock, SlowSource};
use crate::auth_common::signature_provider::{SignatureProvider, COMPARTMENT_HEADER};
use crate::auth_common::store_access_token_provider::test::{source, MockLogin};
use crate::auth_common::store_access_token_provider::{StoreAccessTokenProvider, LOGIN_ATTEMPTS};
use crate::binary_protocol::{read_request_header, write_error_response, write_ok_status};
use crate::error::{NoSQLError, NoSQLErrorCode};
use crate::handle::{REQUEST_ID_HEADER, SERIAL_VERSION_HEADER};
use crate::handle_builder::HandleMode;
use crate::reader::Reader;
use crate::retry::{DefaultRetryPolicy, NoRetry, RetryPolicy};
use crate::transport::{Transport, TransportResponse};
use crate::types::{Capacity, MapValue, OpCode};
use crate::writer::Writer;
use crate::{
    DeleteRangeRequest, DeleteRangeResult, GetRequest, GetResult, Handle, PutRequest,
};

#[derive(Debug, Clone)]
enum Reply {
    Body(Vec<u8>),
    Status(StatusCode, Vec<u8>),
    WrongRequestId(Vec<u8>),
    Hang,
}

struct Sent {
    request_id: u64,
    headers: HeaderMap,
    body: Bytes,
}

// Counts transport calls that were dropped before completing.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Mutex<Option<Reply>>,
    sent: Mutex<Vec<(u64, HeaderMap, Bytes)>>,
    dropped: Arc<AtomicUsize>,
}

impl MockTransport {
    fn new(replies: Vec<Reply>) -> Arc<MockTransport> {
        Arc::new(MockTransport {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        })
    }

    fn always(reply: Reply) -> Arc<MockTransport> {
        let t = MockTransport::default();
        *t.fallback.lock().unwrap() = Some(reply);
        Arc::new(t)
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(id, h, b)| Sent {
                request_id: *id,
                headers: h.clone(),
                body: b.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        _url: &Url,
        body: Bytes,
        headers: HeaderMap,
        _timeout: Duration,
    ) -> Result<TransportResponse, NoSQLError> {
        let id: u64 = headers[REQUEST_ID_HEADER].to_str().unwrap().parse().unwrap();
        self.sent.lock().unwrap().push((id, headers, body));
        let reply = {
            let mut q = self.replies.lock().unwrap();
            q.pop_front()
                .or_else(|| self.fallback.lock().unwrap().clone())
                .expect("no scripted reply left")
        };
        let (status, body, echoed) = match reply {
            Reply::Body(b) => (StatusCode::OK, b, id),
            Reply::Status(s, b) => (s, b, id),
            Reply::WrongRequestId(b) => (StatusCode::OK, b, id + 1000),
            Reply::Hang => {
                let _guard = InFlight(self.dropped.clone());
                std::future::pending::<()>().await;
                unreachable!()
            }
        };
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from(echoed));
        Ok(TransportResponse {
            status,
            headers,
            body: Bytes::from(body),
        })
    }
}

fn ok_body<F>(f: F) -> Reply
where
    F: FnOnce(&mut Writer) -> Result<(), NoSQLError>,
{
    let mut w = Writer::new();
    write_ok_status(&mut w);
    f(&mut w).unwrap();
    Reply::Body(w.into_bytes())
}

fn error_body(code: NoSQLErrorCode, msg: &str) -> Vec<u8> {
    let mut w = Writer::new();
    write_error_response(&mut w, code as i32 as u8, msg);
    w.into_bytes()
}

fn get_found() -> Reply {
    let res = GetResult {
        row: Some(MapValue::new().i32("id", 10).str("name", "jane")),
        consumed: Some(Capacity {
            read_units: 1,
            read_kb: 1,
            write_kb: 0,
        }),
        version: Some(vec![1, 2, 3]),
        ..Default::default()
    };
    ok_body(|w| GetRequest::serialize_result(&res, w))
}

fn delete_page(n: i32, k: Option<Vec<u8>>) -> Reply {
    let res = DeleteRangeResult {
        num_deleted: n,
        continuation_key: k,
        consumed: Some(Capacity {
            read_units: 0,
            read_kb: 1,
            write_kb: n,
        }),
    };
    ok_body(move |w| DeleteRangeRequest::serialize_result(&res, w))
}

fn handle_with(
    mode: HandleMode,
    transport: Arc<MockTransport>,
    auth: Option<Arc<dyn AuthorizationProvider>>,
    policy: Arc<dyn RetryPolicy>,
) -> Handle {
    Handle::new(
        mode,
        Url::parse("http://localhost:8080/V2/nosql/data").unwrap(),
        transport,
        auth,
        policy,
        Duration::from_secs(5),
        true,
        1024 * 1024,
    )
}

fn cloudsim(transport: Arc<MockTransport>) -> Handle {
    handle_with(
        HandleMode::Cloudsim,
        transport,
        None,
        Arc::new(DefaultRetryPolicy::default()),
    )
}

fn get(id: i32) -> GetRequest {
    GetRequest::new("users").key(MapValue::new().i32("id", id))
}

#[tokio::test]
async fn get_success_sends_protocol_headers() {
    let t = MockTransport::new(vec![get_found()]);
    let h = cloudsim(t.clone());
    let res = get(10).execute(&h).await.unwrap();
    assert_eq!(res.row().unwrap().get_string("name").as_deref(), Some("jane"));
    assert_eq!(res.consumed().unwrap().read_units, 1);
    assert_eq!(res.version(), Some(&vec![1, 2, 3]));

    let sent = t.sent();
    assert_eq!(sent.len(), 1);
    let hdrs = &sent[0].headers;
    assert_eq!(sent[0].request_id, 1);
    assert_eq!(hdrs[CONTENT_TYPE], "application/octet-stream");
    assert_eq!(hdrs[SERIAL_VERSION_HEADER], "4");
    assert_eq!(hdrs[AUTHORIZATION], "Bearer rust");
    assert_eq!(i16::from_be_bytes([sent[0].body[0], sent[0].body[1]]), 2);
}

#[tokio::test]
async fn delete_range_follows_continuation_keys() {
    let t = MockTransport::new(vec![
        delete_page(5, Some(vec![1])),
        delete_page(7, Some(vec![2])),
        delete_page(3, None),
    ]);
    let h = cloudsim(t.clone());
    let res = DeleteRangeRequest::new("users", MapValue::new().i32("shard", 4))
        .execute_all(&h)
        .await
        .unwrap();
    assert_eq!(res.num_deleted(), 15);
    assert_eq!(res.continuation_key(), None);
    assert_eq!(res.consumed().unwrap().write_kb, 15);

    let keys: Vec<Option<Vec<u8>>> = t
        .sent()
        .iter()
        .map(|s| {
            let mut r = Reader::new().from_bytes(&s.body);
            DeleteRangeRequest::deserialize_request(&mut r)
                .unwrap()
                .continuation_key
        })
        .collect();
    assert_eq!(keys, vec![None, Some(vec![1]), Some(vec![2])]);
}

#[tokio::test]
async fn delete_range_rejects_a_repeated_continuation_key() {
    let t = MockTransport::new(vec![
        delete_page(i32::MAX, Some(vec![9])),
        delete_page(5, Some(vec![9])),
    ]);
    let h = cloudsim(t.clone());
    let err = DeleteRangeRequest::new("users", MapValue::new().i32("shard", 4))
        .execute_all(&h)
        .await
        .unwrap_err();
    assert_eq!(err.code, NoSQLErrorCode::BadProtocolMessage);
    assert_eq!(t.sent().len(), 2);
}

#[tokio::test]
async fn delete_range_count_saturates() {
    let t = MockTransport::new(vec![
        delete_page(i32::MAX, Some(vec![1])),
        delete_page(5, None),
    ]);
    let h = cloudsim(t.clone());
    let res = DeleteRangeRequest::new("users", MapValue::new().i32("shard", 4))
        .execute_all(&h)
        .await
        .unwrap();
    assert_eq!(res.num_deleted(), i32::MAX);
    assert_eq!(res.consumed().unwrap().write_kb, i32::MAX);
}

#[tokio::test(start_paused = true)]
async fn timeout_abandons_the_transport_call() {
    let t = MockTransport::always(Reply::Hang);
    let h = cloudsim(t.clone());
    let started = Instant::now();
    let err = get(1)
        .timeout(&Duration::from_millis(200))
        .execute(&h)
        .await
        .unwrap_err();
    assert_eq!(err.code, NoSQLErrorCode::RequestTimeout);
    assert!(started.elapsed() <= Duration::from_millis(250));
    let sent = t.sent().len();
    assert!(sent >= 1);
    // every hung call was dropped, none is left running
    assert_eq!(t.dropped.load(Ordering::SeqCst), sent);
}

#[tokio::test(start_paused = true)]
async fn retries_with_fresh_request_ids() {
    let t = MockTransport::new(vec![
        Reply::Body(error_body(NoSQLErrorCode::ServerError, "try later")),
        Reply::Status(StatusCode::BAD_GATEWAY, b"proxy error".to_vec()),
        get_found(),
        get_found(),
    ]);
    let h = cloudsim(t.clone());
    get(1).execute(&h).await.unwrap();
    get(2).execute(&h).await.unwrap();
    let ids: Vec<u64> = t.sent().iter().map(|s| s.request_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(h.inner.next_request_id(), 5);

    // each retry declares what is left of the timeout
    let timeouts: Vec<Duration> = t
        .sent()
        .iter()
        .map(|s| {
            let mut r = Reader::new().from_bytes(&s.body);
            read_request_header(&mut r).unwrap().timeout
        })
        .collect();
    assert_eq!(timeouts[0], Duration::from_secs(5));
    assert!(timeouts[1] < timeouts[0], "{:?}", timeouts);
    assert!(timeouts[2] < timeouts[1], "{:?}", timeouts);
    assert_eq!(timeouts[3], Duration::from_secs(5));
}

#[tokio::test]
async fn non_retryable_error_carries_context() {
    let t = MockTransport::new(vec![Reply::Body(error_body(
        NoSQLErrorCode::TableNotFound,
        "table users not found",
    ))]);
    let h = cloudsim(t.clone());
    let err = get(1).execute(&h).await.unwrap_err();
    assert_eq!(err.code, NoSQLErrorCode::TableNotFound);
    assert_eq!(err.message, "table users not found");
    let ctx = err.context().unwrap();
    assert_eq!(ctx.op_code, OpCode::Get);
    assert_eq!(ctx.table_name, "users");
    assert_eq!(ctx.attempts, 1);
    assert_eq!(t.sent().len(), 1);
}

#[tokio::test]
async fn invalid_request_is_never_sent() {
    let t = MockTransport::new(vec![]);
    let h = cloudsim(t.clone());
    let err = PutRequest::new("users").execute(&h).await.unwrap_err();
    assert_eq!(err.code, NoSQLErrorCode::IllegalArgument);
    assert_eq!(err.context().unwrap().attempts, 0);
    assert_eq!(err.context().unwrap().op_code, OpCode::Put);
    assert!(t.sent().is_empty());
}

#[tokio::test]
async fn http_status_maps_to_error_code() {
    let t = MockTransport::new(vec![
        Reply::Status(StatusCode::SERVICE_UNAVAILABLE, b"busy".to_vec()),
        Reply::Status(StatusCode::UNAUTHORIZED, vec![]),
        Reply::Status(
            StatusCode::BAD_REQUEST,
            error_body(NoSQLErrorCode::IllegalArgument, "bad key"),
        ),
    ]);
    let h = handle_with(HandleMode::Cloudsim, t.clone(), None, Arc::new(NoRetry));
    let err = get(1).execute(&h).await.unwrap_err();
    assert_eq!(err.code, NoSQLErrorCode::ServiceUnavailable);
    assert!(err.message.contains("busy"), "{}", err);
    assert_eq!(err.context().unwrap().attempts, 1);
    let err = get(1).execute(&h).await.unwrap_err();
    assert_eq!(err.code, NoSQLErrorCode::InvalidAuthorization);
    let err = get(1).execute(&h).await.unwrap_err();
    assert_eq!(err.code, NoSQLErrorCode::IllegalArgument);
    assert_eq!(err.message, "bad key");
}

#[tokio::test]
async fn mismatched_request_id_is_rejected() {
    let reply = match get_found() {
        Reply::Body(b) => Reply::WrongRequestId(b),
        other => other,
    };
    let t = MockTransport::new(vec![reply]);
    let h = handle_with(HandleMode::Cloudsim, t, None, Arc::new(NoRetry));
    let err = get(1).execute(&h).await.unwrap_err();
    assert_eq!(err.code, NoSQLErrorCode::BadProtocolMessage);
}

#[derive(Debug, Default)]
struct CountingAuth {
    authorized: AtomicUsize,
    invalidated: AtomicUsize,
}

#[async_trait]
impl AuthorizationProvider for CountingAuth {
    async fn authorize(
        &self,
        _req: &AuthRequest<'_>,
        _deadline: Instant,
    ) -> Result<HeaderMap, NoSQLError> {
        let n = self.authorized.fetch_add(1, Ordering::SeqCst);
        let mut h = HeaderMap::new();
        h.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer token-{}", n)).unwrap(),
        );
        Ok(h)
    }

    fn invalidate(&self) {
        self.invalidated.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn retry_authentication_invalidates_provider() {
    let t = MockTransport::new(vec![
        Reply::Body(error_body(NoSQLErrorCode::RetryAuthentication, "expired")),
        get_found(),
    ]);
    let auth = Arc::new(CountingAuth::default());
    let h = handle_with(
        HandleMode::Onprem,
        t.clone(),
        Some(auth.clone()),
        Arc::new(DefaultRetryPolicy::default()),
    );
    get(1).execute(&h).await.unwrap();
    assert_eq!(auth.invalidated.load(Ordering::SeqCst), 1);
    assert_eq!(auth.authorized.load(Ordering::SeqCst), 2);
    let sent = t.sent();
    assert_eq!(sent[0].headers[AUTHORIZATION], "Bearer token-0");
    assert_eq!(sent[1].headers[AUTHORIZATION], "Bearer token-1");
}

// Fails every call with a code that would be retried if the service sent it.
#[derive(Debug, Default)]
struct FailingAuth {
    calls: AtomicUsize,
}

#[async_trait]
impl AuthorizationProvider for FailingAuth {
    async fn authorize(
        &self,
        _req: &AuthRequest<'_>,
        _deadline: Instant,
    ) -> Result<HeaderMap, NoSQLError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NoSQLError::new(
            NoSQLErrorCode::ServiceUnavailable,
            "signer down",
        ))
    }

    fn invalidate(&self) {}
}

#[tokio::test(start_paused = true)]
async fn authorization_failure_is_fatal() {
    let t = MockTransport::always(get_found());
    let auth = Arc::new(FailingAuth::default());
    let h = handle_with(
        HandleMode::Cloud,
        t.clone(),
        Some(auth.clone()),
        Arc::new(DefaultRetryPolicy::default()),
    );
    let err = get(1).execute(&h).await.unwrap_err();
    assert_eq!(err.code, NoSQLErrorCode::AuthenticationFailed);
    assert_eq!(err.message, "signer down");
    assert!(!err.is_retryable());
    assert_eq!(err.context().unwrap().attempts, 1);
    assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
    assert!(t.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn store_login_failure_stops_the_request() {
    let t = MockTransport::always(get_found());
    let login = Arc::new(MockLogin::new(u32::MAX, i64::MAX));
    let auth = Arc::new(StoreAccessTokenProvider::with_login_service(
        source(),
        login.clone(),
        Arc::new(FakeClock::new(0)),
    ));
    let h = handle_with(
        HandleMode::Onprem,
        t.clone(),
        Some(auth),
        Arc::new(DefaultRetryPolicy::default()),
    );
    let err = get(1).execute(&h).await.unwrap_err();
    assert_eq!(err.code, NoSQLErrorCode::AuthenticationFailed);
    assert!(err.message.contains("3 attempts"), "{}", err);
    assert_eq!(err.context().unwrap().attempts, 1);
    assert_eq!(login.calls.load(Ordering::SeqCst), LOGIN_ATTEMPTS);
    assert!(t.sent().is_empty());
}

#[tokio::test]
async fn cloud_requests_are_signed_and_share_credentials() {
    let t = MockTransport::always(get_found());
    let clock = Arc::new(FakeClock::new(-8));
    let source = Arc::new(SlowSource {
        loads: AtomicUsize::new(0),
        delay: Duration::from_millis(1),
    });
    let sp = Arc::new(
        SignatureProvider::with_clock(source.clone(), clock.clone()).compartment_id("ocid1.compartment"),
    );
    let h = Handle::builder()
        .endpoint("localhost:8080")
        .unwrap()
        .auth_provider(sp.clone())
        .unwrap()
        .transport(t.clone())
        .unwrap()
        .build()
        .await
        .unwrap();
    assert_eq!(h.mode(), HandleMode::Cloud);

    for i in 0..5 {
        get(i).execute(&h).await.unwrap();
    }
    let sent = t.sent();
    assert_eq!(sent.len(), 5);
    for s in &sent {
        let auth = s.headers["authorization"].to_str().unwrap();
        assert!(auth.starts_with("Signature version=\"1\""), "{}", auth);
        assert_eq!(s.headers["date"], "Sat, 15 Jun 2024 12:00:00 GMT");
        assert_eq!(s.headers["host"], "localhost:8080");
        assert_eq!(s.headers[COMPARTMENT_HEADER], "ocid1.compartment");
    }
    assert_eq!(sp.signatures_generated(), 1);

    // the cached signature expires; concurrent requests sign once
    clock.advance(Duration::from_secs(5 * 60));
    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..8 {
        let h = h.clone();
        tasks.spawn(async move { get(i).execute(&h).await });
    }
    while let Some(r) = tasks.join_next().await {
        r.unwrap().unwrap();
    }
    assert_eq!(sp.signatures_generated(), 2);
    assert_eq!(sp.credential_loads(), 1);
    assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    let last = t.sent().pop().unwrap();
    assert_eq!(last.headers["date"], "Sat, 15 Jun 2024 12:05:00 GMT");
}

#[tokio::test]
async fn concurrent_requests_get_unique_ids() {
    let t = MockTransport::always(get_found());
    let h = cloudsim(t.clone());
    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..20 {
        let h = h.clone();
        tasks.spawn(async move { get(i).execute(&h).await });
    }
    while let Some(r) = tasks.join_next().await {
        r.unwrap().unwrap();
    }
    let mut ids: Vec<u64> = t.sent().iter().map(|s| s.request_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=20).collect::<Vec<u64>>());
}
