//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde_derive::Deserialize;
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::auth_common::authorization_provider::{AuthRequest, AuthorizationProvider};
use crate::auth_common::clock::{Clock, SystemClock};
use crate::auth_common::credentials::{CredentialSource, Credentials, StoreCredentials};
use crate::auth_common::refresh::RefreshCell;
use crate::error::{nosql_err, NoSQLError, NoSQLErrorCode};

pub(crate) const LOGIN_PATH: &str = "/V2/nosql/security/login";
pub(crate) const LOGIN_ATTEMPTS: u32 = 3;

// Tokens are replaced this long before the service expires them.
const EXPIRY_MARGIN_MS: i64 = 10_000;
const LOGIN_BACKOFF: Duration = Duration::from_millis(200);

/// Session token returned by the store's login service.
#[derive(Clone, Deserialize)]
pub(crate) struct LoginToken {
    pub(crate) token: String,
    #[serde(rename = "expireAt")]
    pub(crate) expire_at: i64,
}

impl Debug for LoginToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginToken")
            .field("token", &"<redacted>")
            .field("expire_at", &self.expire_at)
            .finish()
    }
}

/// Exchanges store credentials for a session token.
#[async_trait]
pub(crate) trait LoginService: Send + Sync + Debug {
    async fn login(&self, creds: &StoreCredentials) -> Result<LoginToken, NoSQLError>;
}

#[derive(Debug)]
pub(crate) struct ReqwestLoginService {
    client: Client,
    url: Url,
}

impl ReqwestLoginService {
    pub(crate) fn new(client: Client, endpoint: &Url) -> Result<ReqwestLoginService, NoSQLError> {
        Ok(ReqwestLoginService {
            client,
            url: endpoint.join(LOGIN_PATH)?,
        })
    }
}

#[async_trait]
impl LoginService for ReqwestLoginService {
    async fn login(&self, creds: &StoreCredentials) -> Result<LoginToken, NoSQLError> {
        let up = format!("{}:{}", creds.username, creds.password);
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", BASE64_STANDARD.encode(up)))?,
        );
        let resp = self
            .client
            .get(self.url.clone())
            .headers(headers)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return nosql_err!(
                AuthenticationFailed,
                "login service returned http status {}: {}",
                status,
                body
            );
        }
        match serde_json::from_str::<LoginToken>(&body) {
            Ok(t) => Ok(t),
            Err(e) => nosql_err!(
                AuthenticationFailed,
                "invalid response from login service: {}",
                e
            ),
        }
    }
}

/// Authorizes requests to a secure on-premises store with a session token.
///
/// The user name and password are loaded from the [`CredentialSource`] once.
/// A session token is obtained from the store's login service and reused by
/// all requests until it is within ten seconds of expiring. A failed login is
/// attempted up to three times before the request fails with
/// `AuthenticationFailed`.
#[derive(Debug)]
pub struct StoreAccessTokenProvider {
    source: Arc<dyn CredentialSource>,
    login: Arc<dyn LoginService>,
    clock: Arc<dyn Clock>,
    credentials: RefreshCell<StoreCredentials>,
    token: RefreshCell<LoginToken>,
}

impl StoreAccessTokenProvider {
    /// Log in to the store at `endpoint` using `client`.
    pub fn new(
        source: Arc<dyn CredentialSource>,
        client: Client,
        endpoint: &Url,
    ) -> Result<StoreAccessTokenProvider, NoSQLError> {
        let login = ReqwestLoginService::new(client, endpoint)?;
        Ok(StoreAccessTokenProvider::with_login_service(
            source,
            Arc::new(login),
            Arc::new(SystemClock),
        ))
    }

    pub(crate) fn with_login_service(
        source: Arc<dyn CredentialSource>,
        login: Arc<dyn LoginService>,
        clock: Arc<dyn Clock>,
    ) -> StoreAccessTokenProvider {
        StoreAccessTokenProvider {
            source,
            login,
            clock,
            credentials: RefreshCell::new(),
            token: RefreshCell::new(),
        }
    }

    pub(crate) fn logins(&self) -> u64 {
        self.token.refresh_count()
    }

    async fn credentials(&self, deadline: Instant) -> Result<Arc<StoreCredentials>, NoSQLError> {
        self.credentials
            .get_or_refresh(
                |_| true,
                || async {
                    match tokio::time::timeout_at(deadline, self.source.load()).await {
                        Err(_) => nosql_err!(RequestTimeout, "timed out loading store credentials"),
                        Ok(Ok(Credentials::Store(s))) => {
                            debug!("loaded store credentials for user {}", s.username);
                            Ok(s)
                        }
                        Ok(Ok(Credentials::Cloud(_))) => nosql_err!(
                            AuthenticationFailed,
                            "store login requires a user name and password"
                        ),
                        Ok(Err(e)) => nosql_err!(
                            AuthenticationFailed,
                            "error loading store credentials: {}",
                            e.message
                        ),
                    }
                },
            )
            .await
    }

    async fn login_with_retries(
        &self,
        creds: &StoreCredentials,
        deadline: Instant,
    ) -> Result<LoginToken, NoSQLError> {
        let mut last_err = String::new();
        for attempt in 1..=LOGIN_ATTEMPTS {
            match tokio::time::timeout_at(deadline, self.login.login(creds)).await {
                Err(_) => return nosql_err!(RequestTimeout, "timed out logging in to store"),
                Ok(Ok(t)) => {
                    debug!("obtained store session token, expires at {}", t.expire_at);
                    return Ok(t);
                }
                Ok(Err(e)) => {
                    warn!(
                        "store login attempt {} of {} failed: {}",
                        attempt, LOGIN_ATTEMPTS, e
                    );
                    last_err = e.message;
                }
            }
            if attempt < LOGIN_ATTEMPTS {
                let wake = Instant::now() + LOGIN_BACKOFF * attempt;
                if wake >= deadline {
                    return nosql_err!(RequestTimeout, "timed out logging in to store");
                }
                tokio::time::sleep_until(wake).await;
            }
        }
        Err(NoSQLError::new(
            NoSQLErrorCode::AuthenticationFailed,
            &format!(
                "store login failed after {} attempts: {}",
                LOGIN_ATTEMPTS, last_err
            ),
        ))
    }
}

#[async_trait]
impl AuthorizationProvider for StoreAccessTokenProvider {
    async fn authorize(
        &self,
        _req: &AuthRequest<'_>,
        deadline: Instant,
    ) -> Result<HeaderMap, NoSQLError> {
        let creds = self.credentials(deadline).await?;
        let now = self.clock.now().timestamp_millis();
        let token = self
            .token
            .get_or_refresh(
                |t| t.expire_at - EXPIRY_MARGIN_MS > now,
                || self.login_with_retries(&creds, deadline),
            )
            .await?;
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.token))?,
        );
        Ok(headers)
    }

    fn invalidate(&self) {
        debug!("invalidating store session token");
        self.token.invalidate();
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::auth_common::credentials::{CloudCredentials, StaticCredentials};
    use crate::auth_common::signature_provider::test::FakeClock;
    use reqwest::Method;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    pub(crate) struct MockLogin {
        pub(crate) calls: AtomicU32,
        failures: u32,
        expire_at: i64,
        delay: Duration,
    }

    impl MockLogin {
        pub(crate) fn new(failures: u32, expire_at: i64) -> MockLogin {
            MockLogin {
                calls: AtomicU32::new(0),
                failures,
                expire_at,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl LoginService for MockLogin {
        async fn login(&self, creds: &StoreCredentials) -> Result<LoginToken, NoSQLError> {
            assert_eq!(creds.username, "admin");
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if n <= self.failures {
                return nosql_err!(AuthenticationFailed, "login service unavailable");
            }
            Ok(LoginToken {
                token: format!("token-{}", n),
                expire_at: self.expire_at,
            })
        }
    }

    pub(crate) fn source() -> Arc<dyn CredentialSource> {
        Arc::new(StaticCredentials(Credentials::Store(StoreCredentials {
            username: "admin".to_string(),
            password: "secret".to_string(),
        })))
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    async fn bearer(p: &StoreAccessTokenProvider) -> Result<String, NoSQLError> {
        let u = Url::parse("http://localhost:8080/V2/nosql/data").unwrap();
        let req = AuthRequest {
            method: &Method::POST,
            url: &u,
        };
        let h = p.authorize(&req, deadline()).await?;
        Ok(h.get(AUTHORIZATION).unwrap().to_str().unwrap().to_string())
    }

    // FakeClock starts at 2024-06-15T12:00:00Z
    const CLOCK_START_MS: i64 = 1_718_452_800_000;

    #[tokio::test]
    async fn token_is_reused_until_near_expiry() {
        let clock = Arc::new(FakeClock::new(2));
        let login = Arc::new(MockLogin::new(0, CLOCK_START_MS + 60_000));
        let p = StoreAccessTokenProvider::with_login_service(source(), login.clone(), clock.clone());
        assert_eq!(bearer(&p).await.unwrap(), "Bearer token-1");
        clock.advance(Duration::from_secs(45));
        assert_eq!(bearer(&p).await.unwrap(), "Bearer token-1");
        // inside the ten second margin
        clock.advance(Duration::from_secs(6));
        assert_eq!(bearer(&p).await.unwrap(), "Bearer token-2");
        assert_eq!(login.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn login_is_retried() {
        let login = Arc::new(MockLogin::new(2, i64::MAX));
        let p = StoreAccessTokenProvider::with_login_service(
            source(),
            login.clone(),
            Arc::new(FakeClock::new(0)),
        );
        assert_eq!(bearer(&p).await.unwrap(), "Bearer token-3");
        assert_eq!(p.logins(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn login_gives_up_after_three_attempts() {
        let login = Arc::new(MockLogin::new(10, i64::MAX));
        let p = StoreAccessTokenProvider::with_login_service(
            source(),
            login.clone(),
            Arc::new(FakeClock::new(0)),
        );
        let err = bearer(&p).await.unwrap_err();
        assert_eq!(err.code, NoSQLErrorCode::AuthenticationFailed);
        assert!(err.message.contains("3 attempts"), "{}", err);
        assert_eq!(login.calls.load(Ordering::SeqCst), LOGIN_ATTEMPTS);
    }

    #[tokio::test]
    async fn invalidate_forces_login() {
        let login = Arc::new(MockLogin::new(0, i64::MAX));
        let p = StoreAccessTokenProvider::with_login_service(
            source(),
            login.clone(),
            Arc::new(FakeClock::new(0)),
        );
        bearer(&p).await.unwrap();
        p.invalidate();
        assert_eq!(bearer(&p).await.unwrap(), "Bearer token-2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_log_in_once() {
        let mut login = MockLogin::new(0, i64::MAX);
        login.delay = Duration::from_millis(50);
        let login = Arc::new(login);
        let p = Arc::new(StoreAccessTokenProvider::with_login_service(
            source(),
            login.clone(),
            Arc::new(FakeClock::new(0)),
        ));
        let mut tasks = Vec::new();
        for _ in 0..10 {
            let p = p.clone();
            tasks.push(tokio::spawn(async move { bearer(&p).await.unwrap() }));
        }
        for t in tasks {
            assert_eq!(t.await.unwrap(), "Bearer token-1");
        }
        assert_eq!(login.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cloud_credentials_are_rejected() {
        let src = Arc::new(StaticCredentials(Credentials::Cloud(CloudCredentials {
            tenancy_id: "t".to_string(),
            user_id: "u".to_string(),
            fingerprint: "f".to_string(),
            private_key_pem: String::new(),
            passphrase: None,
            region: None,
        })));
        let p = StoreAccessTokenProvider::with_login_service(
            src,
            Arc::new(MockLogin::new(0, i64::MAX)),
            Arc::new(FakeClock::new(0)),
        );
        let err = bearer(&p).await.unwrap_err();
        assert_eq!(err.code, NoSQLErrorCode::AuthenticationFailed);
    }

    #[test]
    fn token_json() {
        let t: LoginToken =
            serde_json::from_str(r#"{"token":"abc","expireAt":1718452800000}"#).unwrap();
        assert_eq!(t.token, "abc");
        assert_eq!(t.expire_at, CLOCK_START_MS);
        assert!(!format!("{:?}", t).contains("abc"));
    }
}
