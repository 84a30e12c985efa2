//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use rsa::RsaPrivateKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::auth_common::authorization_provider::{AuthRequest, AuthorizationProvider};
use crate::auth_common::clock::{Clock, SystemClock};
use crate::auth_common::credentials::{CredentialSource, Credentials};
use crate::auth_common::private_key::parse_private_key;
use crate::auth_common::refresh::RefreshCell;
use crate::auth_common::signer::{
    sign_request, SignedHeaders, AUTHORIZATION_HEADER, DATE_HEADER, HOST_HEADER,
};
use crate::error::{nosql_err, NoSQLError};

pub(crate) const COMPARTMENT_HEADER: &str = "x-nosql-compartment-id";

/// How long a signature is reused. The service accepts a signed date for
/// five minutes; regenerate with a minute to spare.
pub(crate) const SIGNATURE_LIFETIME: Duration = Duration::from_secs(4 * 60);

struct SigningMaterial {
    key: RsaPrivateKey,
    key_id: String,
    tenancy_id: String,
}

struct CachedSignature {
    method: Method,
    url: Url,
    signed_at: DateTime<Utc>,
    headers: SignedHeaders,
}

impl CachedSignature {
    fn usable_for(&self, req: &AuthRequest<'_>, now: DateTime<Utc>) -> bool {
        if self.method != *req.method || self.url != *req.url {
            return false;
        }
        match (now - self.signed_at).to_std() {
            Ok(age) => age < SIGNATURE_LIFETIME,
            // clock went backwards
            Err(_) => false,
        }
    }
}

/// Signs requests to the NoSQL Cloud Service with the user's RSA key.
///
/// Credentials are loaded from the [`CredentialSource`] on first use and kept
/// until [`invalidate()`](AuthorizationProvider::invalidate()). The signature
/// is reused for up to four minutes, then regenerated with a fresh UTC date.
/// Concurrent requests that find the signature expired wait for a single
/// regeneration.
#[derive(Debug)]
pub struct SignatureProvider {
    source: Arc<dyn CredentialSource>,
    compartment_id: Option<String>,
    clock: Arc<dyn Clock>,
    material: RefreshCell<SigningMaterial>,
    signature: RefreshCell<CachedSignature>,
}

impl std::fmt::Debug for SigningMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningMaterial")
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl std::fmt::Debug for CachedSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSignature")
            .field("signed_at", &self.signed_at)
            .finish()
    }
}

impl SignatureProvider {
    pub fn new(source: Arc<dyn CredentialSource>) -> SignatureProvider {
        SignatureProvider::with_clock(source, Arc::new(SystemClock))
    }

    pub(crate) fn with_clock(
        source: Arc<dyn CredentialSource>,
        clock: Arc<dyn Clock>,
    ) -> SignatureProvider {
        SignatureProvider {
            source,
            compartment_id: None,
            clock,
            material: RefreshCell::new(),
            signature: RefreshCell::new(),
        }
    }

    /// Send requests on behalf of this compartment instead of the tenancy root.
    pub fn compartment_id(mut self, compartment_id: &str) -> SignatureProvider {
        if compartment_id.is_empty() {
            self.compartment_id = None;
        } else {
            self.compartment_id = Some(compartment_id.to_string());
        }
        self
    }

    /// Number of times the credential source was loaded.
    pub(crate) fn credential_loads(&self) -> u64 {
        self.material.refresh_count()
    }

    /// Number of signatures generated.
    pub(crate) fn signatures_generated(&self) -> u64 {
        self.signature.refresh_count()
    }

    async fn material(&self, deadline: Instant) -> Result<Arc<SigningMaterial>, NoSQLError> {
        self.material
            .get_or_refresh(
                |_| true,
                || async {
                    let creds = match tokio::time::timeout_at(deadline, self.source.load()).await
                    {
                        Ok(r) => r,
                        Err(_) => {
                            return nosql_err!(
                                RequestTimeout,
                                "timed out loading cloud credentials"
                            )
                        }
                    };
                    let cloud = match creds {
                        Ok(Credentials::Cloud(c)) => c,
                        Ok(Credentials::Store(_)) => {
                            return nosql_err!(
                                AuthenticationFailed,
                                "request signing requires cloud credentials"
                            )
                        }
                        Err(e) => {
                            return nosql_err!(
                                AuthenticationFailed,
                                "error loading cloud credentials: {}",
                                e.message
                            )
                        }
                    };
                    let key = match parse_private_key(
                        &cloud.private_key_pem,
                        cloud.passphrase.as_deref(),
                    ) {
                        Ok(k) => k,
                        Err(e) => return nosql_err!(AuthenticationFailed, "{}", e.message),
                    };
                    debug!("loaded signing key {}", cloud.key_id());
                    Ok(SigningMaterial {
                        key_id: cloud.key_id(),
                        tenancy_id: cloud.tenancy_id,
                        key,
                    })
                },
            )
            .await
    }
}

#[async_trait]
impl AuthorizationProvider for SignatureProvider {
    async fn authorize(
        &self,
        req: &AuthRequest<'_>,
        deadline: Instant,
    ) -> Result<HeaderMap, NoSQLError> {
        let material = self.material(deadline).await?;
        let now = self.clock.now().with_timezone(&Utc);
        let sig = self
            .signature
            .get_or_refresh(
                |s| s.usable_for(req, now),
                || async {
                    let signed_at = self.clock.now();
                    let headers = sign_request(
                        &material.key,
                        &material.key_id,
                        req.method,
                        req.url,
                        &signed_at,
                    )?;
                    debug!("generated new request signature dated {}", headers.date);
                    Ok(CachedSignature {
                        method: req.method.clone(),
                        url: req.url.clone(),
                        signed_at: signed_at.with_timezone(&Utc),
                        headers,
                    })
                },
            )
            .await?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION_HEADER,
            HeaderValue::from_str(&sig.headers.authorization)?,
        );
        headers.insert(DATE_HEADER, HeaderValue::from_str(&sig.headers.date)?);
        headers.insert(HOST_HEADER, HeaderValue::from_str(&sig.headers.host)?);
        let compartment = self
            .compartment_id
            .as_deref()
            .unwrap_or(material.tenancy_id.as_str());
        headers.insert(COMPARTMENT_HEADER, HeaderValue::from_str(compartment)?);
        Ok(headers)
    }

    fn invalidate(&self) {
        debug!("invalidating cached request signature and credentials");
        self.signature.invalidate();
        self.material.invalidate();
    }
}
