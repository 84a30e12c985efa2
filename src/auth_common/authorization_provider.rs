//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::fmt::Debug;
use tokio::time::Instant;
use url::Url;

use crate::error::NoSQLError;

/// The outgoing request an [`AuthorizationProvider`] is asked to authorize.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    pub method: &'a Method,
    pub url: &'a Url,
}

/// Trait defining an Authorization Provider.
///
/// A provider is shared by every request of a [`Handle`](crate::Handle) and may
/// be called concurrently. Any cached state (tokens, signatures) must be
/// guarded internally.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync + Debug {
    /// Produce the headers that authorize `req`.
    ///
    /// Must complete, or fail, before `deadline`. Failures are reported as
    /// `AuthenticationFailed`, or `RequestTimeout` if the deadline passed.
    async fn authorize(
        &self,
        req: &AuthRequest<'_>,
        deadline: Instant,
    ) -> Result<HeaderMap, NoSQLError>;

    /// Drop cached credentials, tokens and signatures. Called when the service
    /// asks the client to authenticate again.
    fn invalidate(&self) {}
}
