//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use std::fmt::Debug;
use std::time::Duration;
use url::Url;

use crate::error::NoSQLError;

/// Raw HTTP response to one protocol request.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Carries encoded requests to the service.
///
/// The [`Handle`](crate::Handle) owns its transport for its whole lifetime.
/// A call may be cancelled at any point by dropping its future; an
/// implementation must release any connection it holds when that happens.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// POST `body` to `url`, failing if no complete response arrives within `timeout`.
    async fn send(
        &self,
        url: &Url,
        body: Bytes,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<TransportResponse, NoSQLError>;
}

/// [`Transport`] over a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> ReqwestTransport {
        ReqwestTransport { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        url: &Url,
        body: Bytes,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<TransportResponse, NoSQLError> {
        let resp = self
            .client
            .post(url.clone())
            .body(body)
            .timeout(timeout)
            .headers(headers)
            .send()
            .await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?;
        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
