//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use async_trait::async_trait;
use std::fmt;
use std::fmt::Debug;

use crate::auth_common::file_utils::file_to_string;
use crate::error::{ia_err, NoSQLError};

/// Identity used to sign requests to the NoSQL Cloud Service.
#[derive(Clone, PartialEq)]
pub struct CloudCredentials {
    pub tenancy_id: String,
    pub user_id: String,
    pub fingerprint: String,
    /// Private key in PEM format (PKCS#8 or PKCS#1).
    pub private_key_pem: String,
    pub passphrase: Option<String>,
    pub region: Option<String>,
}

impl CloudCredentials {
    /// Key id used in the signature header: `tenancy/user/fingerprint`.
    pub fn key_id(&self) -> String {
        format!("{}/{}/{}", self.tenancy_id, self.user_id, self.fingerprint)
    }
}

impl Debug for CloudCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudCredentials")
            .field("tenancy_id", &self.tenancy_id)
            .field("user_id", &self.user_id)
            .field("fingerprint", &self.fingerprint)
            .field("private_key_pem", &"<redacted>")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("region", &self.region)
            .finish()
    }
}

/// User name and password for a secure on-premises store.
#[derive(Clone, PartialEq)]
pub struct StoreCredentials {
    pub username: String,
    pub password: String,
}

impl Debug for StoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Credentials {
    Cloud(CloudCredentials),
    Store(StoreCredentials),
}

/// Source of [`Credentials`] for an authorization provider.
///
/// Providers call [`load()`](CredentialSource::load()) once and cache the
/// result until they are invalidated. A load may be cancelled by dropping its
/// future when the request deadline passes.
#[async_trait]
pub trait CredentialSource: Send + Sync + Debug {
    async fn load(&self) -> Result<Credentials, NoSQLError>;
}

/// Credentials known up front.
#[derive(Clone, Debug)]
pub struct StaticCredentials(pub Credentials);

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn load(&self) -> Result<Credentials, NoSQLError> {
        Ok(self.0.clone())
    }
}

/// Store credentials read from a file of `key=value` lines:
///```text
/// username=testuser
/// password=1234567
///```
#[derive(Clone, Debug)]
pub struct StoreCredentialsFile {
    path: String,
}

impl StoreCredentialsFile {
    pub fn new(path: &str) -> StoreCredentialsFile {
        StoreCredentialsFile {
            path: path.to_string(),
        }
    }

    pub(crate) fn read(&self) -> Result<StoreCredentials, NoSQLError> {
        parse_store_credentials(&file_to_string(&self.path)?, &self.path)
    }
}

#[async_trait]
impl CredentialSource for StoreCredentialsFile {
    async fn load(&self) -> Result<Credentials, NoSQLError> {
        Ok(Credentials::Store(self.read()?))
    }
}

pub(crate) fn parse_store_credentials(
    data: &str,
    origin: &str,
) -> Result<StoreCredentials, NoSQLError> {
    let mut username = String::new();
    let mut password = String::new();
    for line in data.lines() {
        if let Some((k, v)) = line.split_once('=') {
            match k.trim() {
                "username" => username = v.trim().to_string(),
                "password" => password = v.trim().to_string(),
                _ => {}
            }
        }
    }
    if username.is_empty() {
        return ia_err!("username field missing from store credentials {}", origin);
    }
    Ok(StoreCredentials { username, password })
}
