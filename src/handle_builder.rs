//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Builder for creating a [`NoSQL Handle`](crate::Handle)
//!
use reqwest::Client;
use std::env;
use std::result::Result;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::auth_common::authorization_provider::AuthorizationProvider;
use crate::auth_common::config_file_credentials::{ConfigFileCredentials, DEFAULT_CONFIG_FILE_PATH};
use crate::auth_common::credentials::{
    CloudCredentials, CredentialSource, Credentials, StaticCredentials, StoreCredentials,
    StoreCredentialsFile,
};
use crate::auth_common::signature_provider::SignatureProvider;
use crate::auth_common::store_access_token_provider::StoreAccessTokenProvider;
use crate::auth_common::trust::TrustedRoots;
use crate::binary_protocol::DEFAULT_MAX_OPERATION_SIZE;
use crate::error::{ia_err, NoSQLError};
use crate::handle::Handle;
use crate::retry::{DefaultRetryPolicy, RetryPolicy};
use crate::transport::{ReqwestTransport, Transport};

pub(crate) const DATA_PATH: &str = "/V2/nosql/data";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder used to set all the parameters to create a [`NoSQL Handle`](crate::Handle).
#[derive(Default, Debug, Clone)]
pub struct HandleBuilder {
    pub(crate) endpoint: String,
    pub(crate) use_https: bool,
    pub(crate) timeout: Option<Duration>,
    pub(crate) mode: HandleMode,
    pub(crate) auth: AuthConfig,
    pub(crate) compartment_id: Option<String>,
    pub(crate) trusted_roots: TrustedRoots,
    pub(crate) accept_invalid_certs: bool,
    pub(crate) client: Option<Client>,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) retry_policy: Option<Arc<dyn RetryPolicy>>,
    pub(crate) billing: Option<bool>,
    pub(crate) max_operation_size: Option<usize>,
    // For error messaging
    pub(crate) from_environment: bool,
}

#[derive(Default, Debug, Clone)]
pub(crate) enum AuthConfig {
    Cloud {
        source: Arc<dyn CredentialSource>,
    },
    Onprem {
        source: Arc<dyn CredentialSource>,
    },
    Provider(Arc<dyn AuthorizationProvider>),
    #[default]
    None,
}

/// The Oracle NoSQL Database mode to use.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleMode {
    /// Connect to the Oracle NoSQL Cloud Service.
    #[default]
    Cloud,
    /// Connect to a local Cloudsim instance (typically for testing purposes).
    Cloudsim,
    /// Connect to an on-premises installation of NoSQL Database Server.
    Onprem,
}

impl HandleBuilder {
    /// Create a new HandleBuilder struct.
    ///
    /// The default HandleBuilder does not set an authentication method. Consider calling
    /// [`from_environment()`](HandleBuilder::from_environment()) to collect all parameters from
    /// the local environment by default.
    pub fn new() -> Self {
        HandleBuilder {
            ..Default::default()
        }
    }

    /// Build a new [`Handle`].
    ///
    /// Note: Internally, if the [`HandleBuilder`] contains
    /// a reference to an existing [`reqwest::Client`], it will clone and
    /// use that. Otherwise, it will create a new [`reqwest::Client`] for its
    /// own internal use. See [`reqwest_client()`](HandleBuilder::reqwest_client()).
    pub async fn build(self) -> Result<Handle, NoSQLError> {
        if self.endpoint.is_empty() {
            if self.from_environment {
                return ia_err!("can't determine NoSQL endpoint: set ORACLE_NOSQL_ENDPOINT");
            }
            return ia_err!("can't determine NoSQL endpoint: call HandleBuilder::endpoint()");
        }
        if self.mode == HandleMode::Cloud && matches!(self.auth, AuthConfig::None) {
            if self.from_environment {
                return ia_err!(
                    "cannot build handle: no auth type specified. set ORACLE_NOSQL_AUTH environment."
                );
            }
            return ia_err!("cannot build handle: no auth type specified");
        }
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let scheme = if self.use_https { "https" } else { "http" };
        let base = Url::parse(&format!("{}://{}", scheme, self.endpoint))?;
        let url = base.join(DATA_PATH)?;

        let client = match &self.client {
            Some(c) => c.clone(),
            None => self.build_client(timeout)?,
        };
        let transport: Arc<dyn Transport> = match &self.transport {
            Some(t) => t.clone(),
            None => Arc::new(ReqwestTransport::new(client.clone())),
        };
        let auth: Option<Arc<dyn AuthorizationProvider>> = match &self.auth {
            AuthConfig::Cloud { source } => {
                let mut sp = SignatureProvider::new(source.clone());
                if let Some(c) = &self.compartment_id {
                    sp = sp.compartment_id(c);
                }
                Some(Arc::new(sp))
            }
            AuthConfig::Onprem { source } => Some(Arc::new(StoreAccessTokenProvider::new(
                source.clone(),
                client,
                &base,
            )?)),
            AuthConfig::Provider(p) => Some(p.clone()),
            AuthConfig::None => None,
        };
        let retry_policy = match &self.retry_policy {
            Some(p) => p.clone(),
            None => Arc::new(DefaultRetryPolicy::default()),
        };
        Ok(Handle::new(
            self.mode,
            url,
            transport,
            auth,
            retry_policy,
            timeout,
            self.billing.unwrap_or(self.mode == HandleMode::Cloud),
            self.max_operation_size.unwrap_or(DEFAULT_MAX_OPERATION_SIZE),
        ))
    }

    fn build_client(&self, timeout: Duration) -> Result<Client, NoSQLError> {
        let mut cb = Client::builder().timeout(timeout).connect_timeout(timeout);
        if self.accept_invalid_certs {
            cb = cb.danger_accept_invalid_certs(true);
        } else if !self.trusted_roots.is_empty() {
            cb = cb.use_preconfigured_tls(self.trusted_roots.client_config()?);
        }
        Ok(cb.build()?)
    }

    /// Gather configuration settings from the current envrionment.
    ///
    /// This method will scan the process [`standard environment`](std::env::Vars) to collect and
    /// set the configuration parameters. The values can be overridden in code if this method is
    /// called first and other methods are called afterwards, for example:
    ///```no_run
    /// # use nosql_wire_driver::Handle;
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    ///   let builder = Handle::builder()
    ///       .from_environment()?
    ///       .cloud_auth_from_file("~/nosql_oci_config")?;
    /// # Ok(())
    /// # }
    ///```
    /// The following environment variables are used:
    ///
    /// | variable | description |
    /// | -------- | ----------- |
    /// | `ORACLE_NOSQL_ENDPOINT` | The URL endpoint to use. See [`HandleBuilder::endpoint()`]. |
    /// | `ORACLE_NOSQL_AUTH` | The auth mechanism. One of: `user`, `onprem`, `cloudsim`. |
    /// | `ORACLE_NOSQL_AUTH_FILE` | For `user` auth, the path to the OCI config file (see [`HandleBuilder::cloud_auth_from_file()`]). For `onprem` auth, the path to the onprem user/password file (see [`HandleBuilder::onprem_auth_from_file()`]).
    /// | `ORACLE_NOSQL_CA_CERT` | The path to a trusted root certificate file in `pem` format (see [`HandleBuilder::add_cert_from_pemfile()`]). |
    /// | `ORACLE_NOSQL_ACCEPT_INVALID_CERTS` | If this is set to `1` or `true`, do not check certificates (see [`HandleBuilder::danger_accept_invalid_certs()`]). |
    ///
    pub fn from_environment(self) -> Result<Self, NoSQLError> {
        self.from_vars(|k| env::var(k).ok())
    }

    pub(crate) fn from_vars<F>(mut self, var: F) -> Result<Self, NoSQLError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.from_environment = true;
        let filename = var("ORACLE_NOSQL_AUTH_FILE");
        if let Some(val) = var("ORACLE_NOSQL_ENDPOINT") {
            self = self.endpoint(&val)?;
        }
        if let Some(val) = var("ORACLE_NOSQL_CA_CERT") {
            self = self.add_cert_from_pemfile(&val)?;
        }
        if let Some(val) = var("ORACLE_NOSQL_ACCEPT_INVALID_CERTS") {
            let lv = val.to_lowercase();
            if lv == "true" || lv == "1" {
                self = self.danger_accept_invalid_certs(true)?;
            }
        }
        if let Some(val) = var("ORACLE_NOSQL_AUTH") {
            let v = val.to_lowercase();
            match v.as_str() {
                "onprem" => {
                    if let Some(fname) = &filename {
                        self = self.onprem_auth_from_file(fname)?;
                    } else {
                        // non-secure store
                        self = self.mode(HandleMode::Onprem)?;
                    }
                }
                "user" => {
                    let fname = filename.as_deref().unwrap_or(DEFAULT_CONFIG_FILE_PATH);
                    self = self.cloud_auth_from_file(fname)?;
                }
                "cloudsim" => self = self.mode(HandleMode::Cloudsim)?,
                _ => {
                    return ia_err!("invalid value '{}' for ORACLE_NOSQL_AUTH", v);
                }
            }
        }
        Ok(self)
    }

    /// Set a specific endpoint connection to use.
    ///
    /// Examples:
    /// ```text
    ///     // Local cloudsim
    ///     http://localhost:8080
    ///
    ///     // Local on-premises server
    ///     https://<database_host>:8080
    ///
    ///     // Cloud service
    ///     https://nosql.us-ashburn-1.oci.oraclecloud.com
    /// ```
    /// An endpoint without a scheme keeps the scheme implied by the mode.
    pub fn endpoint(mut self, endpoint: &str) -> Result<Self, NoSQLError> {
        // normalize to just domain[:port]
        let rest = if let Some(b) = endpoint.strip_prefix("https://") {
            self.use_https = true;
            b
        } else if let Some(b) = endpoint.strip_prefix("http://") {
            self.use_https = false;
            b
        } else {
            endpoint
        };
        let rest = rest.trim_end_matches('/');
        if rest.is_empty() || rest.contains('/') {
            return ia_err!("invalid endpoint '{}': expected [scheme://]host[:port]", endpoint);
        }
        self.endpoint = rest.to_string();
        Ok(self)
    }

    /// Set the mode for the handle.
    ///
    /// Use [`HandleMode::Cloudsim`] to specify connection to a local cloudsim instance.
    ///
    /// Use [`HandleMode::Onprem`] when connecting to an on-premises NoSQL Server.
    ///
    /// By default, HandleBuilder assumes [`HandleMode::Cloud`].
    pub fn mode(mut self, mode: HandleMode) -> Result<Self, NoSQLError> {
        self.mode = mode;
        Ok(self)
    }

    /// Use these cloud credentials to sign requests.
    pub fn cloud_auth(self, creds: CloudCredentials) -> Result<Self, NoSQLError> {
        self.cloud_auth_from_source(Arc::new(StaticCredentials(Credentials::Cloud(creds))))
    }

    /// Load cloud credentials from `source` when the first request is sent.
    pub fn cloud_auth_from_source(
        mut self,
        source: Arc<dyn CredentialSource>,
    ) -> Result<Self, NoSQLError> {
        self.auth = AuthConfig::Cloud { source };
        self.use_https = true;
        self.mode = HandleMode::Cloud;
        Ok(self)
    }

    /// Specify an OCI config file to use with user-based authentication.
    ///
    /// This method allows the use of a file other than the default `~/.oci/config` file.
    /// See [SDK and CLI Configuration File](https://docs.oracle.com/en-us/iaas/Content/API/Concepts/sdkconfig.htm) for details.
    /// This method assumes the use of the `"DEFAULT"` profile.
    pub fn cloud_auth_from_file(self, config_file: &str) -> Result<Self, NoSQLError> {
        self.cloud_auth_from_file_with_profile(config_file, "DEFAULT")
    }

    /// Specify an OCI config file and profile to use with user-based authentication.
    ///
    /// The file is read when the first request is sent.
    pub fn cloud_auth_from_file_with_profile(
        self,
        config_file: &str,
        profile: &str,
    ) -> Result<Self, NoSQLError> {
        if profile.is_empty() {
            return ia_err!("profile name must be non-empty");
        }
        self.cloud_auth_from_source(Arc::new(ConfigFileCredentials::new(config_file, profile)))
    }

    /// Send cloud requests on behalf of this compartment.
    ///
    /// By default requests use the root compartment of the tenancy.
    pub fn compartment_id(mut self, compartment_id: &str) -> Result<Self, NoSQLError> {
        if compartment_id.is_empty() {
            self.compartment_id = None;
        } else {
            self.compartment_id = Some(compartment_id.to_string());
        }
        Ok(self)
    }

    /// Specify credentials for use with a secure On-premises NoSQL Server.
    ///
    /// Calling this method will also internally set the `HandleMode` to `Onprem`.
    pub fn onprem_auth(self, username: &str, passwd: &str) -> Result<Self, NoSQLError> {
        if username.is_empty() {
            return ia_err!("onprem username must be non-empty");
        }
        self.onprem_auth_from_source(Arc::new(StaticCredentials(Credentials::Store(
            StoreCredentials {
                username: username.to_string(),
                password: passwd.to_string(),
            },
        ))))
    }

    /// Specify credentials for use with a secure On-premises NoSQL Server from a local file.
    ///
    /// The format of the file is one value per line, using
    /// a `key=value` pair syntax, such as:
    ///```text
    /// username=testuser
    /// password=1234567
    ///```
    ///
    /// Calling this method will also internally set the `HandleMode` to `Onprem`
    /// and use https.
    pub fn onprem_auth_from_file(self, filename: &str) -> Result<Self, NoSQLError> {
        let mut b = self.onprem_auth_from_source(Arc::new(StoreCredentialsFile::new(filename)))?;
        b.use_https = true;
        Ok(b)
    }

    /// Load on-premises credentials from `source` when the first request is sent.
    pub fn onprem_auth_from_source(
        mut self,
        source: Arc<dyn CredentialSource>,
    ) -> Result<Self, NoSQLError> {
        self.auth = AuthConfig::Onprem { source };
        self.mode = HandleMode::Onprem;
        Ok(self)
    }

    /// Authorize requests with a custom provider.
    pub fn auth_provider(
        mut self,
        provider: Arc<dyn AuthorizationProvider>,
    ) -> Result<Self, NoSQLError> {
        self.auth = AuthConfig::Provider(provider);
        Ok(self)
    }

    /// Trust the root certificates in a `PEM` file for https connections.
    ///
    /// Once any root is added, server certificates must chain to one of the added roots.
    pub fn add_cert_from_pemfile(mut self, pemfile: &str) -> Result<Self, NoSQLError> {
        self.trusted_roots.add_pem_file(pemfile)?;
        Ok(self)
    }

    /// Trust the root certificates in `PEM` data for https connections.
    pub fn add_cert_pem(mut self, pem: &[u8]) -> Result<Self, NoSQLError> {
        self.trusted_roots.add_pem(pem)?;
        Ok(self)
    }

    /// Allow https connection without validating certificates.
    ///
    /// **Warning:** This is only recommended for local testing purposes. Its use is insecure. See [`reqwest::ClientBuilder::danger_accept_invalid_certs()`] for details.
    ///
    pub fn danger_accept_invalid_certs(
        mut self,
        accept_invalid_certs: bool,
    ) -> Result<Self, NoSQLError> {
        self.accept_invalid_certs = accept_invalid_certs;
        Ok(self)
    }

    /// Specify a [`reqwest::Client`] to use for all http/s connections.
    ///
    /// By default, the [`NoSQL Handle`](crate::Handle) creates an internal [`reqwest::Client`] to use for
    /// all communications. If your application already has a reqwest Client, you can pass that
    /// into the HandleBuilder to avoid creating multiple connection pools.
    /// Certificate settings of this builder do not apply to a supplied client.
    pub fn reqwest_client(mut self, client: &Client) -> Result<Self, NoSQLError> {
        self.client = Some(client.clone());
        Ok(self)
    }

    /// Send requests through a custom [`Transport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Result<Self, NoSQLError> {
        self.transport = Some(transport);
        Ok(self)
    }

    /// Replace the [`DefaultRetryPolicy`].
    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Result<Self, NoSQLError> {
        self.retry_policy = Some(policy);
        Ok(self)
    }

    /// Whether results report consumed capacity. Defaults to true in cloud mode only.
    pub fn billing(mut self, billing: bool) -> Result<Self, NoSQLError> {
        self.billing = Some(billing);
        Ok(self)
    }

    /// Maximum encoded size of one sub-operation of a
    /// [`WriteManyRequest`](crate::WriteManyRequest). Defaults to 2 MiB.
    pub fn max_operation_size(mut self, size: usize) -> Result<Self, NoSQLError> {
        if size == 0 {
            return ia_err!("max operation size must be positive");
        }
        self.max_operation_size = Some(size);
        Ok(self)
    }

    /// Specify the timeout used for operations.
    ///
    /// Note that the request timeout can be set on a per-request basis.
    ///
    /// The default timeout is 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Result<Self, NoSQLError> {
        if timeout.is_zero() {
            return ia_err!("timeout must be positive");
        }
        self.timeout = Some(timeout);
        Ok(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::NoSQLErrorCode;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn endpoint_normalization() {
        let b = HandleBuilder::new().endpoint("https://nosql.example.com/").unwrap();
        assert_eq!(b.endpoint, "nosql.example.com");
        assert!(b.use_https);
        let b = b.endpoint("http://localhost:8080").unwrap();
        assert_eq!(b.endpoint, "localhost:8080");
        assert!(!b.use_https);
        assert!(HandleBuilder::new().endpoint("http://h/some/path").is_err());
        assert!(HandleBuilder::new().endpoint("").is_err());
    }

    #[test]
    fn environment_cloudsim() {
        let b = HandleBuilder::new()
            .from_vars(vars(&[
                ("ORACLE_NOSQL_ENDPOINT", "http://localhost:8080"),
                ("ORACLE_NOSQL_AUTH", "Cloudsim"),
            ]))
            .unwrap();
        assert_eq!(b.mode, HandleMode::Cloudsim);
        assert_eq!(b.endpoint, "localhost:8080");
        assert!(b.from_environment);
    }

    #[test]
    fn environment_onprem_and_user() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"username=admin\npassword=pw\n").unwrap();
        let b = HandleBuilder::new()
            .from_vars(vars(&[
                ("ORACLE_NOSQL_ENDPOINT", "store.example.com:8443"),
                ("ORACLE_NOSQL_AUTH", "onprem"),
                ("ORACLE_NOSQL_AUTH_FILE", f.path().to_str().unwrap()),
                ("ORACLE_NOSQL_ACCEPT_INVALID_CERTS", "TRUE"),
            ]))
            .unwrap();
        assert_eq!(b.mode, HandleMode::Onprem);
        assert!(b.use_https);
        assert!(b.accept_invalid_certs);
        assert!(matches!(b.auth, AuthConfig::Onprem { .. }));

        let b = HandleBuilder::new()
            .from_vars(vars(&[("ORACLE_NOSQL_AUTH", "user")]))
            .unwrap();
        assert_eq!(b.mode, HandleMode::Cloud);
        assert!(matches!(b.auth, AuthConfig::Cloud { .. }));

        let err = HandleBuilder::new()
            .from_vars(vars(&[("ORACLE_NOSQL_AUTH", "kerberos")]))
            .unwrap_err();
        assert_eq!(err.code, NoSQLErrorCode::IllegalArgument);
    }

    #[tokio::test]
    async fn build_requires_endpoint_and_cloud_auth() {
        let err = HandleBuilder::new().build().await.unwrap_err();
        assert!(err.message.contains("endpoint"), "{}", err);
        let err = HandleBuilder::new()
            .endpoint("nosql.example.com")
            .unwrap()
            .build()
            .await
            .unwrap_err();
        assert!(err.message.contains("no auth type"), "{}", err);
    }

    #[tokio::test]
    async fn build_defaults() {
        let h = HandleBuilder::new()
            .endpoint("http://localhost:8080")
            .unwrap()
            .mode(HandleMode::Cloudsim)
            .unwrap()
            .build()
            .await
            .unwrap();
        assert_eq!(h.url().as_str(), "http://localhost:8080/V2/nosql/data");
        assert_eq!(h.timeout(), Duration::from_secs(30));
        assert!(!h.inner.billing);
        assert!(h.inner.auth.is_none());
        assert_eq!(h.inner.max_operation_size, DEFAULT_MAX_OPERATION_SIZE);

        let h = HandleBuilder::new()
            .endpoint("nosql.us-ashburn-1.oci.oraclecloud.com")
            .unwrap()
            .cloud_auth_from_file("~/does-not-exist")
            .unwrap()
            .timeout(Duration::from_secs(5))
            .unwrap()
            .build()
            .await
            .unwrap();
        assert_eq!(h.mode(), HandleMode::Cloud);
        assert_eq!(
            h.url().as_str(),
            "https://nosql.us-ashburn-1.oci.oraclecloud.com/V2/nosql/data"
        );
        assert!(h.inner.billing);
        assert!(h.inner.auth.is_some());
    }
}
