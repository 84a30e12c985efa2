//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::fmt;
use std::sync::Arc;

use crate::auth_common::file_utils::expand_user_home;
use crate::error::{ia_err, nosql_err, NoSQLError};

/// Root certificates trusted for TLS connections to the service.
///
/// When empty, the platform's default trust applies. Otherwise a server
/// certificate chain is accepted only if it ends at one of these roots.
#[derive(Clone, Default)]
pub struct TrustedRoots {
    certs: Vec<CertificateDer<'static>>,
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

impl TrustedRoots {
    pub fn new() -> TrustedRoots {
        TrustedRoots::default()
    }

    /// Add every certificate in a PEM bundle. Returns how many were added.
    pub fn add_pem(&mut self, pem: &[u8]) -> Result<usize, NoSQLError> {
        let mut added = 0;
        for cert in CertificateDer::pem_slice_iter(pem) {
            match cert {
                Ok(c) => {
                    self.add_der(c)?;
                    added += 1;
                }
                Err(e) => return ia_err!("invalid PEM certificate: {}", e),
            }
        }
        if added == 0 {
            return ia_err!("no certificates found in PEM data");
        }
        Ok(added)
    }

    pub fn add_pem_file(&mut self, path: &str) -> Result<usize, NoSQLError> {
        let path = expand_user_home(path)?;
        let data = match std::fs::read(&path) {
            Ok(d) => d,
            Err(e) => return ia_err!("error reading certificate file {}: {}", path, e),
        };
        self.add_pem(&data)
    }

    pub fn add_der(&mut self, der: CertificateDer<'static>) -> Result<(), NoSQLError> {
        // reject anything webpki cannot use as a trust anchor now, not at connect time
        let mut check = RootCertStore::empty();
        if let Err(e) = check.add(der.clone()) {
            return ia_err!("invalid root certificate: {}", e);
        }
        self.certs.push(der);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    fn root_store(&self) -> Result<RootCertStore, NoSQLError> {
        let mut roots = RootCertStore::empty();
        for c in &self.certs {
            if let Err(e) = roots.add(c.clone()) {
                return ia_err!("invalid root certificate: {}", e);
            }
        }
        Ok(roots)
    }

    /// Check a server certificate chain, end entity first, presented for `server_name`.
    ///
    /// Always succeeds when no roots are configured. A rejected chain is a
    /// `CertificateRejected` error, which is never retried.
    pub fn validate_chain(
        &self,
        chain: &[CertificateDer<'_>],
        server_name: &str,
    ) -> Result<(), NoSQLError> {
        if self.is_empty() {
            return Ok(());
        }
        let (end_entity, intermediates) = match chain.split_first() {
            Some(parts) => parts,
            None => return nosql_err!(CertificateRejected, "server presented no certificates"),
        };
        let name = match ServerName::try_from(server_name) {
            Ok(n) => n,
            Err(e) => return ia_err!("invalid server name '{}': {}", server_name, e),
        };
        let verifier =
            match WebPkiServerVerifier::builder_with_provider(Arc::new(self.root_store()?), provider())
                .build()
            {
                Ok(v) => v,
                Err(e) => return ia_err!("error building certificate verifier: {}", e),
            };
        match verifier.verify_server_cert(end_entity, intermediates, &name, &[], UnixTime::now()) {
            Ok(_) => Ok(()),
            Err(e) => nosql_err!(
                CertificateRejected,
                "certificate for '{}' rejected: {}",
                server_name,
                e
            ),
        }
    }

    /// Certificate verifier that runs [`TrustedRoots::validate_chain`] on every handshake.
    pub(crate) fn verifier(&self) -> Arc<dyn ServerCertVerifier> {
        Arc::new(TrustHook {
            roots: self.clone(),
            provider: provider(),
        })
    }

    /// TLS client configuration that trusts only these roots.
    pub(crate) fn client_config(&self) -> Result<ClientConfig, NoSQLError> {
        if self.is_empty() {
            return ia_err!("no trusted root certificates configured");
        }
        let builder = match ClientConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()
        {
            Ok(b) => b,
            Err(e) => return ia_err!("error configuring TLS: {}", e),
        };
        Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(self.verifier())
            .with_no_client_auth())
    }
}

#[derive(Debug)]
struct TrustHook {
    roots: TrustedRoots,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for TrustHook {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let mut chain = Vec::with_capacity(intermediates.len() + 1);
        chain.push(end_entity.clone());
        chain.extend(intermediates.iter().cloned());
        match self.roots.validate_chain(&chain, &server_name.to_str()) {
            Ok(()) => Ok(ServerCertVerified::assertion()),
            Err(e) => Err(rustls::Error::General(e.message)),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

impl fmt::Debug for TrustedRoots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustedRoots")
            .field("certs", &self.certs.len())
            .finish()
    }
}
