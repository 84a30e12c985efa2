//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! HTTP request signing for the NoSQL Cloud Service.
//!
//! The signature covers three headers:
//!
//! ```text
//! (request-target): post /V2/nosql/data
//! host: nosql.us-ashburn-1.oci.oraclecloud.com
//! date: Thu, 05 Jan 2014 21:31:40 GMT
//! ```
//!
//! The date is always rendered in UTC. The service checks it against its own
//! UTC clock with a small skew tolerance.
use base64::prelude::{Engine as _, BASE64_STANDARD};
use chrono::prelude::*;
use reqwest::Method;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{nosql_err, NoSQLError};

pub(crate) const DATE_HEADER: &str = "date";
pub(crate) const REQUEST_TARGET_HEADER: &str = "(request-target)";
pub(crate) const HOST_HEADER: &str = "host";
pub(crate) const AUTHORIZATION_HEADER: &str = "authorization";

const SIGNED_HEADERS: [&str; 3] = [REQUEST_TARGET_HEADER, HOST_HEADER, DATE_HEADER];
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Headers produced by signing one request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SignedHeaders {
    pub(crate) date: String,
    pub(crate) host: String,
    pub(crate) authorization: String,
}

/// Render an instant as an HTTP date in UTC, whatever its offset.
pub(crate) fn format_date<Tz: TimeZone>(t: &DateTime<Tz>) -> String {
    t.with_timezone(&Utc).format(DATE_FORMAT).to_string()
}

pub(crate) fn host_of(url: &Url) -> Result<String, NoSQLError> {
    let host = match url.host_str() {
        Some(h) => h,
        None => return nosql_err!(IllegalArgument, "no host in url {}", url),
    };
    match url.port() {
        Some(p) => Ok(format!("{}:{}", host, p)),
        None => Ok(host.to_string()),
    }
}

fn request_target(method: &Method, url: &Url) -> String {
    let mut path = url.path().to_string();
    if let Some(q) = url.query() {
        path.push('?');
        path.push_str(q);
    }
    format!("{} {}", method.as_str().to_lowercase(), path)
}

pub(crate) fn string_to_sign(method: &Method, url: &Url, host: &str, date: &str) -> String {
    let parts = [
        format!("{}: {}", REQUEST_TARGET_HEADER, request_target(method, url)),
        format!("{}: {}", HOST_HEADER, host),
        format!("{}: {}", DATE_HEADER, date),
    ];
    parts.join("\n")
}

/// RSA PKCS#1 v1.5 over SHA-256, base64 encoded. Deterministic for a given key and input.
pub(crate) fn sign(private_key: &RsaPrivateKey, data: &[u8]) -> Result<String, NoSQLError> {
    let hashed = Sha256::digest(data);
    match private_key.sign(Pkcs1v15Sign::new::<Sha256>(), &hashed) {
        Ok(sig) => Ok(BASE64_STANDARD.encode(sig)),
        Err(e) => nosql_err!(AuthenticationFailed, "error signing request: {}", e),
    }
}

/// Sign a request at the given instant. Only the instant matters, not its offset.
pub(crate) fn sign_request<Tz: TimeZone>(
    private_key: &RsaPrivateKey,
    key_id: &str,
    method: &Method,
    url: &Url,
    now: &DateTime<Tz>,
) -> Result<SignedHeaders, NoSQLError> {
    let date = format_date(now);
    let host = host_of(url)?;
    let signature = sign(private_key, string_to_sign(method, url, &host, &date).as_bytes())?;
    let authorization = format!(
        r###"Signature version="1",keyId="{}",algorithm="rsa-sha256",headers="{}",signature="{}""###,
        key_id,
        SIGNED_HEADERS.join(" "),
        signature
    );
    Ok(SignedHeaders {
        date,
        host,
        authorization,
    })
}

// One small key shared by all tests; generating keys is slow in debug builds.
#[cfg(test)]
pub(crate) fn test_key() -> &'static RsaPrivateKey {
    static KEY: std::sync::OnceLock<RsaPrivateKey> = std::sync::OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap())
}

#[cfg(test)]
mod test {
    use super::*;
    use rsa::pkcs1v15::VerifyingKey;
    use rsa::signature::Verifier;

    fn url() -> Url {
        Url::parse("https://nosql.us-ashburn-1.oci.oraclecloud.com/V2/nosql/data").unwrap()
    }

    #[test]
    fn date_is_utc() {
        let t = DateTime::parse_from_rfc3339("2024-03-01T01:30:00-08:00").unwrap();
        assert_eq!(format_date(&t), "Fri, 01 Mar 2024 09:30:00 GMT");
    }

    #[test]
    fn string_to_sign_layout() {
        let s = string_to_sign(&Method::POST, &url(), "h", "d");
        assert_eq!(s, "(request-target): post /V2/nosql/data\nhost: h\ndate: d");
        let u = Url::parse("http://localhost:8080/x?a=b").unwrap();
        assert_eq!(host_of(&u).unwrap(), "localhost:8080");
        assert!(string_to_sign(&Method::POST, &u, "h", "d").starts_with("(request-target): post /x?a=b\n"));
    }

    #[test]
    fn signature_is_independent_of_local_offset() {
        let instant = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let mut sigs = Vec::new();
        for hours in [0, -8, 8] {
            let tz = FixedOffset::east_opt(hours * 3600).unwrap();
            let local = instant.with_timezone(&tz);
            sigs.push(sign_request(test_key(), "t/u/f", &Method::POST, &url(), &local).unwrap());
        }
        assert_eq!(sigs[0], sigs[1]);
        assert_eq!(sigs[0], sigs[2]);
        assert_eq!(sigs[0].date, "Sat, 15 Jun 2024 12:00:00 GMT");
        assert!(sigs[0]
            .authorization
            .contains(r#"headers="(request-target) host date""#));
        assert!(sigs[0].authorization.contains(r#"keyId="t/u/f""#));
    }

    #[test]
    fn signature_verifies() {
        let now = Utc::now();
        let h = sign_request(test_key(), "k", &Method::POST, &url(), &now).unwrap();
        let sig_b64 = h
            .authorization
            .split("signature=\"")
            .nth(1)
            .unwrap()
            .trim_end_matches('"');
        let sig_bytes = BASE64_STANDARD.decode(sig_b64).unwrap();
        let sig = rsa::pkcs1v15::Signature::try_from(sig_bytes.as_slice()).unwrap();
        let vk = VerifyingKey::<Sha256>::new(test_key().to_public_key());
        let signed = string_to_sign(&Method::POST, &url(), &h.host, &h.date);
        vk.verify(signed.as_bytes(), &sig).unwrap();
    }
}
