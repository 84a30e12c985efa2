//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;

use crate::error::{ia_err, NoSQLError};

/// Parse an RSA private key in PEM format, PKCS#8 or PKCS#1.
pub(crate) fn parse_private_key(
    pem: &str,
    passphrase: Option<&str>,
) -> Result<RsaPrivateKey, NoSQLError> {
    if passphrase.is_some_and(|p| !p.is_empty()) {
        return ia_err!("passphrase-protected private keys are not supported");
    }
    if let Ok(k) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(k);
    }
    match RsaPrivateKey::from_pkcs1_pem(pem) {
        Ok(k) => Ok(k),
        Err(e) => ia_err!("invalid RSA private key: {}", e),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};

    #[test]
    fn test_invalid_key() {
        assert!(parse_private_key("invalid key", None).is_err());
    }

    #[test]
    fn test_passphrase_is_rejected() {
        let err = parse_private_key("some key content", Some("Invalid passphrase")).unwrap_err();
        assert!(err.message.contains("passphrase"));
    }

    #[test]
    fn test_pkcs8_and_pkcs1() {
        let mut rng = rand::thread_rng();
        let rsa = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let pkcs8 = rsa.to_pkcs8_pem(LineEnding::LF).unwrap();
        let pkcs1 = rsa.to_pkcs1_pem(LineEnding::LF).unwrap();
        assert_eq!(parse_private_key(&pkcs8, None).unwrap(), rsa);
        assert_eq!(parse_private_key(&pkcs1, Some("")).unwrap(), rsa);
    }
}
