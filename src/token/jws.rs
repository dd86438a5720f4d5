// Copyright 2024 Contributors to the pitoken project.
// SPDX-License-Identifier: Apache-2.0

use super::base64;
use super::errors::Error;
use jsonwebtoken::{Algorithm, DecodingKey};
use openssl::pkey::PKey;

/// The integrity service signs its verdicts with ECDSA P-256
pub(crate) const SIGNATURE_ALG: Algorithm = Algorithm::ES256;

/// An EC public key used to check the inner JWS
#[derive(Clone)]
pub struct VerificationKey {
    pem: Vec<u8>,
    key: DecodingKey,
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.pem))
    }
}

impl VerificationKey {
    /// Build the key from a DER-encoded SubjectPublicKeyInfo.  The DER is
    /// parsed and re-emitted as PEM so that malformed material is caught at
    /// load time rather than on the first token.
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let pkey = PKey::public_key_from_der(der)
            .map_err(|e| Error::Key(format!("verification key is not a valid SPKI: {e}")))?;

        pkey.ec_key()
            .map_err(|e| Error::Key(format!("verification key is not an EC key: {e}")))?;

        let pem = pkey
            .public_key_to_pem()
            .map_err(|e| Error::Key(format!("PEM-wrapping verification key: {e}")))?;

        Self::from_pem(&pem)
    }

    pub fn from_pem(pem: &[u8]) -> Result<Self, Error> {
        let key = DecodingKey::from_ec_pem(pem)
            .map_err(|e| Error::Key(format!("loading verification key: {e}")))?;

        Ok(Self {
            pem: pem.to_vec(),
            key,
        })
    }
}

/// Check the signature of a compact JWS and return its (still undecoded)
/// payload bytes.
pub fn verify(token: &[u8], key: &VerificationKey) -> Result<Vec<u8>, Error> {
    let token = std::str::from_utf8(token)
        .map_err(|e| Error::Signature(format!("JWS is not valid UTF-8: {e}")))?;

    let parts: Vec<&str> = token.trim().split('.').collect();

    if parts.len() != 3 {
        return Err(Error::Signature(format!(
            "expecting 3 segments in compact JWS, got {}",
            parts.len()
        )));
    }

    let header = jsonwebtoken::decode_header(token)
        .map_err(|e| Error::Signature(format!("JWS header: {e}")))?;

    if header.alg != SIGNATURE_ALG {
        return Err(Error::Signature(format!(
            "unsupported signature algorithm {:?}, expecting {SIGNATURE_ALG:?}",
            header.alg
        )));
    }

    let signing_input = format!("{}.{}", parts[0], parts[1]);

    let valid = jsonwebtoken::crypto::verify(
        parts[2],
        signing_input.as_bytes(),
        &key.key,
        SIGNATURE_ALG,
    )
    .map_err(|e| Error::Signature(e.to_string()))?;

    if !valid {
        return Err(Error::Signature("signature does not match".to_string()));
    }

    base64::decode_str(parts[1], "JWS payload").map_err(|e| Error::Payload(e.to_string()))
}
