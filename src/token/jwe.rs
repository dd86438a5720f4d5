// Copyright 2024 Contributors to the pitoken project.
// SPDX-License-Identifier: Apache-2.0

//! Compact JWE decryption restricted to the single shape Play Integrity
//! produces: the content encryption key wrapped with AES key wrap (`A256KW`)
//! and the content sealed with AES-256-GCM (`A256GCM`).

use super::base64;
use super::errors::Error;
use openssl::aes::{unwrap_key, AesKey};
use openssl::symm::{decrypt_aead, Cipher};
use serde::Deserialize;

pub(crate) const KEY_WRAP_ALG: &str = "A256KW";
pub(crate) const CONTENT_ENC: &str = "A256GCM";

const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
// RFC 3394 adds one 64-bit block to the wrapped key
const WRAP_OVERHEAD: usize = 8;

#[derive(Debug, Deserialize)]
struct ProtectedHeader {
    alg: String,
    enc: String,
}

/// The five segments of a compact JWE, base64url-decoded
struct Envelope<'a> {
    encoded_header: &'a str,
    header: ProtectedHeader,
    wrapped_key: Vec<u8>,
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
    tag: Vec<u8>,
}

impl<'a> Envelope<'a> {
    fn parse(token: &'a str) -> Result<Self, Error> {
        let parts: Vec<&str> = token.trim().split('.').collect();

        if parts.len() != 5 {
            return Err(Error::Decrypt(format!(
                "expecting 5 segments in compact JWE, got {}",
                parts.len()
            )));
        }

        let raw_header = base64::decode_str(parts[0], "JWE protected header")
            .map_err(|e| Error::Decrypt(e.to_string()))?;
        let header: ProtectedHeader = serde_json::from_slice(&raw_header)
            .map_err(|e| Error::Decrypt(format!("JWE protected header: {e}")))?;

        let segment = |i: usize, what: &str| {
            base64::decode_str(parts[i], what).map_err(|e| Error::Decrypt(e.to_string()))
        };

        Ok(Self {
            encoded_header: parts[0],
            header,
            wrapped_key: segment(1, "JWE encrypted key")?,
            iv: segment(2, "JWE initialization vector")?,
            ciphertext: segment(3, "JWE ciphertext")?,
            tag: segment(4, "JWE authentication tag")?,
        })
    }

    fn validate(&self) -> Result<(), Error> {
        if self.header.alg != KEY_WRAP_ALG {
            return Err(Error::Decrypt(format!(
                "unsupported key management algorithm {}, expecting {KEY_WRAP_ALG}",
                self.header.alg
            )));
        }

        if self.header.enc != CONTENT_ENC {
            return Err(Error::Decrypt(format!(
                "unsupported content encryption {}, expecting {CONTENT_ENC}",
                self.header.enc
            )));
        }

        if self.wrapped_key.len() != KEY_LEN + WRAP_OVERHEAD {
            return Err(Error::Decrypt(format!(
                "encrypted key: expecting {} bytes, got {}",
                KEY_LEN + WRAP_OVERHEAD,
                self.wrapped_key.len()
            )));
        }

        if self.iv.len() != IV_LEN {
            return Err(Error::Decrypt(format!(
                "initialization vector: expecting {IV_LEN} bytes, got {}",
                self.iv.len()
            )));
        }

        if self.tag.len() != TAG_LEN {
            return Err(Error::Decrypt(format!(
                "authentication tag: expecting {TAG_LEN} bytes, got {}",
                self.tag.len()
            )));
        }

        Ok(())
    }
}

/// Decrypt a compact JWE with the given 32 bytes key-encryption key and
/// return the plaintext.  Either the whole plaintext is authenticated and
/// returned, or an error is.
pub fn decrypt(token: &str, kek: &[u8]) -> Result<Vec<u8>, Error> {
    if kek.len() != KEY_LEN {
        return Err(Error::Key(format!(
            "decryption key: expecting {KEY_LEN} bytes, got {}",
            kek.len()
        )));
    }

    let envelope = Envelope::parse(token)?;
    envelope.validate()?;

    let unwrap = AesKey::new_decrypt(kek)
        .map_err(|e| Error::Key(format!("loading decryption key: {e:?}")))?;

    let mut cek = [0u8; KEY_LEN];
    unwrap_key(&unwrap, None, &mut cek, &envelope.wrapped_key)
        .map_err(|e| Error::Decrypt(format!("unwrapping content encryption key: {e:?}")))?;

    // the AAD is the ASCII form of the encoded protected header
    decrypt_aead(
        Cipher::aes_256_gcm(),
        &cek,
        Some(envelope.iv.as_slice()),
        envelope.encoded_header.as_bytes(),
        &envelope.ciphertext,
        &envelope.tag,
    )
    .map_err(|e| Error::Decrypt(format!("opening ciphertext: {e}")))
}
