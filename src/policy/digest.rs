// Copyright 2024 Contributors to the pitoken project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use base64::{engine::general_purpose, Engine as _};
use std::fmt;
use std::str::FromStr;

const DIGEST_LEN: usize = 32;

/// SHA-256 fingerprint of an app signing certificate.
///
/// Two textual forms are accepted:
/// * hex, optionally colon-separated (`AB:CD:...`), as printed by `keytool`
///   and the Play Console;
/// * the compact form used inside integrity verdicts, i.e. unpadded base64url.
///
/// Equality is on the raw 32 bytes, and [`fmt::Display`] always produces the
/// compact form.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CertificateDigest([u8; DIGEST_LEN]);

impl CertificateDigest {
    pub fn from_bytes(b: &[u8]) -> Result<Self, Error> {
        let d: [u8; DIGEST_LEN] = b.try_into().map_err(|_| {
            Error::Sema(format!(
                "certificate digest: expecting {DIGEST_LEN} bytes, got {}",
                b.len()
            ))
        })?;

        Ok(Self(d))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Upper-case, colon-separated hex
    pub fn to_hex_colons(&self) -> String {
        self.0
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<String>>()
            .join(":")
    }

    fn from_hex(v: &str) -> Result<Self, Error> {
        let compact: String = v.chars().filter(|c| *c != ':').collect();

        let b = hex::decode(compact)
            .map_err(|e| Error::Syntax(format!("certificate digest {v}: {e}")))?;

        Self::from_bytes(&b)
    }

    /// Parse the compact form only, exactly as it appears in integrity
    /// verdicts: no hex, no padding, no surrounding blanks
    pub fn from_compact(v: &str) -> Result<Self, Error> {
        let b = general_purpose::URL_SAFE_NO_PAD
            .decode(v)
            .map_err(|e| Error::Syntax(format!("certificate digest {v}: {e}")))?;

        Self::from_bytes(&b)
    }
}

impl FromStr for CertificateDigest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v = s.trim();

        // 64 hex digits never collide with the 43 characters of the compact
        // form
        if v.contains(':') || v.len() == 2 * DIGEST_LEN {
            Self::from_hex(v)
        } else {
            Self::from_compact(v)
        }
    }
}

impl fmt::Display for CertificateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&general_purpose::URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for CertificateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CertificateDigest({self})")
    }
}
