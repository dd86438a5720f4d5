// Copyright 2024 Contributors to the pitoken project.
// SPDX-License-Identifier: Apache-2.0

use super::authority::IntegrityAuthority;
use super::base64;
use super::claims::Claims;
use super::errors::Error;
use super::jwe;
use super::jws::{self, VerificationKey};
use crate::policy::RequestMode;
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Which path turns an integrity token into claims
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Delegate to the attestation authority
    Remote,
    /// Decrypt and verify in-process with the app's own keys
    Local,
}

impl DecodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeMode::Remote => "remote",
            DecodeMode::Local => "local",
        }
    }

    /// Whether tokens for requests of type `request` can be decoded on this
    /// path.  Standard tokens are only ever issued in a form the authority
    /// can open.
    pub fn supports(&self, request: RequestMode) -> bool {
        match self {
            DecodeMode::Remote => true,
            DecodeMode::Local => request == RequestMode::Classic,
        }
    }
}

impl FromStr for DecodeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" | "remote-authority" | "google" => Ok(DecodeMode::Remote),
            "local" | "server" => Ok(DecodeMode::Local),
            other => Err(Error::UnknownMode(format!(
                "{other:?}: expecting one of remote, google, local, server"
            ))),
        }
    }
}

impl fmt::Display for DecodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key material for the local decode path
pub struct LocalKeys {
    decryption: Secret<Vec<u8>>,
    verification: VerificationKey,
}

impl fmt::Debug for LocalKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeys")
            .field("decryption", &"[REDACTED]")
            .field("verification", &self.verification)
            .finish()
    }
}

impl LocalKeys {
    pub fn new(decryption: Vec<u8>, verification: VerificationKey) -> Self {
        Self {
            decryption: Secret::new(decryption),
            verification,
        }
    }

    /// Build the keys from the strings handed out by the Play Console: the
    /// standard base64 of the raw AES key, and the standard base64 of the
    /// DER-encoded EC public key.
    pub fn from_encoded(decryption_b64: &str, verification_b64: &str) -> Result<Self, Error> {
        let decryption = base64::decode_key(decryption_b64, "decryption key")?;
        let der = base64::decode_key(verification_b64, "verification key")?;

        Ok(Self::new(decryption, VerificationKey::from_der(&der)?))
    }
}

/// Turns an integrity token into [`Claims`], through whichever paths have
/// been configured
pub struct TokenDecoder {
    package_name: String,
    authority: Option<Box<dyn IntegrityAuthority>>,
    keys: Option<LocalKeys>,
}

impl TokenDecoder {
    /// A decoder with no path configured yet.  `package_name` is the app the
    /// remote authority is asked to decode tokens for.
    pub fn new(package_name: &str) -> Self {
        Self {
            package_name: package_name.to_string(),
            authority: None,
            keys: None,
        }
    }

    pub fn with_authority(mut self, authority: Box<dyn IntegrityAuthority>) -> Self {
        self.authority = Some(authority);
        self
    }

    pub fn with_local_keys(mut self, keys: LocalKeys) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Decode `token` on the requested path
    pub fn decode(&self, token: &str, mode: DecodeMode) -> Result<Claims, Error> {
        info!(%mode, "decoding integrity token");

        match mode {
            DecodeMode::Remote => self.decode_remote(token),
            DecodeMode::Local => self.decode_local(token),
        }
    }

    /// As [`TokenDecoder::decode`], but refuse upfront a path that cannot
    /// handle tokens of the given request type
    pub fn decode_for(
        &self,
        token: &str,
        mode: DecodeMode,
        request: RequestMode,
    ) -> Result<Claims, Error> {
        if !mode.supports(request) {
            return Err(Error::UnsupportedCombination(format!(
                "{request} requests cannot be decoded on the {mode} path"
            )));
        }

        self.decode(token, mode)
    }

    fn decode_remote(&self, token: &str) -> Result<Claims, Error> {
        let authority = self.authority.as_ref().ok_or_else(|| {
            Error::PathNotConfigured("no integrity authority for remote decoding".to_string())
        })?;

        let payload = authority.decode_integrity_token(&self.package_name, token)?;

        Claims::from_value(payload)
    }

    fn decode_local(&self, token: &str) -> Result<Claims, Error> {
        let keys = self.keys.as_ref().ok_or_else(|| {
            Error::PathNotConfigured("no keys for local decoding".to_string())
        })?;

        let jws = jwe::decrypt(token, keys.decryption.expose_secret())?;
        debug!("integrity token decrypted");

        let payload = jws::verify(&jws, &keys.verification)?;
        debug!("integrity token signature verified");

        let v: Value = serde_json::from_slice(&payload)
            .map_err(|e| Error::Payload(format!("JWS payload is not JSON: {e}")))?;

        Claims::from_value(v)
    }
}
