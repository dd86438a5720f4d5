// Copyright 2024 Contributors to the pitoken project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, Secret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

const SCOPE: &str = "https://www.googleapis.com/auth/playintegrity";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_API_BASE: &str = "https://playintegrity.googleapis.com";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
// refresh the bearer this long before the authority says it expires
const BEARER_SLACK_SECS: i64 = 60;

/// Interface to the attestation authority that can decode tokens on our
/// behalf.  Implementations perform at most one decode round-trip per call
/// and never retry.
pub trait IntegrityAuthority: Send + Sync {
    /// Decode `token`, issued for `package_name`, and return the external
    /// claims payload verbatim.
    fn decode_integrity_token(&self, package_name: &str, token: &str) -> Result<Value, Error>;
}

#[derive(Deserialize)]
struct RawServiceAccount {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

/// Google Cloud service account credentials, as found in the JSON key file
#[derive(Debug)]
pub struct ServiceAccount {
    pub client_email: String,
    pub token_uri: String,
    private_key: SecretString,
}

impl ServiceAccount {
    pub fn from_json(j: &str) -> Result<Self, Error> {
        let raw: RawServiceAccount = serde_json::from_str(j)
            .map_err(|e| Error::Key(format!("service account credentials: {e}")))?;

        Ok(Self {
            client_email: raw.client_email,
            token_uri: raw
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            private_key: Secret::new(raw.private_key),
        })
    }

    /// Mint the self-signed assertion exchanged for a bearer token
    fn assertion(&self, now: i64) -> Result<String, Error> {
        #[derive(Debug, Serialize)]
        struct AssertionClaims<'a> {
            iss: &'a str,
            scope: &'a str,
            aud: &'a str,
            iat: i64,
            exp: i64,
        }

        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let key = EncodingKey::from_rsa_pem(self.private_key.expose_secret().as_bytes())
            .map_err(|e| Error::Key(format!("service account private key: {e}")))?;

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| Error::Key(format!("signing service account assertion: {e}")))
    }
}

struct Bearer {
    token: SecretString,
    expires_at: i64,
}

/// Decodes tokens through the Play Integrity `decodeIntegrityToken` API
pub struct GoogleAuthority {
    account: ServiceAccount,
    agent: ureq::Agent,
    api_base: String,
    bearer: Mutex<Option<Bearer>>,
}

impl GoogleAuthority {
    pub fn new(account: ServiceAccount) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(30))
            .timeout_write(Duration::from_secs(5))
            .user_agent(&format!("pitoken/{}", env!("CARGO_PKG_VERSION")))
            .build();

        Self::with_agent(account, agent)
    }

    pub fn with_agent(account: ServiceAccount, agent: ureq::Agent) -> Self {
        Self {
            account,
            agent,
            api_base: DEFAULT_API_BASE.to_string(),
            bearer: Mutex::new(None),
        }
    }

    /// Point the client at a different API host (e.g. a test double)
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn cached_bearer(&self, now: i64) -> Option<String> {
        let cached = self.bearer.lock().unwrap_or_else(PoisonError::into_inner);

        cached
            .as_ref()
            .filter(|b| b.expires_at - BEARER_SLACK_SECS > now)
            .map(|b| b.token.expose_secret().clone())
    }

    // The lock is only held to read or store the cached bearer, never across
    // the token endpoint round-trip.  Concurrent refreshes may each fetch a
    // token; the last one stored wins.
    fn bearer(&self) -> Result<String, Error> {
        let now = chrono::Utc::now().timestamp();

        if let Some(token) = self.cached_bearer(now) {
            return Ok(token);
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            #[serde(default)]
            expires_in: i64,
        }

        debug!("requesting access token for {}", self.account.client_email);

        let assertion = self.account.assertion(now)?;

        let rsp: TokenResponse = self
            .agent
            .post(&self.account.token_uri)
            .send_form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .map_err(from_ureq)?
            .into_json()
            .map_err(|e| Error::Transport(format!("reading access token response: {e}")))?;

        let token = rsp.access_token.clone();

        let mut cached = self.bearer.lock().unwrap_or_else(PoisonError::into_inner);
        *cached = Some(Bearer {
            token: Secret::new(rsp.access_token),
            expires_at: now + rsp.expires_in,
        });

        Ok(token)
    }
}

impl IntegrityAuthority for GoogleAuthority {
    fn decode_integrity_token(&self, package_name: &str, token: &str) -> Result<Value, Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct DecodeResponse {
            token_payload_external: Option<Value>,
        }

        let bearer = self.bearer()?;

        let url = format!("{}/v1/{}:decodeIntegrityToken", self.api_base, package_name);

        let rsp: DecodeResponse = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {bearer}"))
            .send_json(serde_json::json!({ "integrityToken": token }))
            .map_err(from_ureq)?
            .into_json()
            .map_err(|e| Error::Payload(format!("reading decode response: {e}")))?;

        rsp.token_payload_external.ok_or_else(|| {
            Error::Payload("decode response carries no tokenPayloadExternal".to_string())
        })
    }
}

fn from_ureq(e: ureq::Error) -> Error {
    match e {
        ureq::Error::Status(status, rsp) => Error::Authority {
            status,
            detail: rsp
                .into_string()
                .unwrap_or_else(|_| "unreadable response body".to_string()),
        },
        ureq::Error::Transport(t) => Error::Transport(t.to_string()),
    }
}
