// SPDX-License-Identifier: Apache-2.0

use base64::{self, engine::general_purpose, Engine as _};

use super::errors::Error;

/// decodes bytes from a base64url-encoded (unpadded) string, as found in the
/// segments of a compact JOSE serialization
pub fn decode_str(v: &str, what: &str) -> Result<Vec<u8>, Error> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(v)
        .map_err(|e| Error::Syntax(format!("{what}: {e}")))
}

/// encodes bytes as base64url without padding
pub fn encode(v: &[u8]) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(v)
}

/// decodes key material supplied through configuration, which uses the
/// standard (padded) alphabet
pub fn decode_key(v: &str, what: &str) -> Result<Vec<u8>, Error> {
    general_purpose::STANDARD
        .decode(v.trim())
        .map_err(|e| Error::Key(format!("{what} is not valid base64: {e}")))
}
