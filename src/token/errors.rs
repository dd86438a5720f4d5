// Copyright 2024 Contributors to the pitoken project.
// SPDX-License-Identifier: Apache-2.0

/// Failures that prevent a token from being turned into claims at all.  These
/// are distinct from policy rejections, which are reported through
/// [`crate::policy::Verdict`].
#[derive(thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Syntax error: {0}")]
    Syntax(String),
    #[error("Decryption failed: {0}")]
    Decrypt(String),
    #[error("Signature verification failed: {0}")]
    Signature(String),
    #[error("Malformed payload: {0}")]
    Payload(String),
    #[error("Key error: {0}")]
    Key(String),
    #[error("Integrity authority rejected the token (status {status}): {detail}")]
    Authority { status: u16, detail: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Decode path not configured: {0}")]
    PathNotConfigured(String),
    #[error("Unsupported combination: {0}")]
    UnsupportedCombination(String),
    #[error("Unknown decode mode: {0}")]
    UnknownMode(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Syntax(e)
            | Error::Decrypt(e)
            | Error::Signature(e)
            | Error::Payload(e)
            | Error::Key(e)
            | Error::Transport(e)
            | Error::PathNotConfigured(e)
            | Error::UnsupportedCombination(e)
            | Error::UnknownMode(e) => {
                write!(f, "{}", e)
            }
            Error::Authority { status, detail } => {
                write!(f, "{status}: {detail}")
            }
        }
    }
}
