// Copyright 2024 Contributors to the pitoken project.
// SPDX-License-Identifier: Apache-2.0

/// Failures while loading the policy configuration
#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Syntax error: {0}")]
    Syntax(String),
    #[error("Semantic error: {0}")]
    Sema(String),
    #[error("Missing setting: {0}")]
    MissingSetting(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Syntax(e) | Error::Sema(e) | Error::MissingSetting(e) => {
                write!(f, "{}", e)
            }
        }
    }
}
