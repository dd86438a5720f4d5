// Copyright 2024 Contributors to the pitoken project.
// SPDX-License-Identifier: Apache-2.0

//! The policy module appraises decoded [`crate::token::Claims`] against a
//! [`PolicyConfig`] and reports a [`Verdict`].
//!
//! # Example
//!
//! ```
//! use pitoken::policy::{PolicyConfig, PolicyVerifier, Status};
//! use pitoken::token::Claims;
//!
//! const jpolicy: &str = include_str!("../../testdata/policy.json");
//! let config = PolicyConfig::load_json(jpolicy).expect("loading policy");
//!
//! const jclaims: &str = include_str!("../../testdata/claims-classic.json");
//! let claims = Claims::from_json(jclaims).expect("parsing claims");
//!
//! let v = PolicyVerifier::new(config).verify(&claims, "R2Rra24fVm5xa2Mg", "classic");
//!
//! // the fixture was issued long ago
//! assert_eq!(v.status, Status::Fail);
//! ```

pub use self::config::{parse_digits, ActivityLevel, PolicyConfig};
pub use self::config::{
    ENV_APP_MIN_VERSION, ENV_CERTIFICATES, ENV_MAX_ACTIVITY_LEVEL, ENV_MAX_AGE_CLASSIC,
    ENV_MAX_AGE_STANDARD, ENV_PACKAGE_NAME,
};
pub use self::digest::CertificateDigest;
pub use self::errors::Error;
pub use self::verdict::{Reason, Status, Verdict, SUCCESS_MESSAGE};
pub use self::verifier::{PolicyVerifier, RequestMode};

mod config;
mod digest;
mod errors;
mod verdict;
mod verifier;
