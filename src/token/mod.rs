// Copyright 2024 Contributors to the pitoken project.
// SPDX-License-Identifier: Apache-2.0

//! The token module turns a Play Integrity token into [`Claims`].
//!
//! Two decode paths are available through [`TokenDecoder`]:
//! * [`DecodeMode::Remote`] hands the opaque token to an
//!   [`IntegrityAuthority`], usually a [`GoogleAuthority`], and returns the
//!   payload it sends back;
//! * [`DecodeMode::Local`] decrypts the compact JWE (A256KW + A256GCM) and
//!   checks the inner ES256 JWS with the keys in [`LocalKeys`].  Only tokens
//!   from classic requests can be decoded this way.
//!
//! # Example
//!
//! ```no_run
//! use pitoken::token::{DecodeMode, LocalKeys, TokenDecoder};
//!
//! let keys = LocalKeys::from_encoded(
//!     &std::env::var("BASE64_OF_ENCODED_DECRYPTION_KEY").unwrap(),
//!     &std::env::var("BASE64_OF_ENCODED_VERIFICATION_KEY").unwrap(),
//! )
//! .expect("loading local keys");
//!
//! let decoder = TokenDecoder::new("com.example.app").with_local_keys(keys);
//!
//! let token = std::fs::read_to_string("token.jwe").unwrap();
//! let claims = decoder
//!     .decode(&token, DecodeMode::Local)
//!     .expect("decoding integrity token");
//!
//! println!("{}", claims.to_json_pretty());
//! ```

pub use self::authority::{GoogleAuthority, IntegrityAuthority, ServiceAccount};
pub use self::claims::{Claims, FieldError, JsonType, Section};
pub use self::decoder::{DecodeMode, LocalKeys, TokenDecoder};
pub use self::errors::Error;
pub use self::jws::VerificationKey;

mod authority;
mod base64;
mod claims;
mod decoder;
mod errors;
mod jwe;
mod jws;
