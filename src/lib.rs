// Copyright 2024 Contributors to the pitoken project.
// SPDX-License-Identifier: Apache-2.0

//! Google Play Integrity token decoding and appraisal.
//!
//! This crate provides an API to turn the integrity token an Android app
//! obtained from Play into trustworthy claims, and to decide whether those
//! claims meet a server-side policy.  For detailed information about the
//! verdict format, see the Play Integrity [API] documentation.
//!
//! The API allows:
//! * Decoding a token, either through the remote authority or locally by
//!   decrypting and verifying it with the app's own keys
//! * Appraising the decoded claims against a configured policy, with a
//!   single-reason verdict for every rejection
//!
//! [API]: https://developer.android.com/google/play/integrity/verdicts

pub mod policy;
pub mod token;
