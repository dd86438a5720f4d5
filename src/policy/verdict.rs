// Copyright 2024 Contributors to the pitoken project.
// SPDX-License-Identifier: Apache-2.0

use crate::token::JsonType;
use serde::Serialize;

pub const SUCCESS_MESSAGE: &str = "Successful";

/// Outcome class of an appraisal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// every check passed
    Success,
    /// the claims do not meet the policy
    Fail,
    /// the verifier was called incorrectly
    Error,
}

/// Machine-readable account of why a verdict is not a success.  The
/// [`std::fmt::Display`] form is the operator-facing message.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "kebab-case")]
pub enum Reason {
    #[error("Invalid function call: requestType must be either 'classic' or 'standard'. Got {found:?}.")]
    InvalidRequestType { found: String },

    #[error("{section} not found in received token.")]
    SectionMissing { section: String },
    #[error("Wrong type for {section}. We expected object. We found {found}.")]
    SectionType { section: String, found: JsonType },

    #[error("Missing {field} field in the token.")]
    FieldMissing { field: String },
    #[error("Wrong type for {field}. We expected {expected}. We found {found}.")]
    FieldType {
        field: String,
        expected: JsonType,
        found: JsonType,
    },
    #[error("Wrong contents for {field}. We expected to find only decimal digits.")]
    NotDigits { field: String },

    #[error("Nonce/Hash mismatch in {field}.")]
    BindingMismatch { field: String },
    #[error("Invalid package name in {field}. Found {found}.")]
    PackageMismatch { field: String, found: String },
    #[error("Request too old. {age_ms} ms passed between generating the token on the device and checking it on the server, at most {max_age_ms} ms are allowed.")]
    RequestTooOld { age_ms: u64, max_age_ms: u64 },

    #[error("Only meets virtual integrity (MEETS_VIRTUAL_INTEGRITY). Likely running on emulator.")]
    VirtualIntegrity,
    #[error("Device does not meet {label}.")]
    IntegrityLabelMissing { label: String },

    #[error("deviceIntegrity.recentDeviceActivity.deviceActivityLevel is UNEVALUATED.")]
    ActivityUnevaluated,
    #[error("deviceIntegrity.recentDeviceActivity.deviceActivityLevel had an unexpected value {found}. Values must be within LEVEL_1, LEVEL_2, LEVEL_3, and LEVEL_4.")]
    ActivityUnknown { found: String },
    #[error("deviceIntegrity.recentDeviceActivity.deviceActivityLevel showed a value beyond our allowed limits. The maximum that is allowed is LEVEL_{max}. We found LEVEL_{found}.")]
    ActivityTooHigh { max: u8, found: u8 },

    #[error("appIntegrity.appRecognitionVerdict is {verdict}.")]
    AppNotRecognized { verdict: String },
    #[error("Invalid version code of the app. The app is running an outdated version. The app version is {found}. Minimum version is {min}.")]
    VersionTooOld { found: u64, min: u64 },
    #[error("We expected appIntegrity.certificateSha256Digest to be an array with exactly one element. Found {found}.")]
    CertificateCount { found: usize },
    #[error("Invalid appIntegrity.certificateSha256Digest {found}.")]
    CertificateNotAllowed { found: String },

    #[error("Play Protect status failed. Expected NO_ISSUES. Found {found}.")]
    PlayProtect { found: String },
    #[error("accountDetails.appLicensingVerdict is {found}.")]
    Unlicensed { found: String },
}

/// The result of appraising a set of claims: what the caller branches on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub status: Status,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
}

impl Verdict {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            message: SUCCESS_MESSAGE.to_string(),
            reason: None,
        }
    }

    pub fn fail(reason: Reason) -> Self {
        Self {
            status: Status::Fail,
            message: reason.to_string(),
            reason: Some(reason),
        }
    }

    pub fn error(reason: Reason) -> Self {
        Self {
            status: Status::Error,
            message: reason.to_string(),
            reason: Some(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
