// Copyright 2024 Contributors to the pitoken project.
// SPDX-License-Identifier: Apache-2.0

use super::digest::CertificateDigest;
use super::errors::Error;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub const ENV_PACKAGE_NAME: &str = "PACKAGE_NAME";
pub const ENV_APP_MIN_VERSION: &str = "APP_MIN_VERSION";
pub const ENV_MAX_AGE_CLASSIC: &str = "MAX_PARTIAL_DELAY_MS_CLASSIC_OR_IOS";
pub const ENV_MAX_AGE_STANDARD: &str = "MAX_PARTIAL_DELAY_MS_STANDARD";
pub const ENV_MAX_ACTIVITY_LEVEL: &str = "MAX_ALLOWED_STANDARD_ACTIVITY_LEVEL";
pub const ENV_CERTIFICATES: &str = "VALID_CERTIFICATE_SHA256DIGEST";

/// Ordinal rate signal reported in `recentDeviceActivity`: how many
/// integrity tokens the device requested recently, from `LEVEL_1` (lowest)
/// to `LEVEL_4` (highest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "u8")]
pub enum ActivityLevel {
    Level1 = 1,
    Level2 = 2,
    Level3 = 3,
    Level4 = 4,
}

impl ActivityLevel {
    /// Map the `deviceActivityLevel` claim value onto a level
    pub fn from_claim(v: &str) -> Option<Self> {
        match v {
            "LEVEL_1" => Some(ActivityLevel::Level1),
            "LEVEL_2" => Some(ActivityLevel::Level2),
            "LEVEL_3" => Some(ActivityLevel::Level3),
            "LEVEL_4" => Some(ActivityLevel::Level4),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ActivityLevel {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(ActivityLevel::Level1),
            2 => Ok(ActivityLevel::Level2),
            3 => Ok(ActivityLevel::Level3),
            4 => Ok(ActivityLevel::Level4),
            x => Err(Error::Sema(format!(
                "activity level must be between 1 and 4, got {x}"
            ))),
        }
    }
}

impl FromStr for ActivityLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u8 = parse_digits(s)
            .and_then(|n| u8::try_from(n).ok())
            .ok_or_else(|| Error::Syntax(format!("activity level {s:?} is not an integer")))?;

        Self::try_from(n)
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LEVEL_{}", self.as_u8())
    }
}

/// Parse a string made exclusively of ASCII decimal digits.  Returns `None`
/// for anything else (signs, blanks, empty strings) and for values that do
/// not fit in a `u64`.
pub fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    s.parse().ok()
}

/// The thresholds and identities integrity verdicts are appraised against.
/// Built once at startup; never modified afterwards.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PolicyConfig {
    /// Package name of the Android app, e.g. `com.example.app`
    pub package_name: String,

    /// Oldest accepted `versionCode`
    pub min_version_code: u64,

    /// Maximum delay between token generation on the device and its
    /// verification here, for classic requests
    pub max_age_classic_ms: u64,

    /// Same, for standard requests
    pub max_age_standard_ms: u64,

    /// Highest `recentDeviceActivity` level still accepted
    pub max_activity_level: ActivityLevel,

    /// Digests of the certificates the app may be signed with, normalised to
    /// raw bytes whatever form they were supplied in
    #[serde_as(as = "BTreeSet<DisplayFromStr>")]
    pub allowed_certificates: BTreeSet<CertificateDigest>,
}

impl PolicyConfig {
    pub fn new(
        package_name: &str,
        min_version_code: u64,
        max_age_classic_ms: u64,
        max_age_standard_ms: u64,
        max_activity_level: ActivityLevel,
        allowed_certificates: impl IntoIterator<Item = CertificateDigest>,
    ) -> Result<Self, Error> {
        let c = Self {
            package_name: package_name.to_string(),
            min_version_code,
            max_age_classic_ms,
            max_age_standard_ms,
            max_activity_level,
            allowed_certificates: allowed_certificates.into_iter().collect(),
        };

        c.validate()?;

        Ok(c)
    }

    /// Load the policy from its JSON representation
    pub fn load_json(j: &str) -> Result<Self, Error> {
        let c: PolicyConfig = serde_json::from_str(j).map_err(|e| Error::Syntax(e.to_string()))?;

        c.validate()?;

        Ok(c)
    }

    /// Load the policy from the process environment
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(|k| std::env::var(k).ok())
    }

    /// Load the policy from the settings returned by `lookup`, which uses the
    /// same names as the process environment.  The certificates setting is a
    /// JSON array of digests.
    pub fn from_vars<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |k: &str| -> Result<String, Error> {
            lookup(k)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::MissingSetting(k.to_string()))
        };

        let number = |k: &str| -> Result<u64, Error> {
            let v = var(k)?;
            parse_digits(v.trim())
                .ok_or_else(|| Error::Syntax(format!("{k}: expecting a non-negative integer, got {v:?}")))
        };

        let level: ActivityLevel = var(ENV_MAX_ACTIVITY_LEVEL)?
            .trim()
            .parse()
            .map_err(|e| Error::Sema(format!("{ENV_MAX_ACTIVITY_LEVEL}: {e}")))?;

        let raw_certs: Vec<String> = serde_json::from_str(&var(ENV_CERTIFICATES)?).map_err(|e| {
            Error::Syntax(format!(
                "{ENV_CERTIFICATES}: expecting a JSON array of strings: {e}"
            ))
        })?;

        let certs = raw_certs
            .iter()
            .map(|c| c.parse::<CertificateDigest>())
            .collect::<Result<Vec<CertificateDigest>, Error>>()?;

        Self::new(
            &var(ENV_PACKAGE_NAME)?,
            number(ENV_APP_MIN_VERSION)?,
            number(ENV_MAX_AGE_CLASSIC)?,
            number(ENV_MAX_AGE_STANDARD)?,
            level,
            certs,
        )
    }

    fn validate(&self) -> Result<(), Error> {
        if self.package_name.trim().is_empty() {
            return Err(Error::Sema("package name must not be empty".to_string()));
        }

        Ok(())
    }
}
