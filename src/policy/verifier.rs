// Copyright 2024 Contributors to the pitoken project.
// SPDX-License-Identifier: Apache-2.0

use super::config::{parse_digits, ActivityLevel, PolicyConfig};
use super::digest::CertificateDigest;
use super::verdict::{Reason, Verdict};
use crate::token::{Claims, FieldError, JsonType, Section};
use bitmask::*;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

const REQUEST_DETAILS: &str = "requestDetails";
const DEVICE_INTEGRITY: &str = "deviceIntegrity";
const RECENT_DEVICE_ACTIVITY: &str = "recentDeviceActivity";
const APP_INTEGRITY: &str = "appIntegrity";
const ENVIRONMENT_DETAILS: &str = "environmentDetails";
const ACCOUNT_DETAILS: &str = "accountDetails";

const MEETS_BASIC_INTEGRITY: &str = "MEETS_BASIC_INTEGRITY";
const MEETS_DEVICE_INTEGRITY: &str = "MEETS_DEVICE_INTEGRITY";
const MEETS_STRONG_INTEGRITY: &str = "MEETS_STRONG_INTEGRITY";
const MEETS_VIRTUAL_INTEGRITY: &str = "MEETS_VIRTUAL_INTEGRITY";

const UNEVALUATED: &str = "UNEVALUATED";
const PLAY_RECOGNIZED: &str = "PLAY_RECOGNIZED";
const NO_ISSUES: &str = "NO_ISSUES";
const LICENSED: &str = "LICENSED";

bitmask! {
    #[derive(Debug)]
    mask DeviceVerdicts: u8 where flags DeviceVerdict {
        Basic   = 0x01,
        Device  = 0x02,
        Strong  = 0x04,
        Virtual = 0x08,
    }
}

/// The two request flavours of the integrity API.  They bind the token to
/// the request through different fields and tolerate different latencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Classic,
    Standard,
}

impl RequestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMode::Classic => "classic",
            RequestMode::Standard => "standard",
        }
    }

    /// The `requestDetails` field that must echo the expected value
    fn binding_field(&self) -> &'static str {
        match self {
            RequestMode::Classic => "nonce",
            RequestMode::Standard => "requestHash",
        }
    }

    fn max_age_ms(&self, config: &PolicyConfig) -> u64 {
        match self {
            RequestMode::Classic => config.max_age_classic_ms,
            RequestMode::Standard => config.max_age_standard_ms,
        }
    }
}

impl FromStr for RequestMode {
    type Err = Reason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classic" => Ok(RequestMode::Classic),
            "standard" => Ok(RequestMode::Standard),
            other => Err(Reason::InvalidRequestType {
                found: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RequestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a check may look at
struct Context<'a> {
    claims: &'a Claims,
    config: &'a PolicyConfig,
    expected: &'a str,
    mode: RequestMode,
    now_ms: i64,
}

type Check = fn(&Context<'_>) -> Result<(), Reason>;

/// The checks, in evaluation order.  Later checks may rely on the presence
/// of sections validated by earlier ones.
const CHECKS: [(&str, Check); 11] = [
    ("request binding", check_request_binding),
    ("request package name", check_request_package),
    ("request age", check_request_age),
    ("device recognition verdict", check_device_recognition),
    ("device activity level", check_device_activity),
    ("app recognition verdict", check_app_recognition),
    ("app package name", check_app_package),
    ("app version code", check_app_version),
    ("app signing certificate", check_app_certificate),
    ("play protect verdict", check_play_protect),
    ("app licensing verdict", check_licensing),
];

/// Appraises decoded integrity claims against a [`PolicyConfig`]
#[derive(Debug, Clone)]
pub struct PolicyVerifier {
    config: PolicyConfig,
}

impl PolicyVerifier {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Appraise `claims` for a request of type `request_type` (`"classic"`
    /// or `"standard"`), expecting the token to carry `expected` as its
    /// nonce or request hash.
    ///
    /// Never fails: malformed claims yield a [`super::Status::Fail`] verdict,
    /// an unknown request type a [`super::Status::Error`] one.
    pub fn verify(&self, claims: &Claims, expected: &str, request_type: &str) -> Verdict {
        match request_type.parse::<RequestMode>() {
            Ok(mode) => self.verify_request(claims, expected, mode),
            Err(reason) => Verdict::error(reason),
        }
    }

    pub fn verify_request(&self, claims: &Claims, expected: &str, mode: RequestMode) -> Verdict {
        let now_ms = chrono::Utc::now().timestamp_millis();

        self.verify_request_at(claims, expected, mode, now_ms)
    }

    /// As [`PolicyVerifier::verify_request`], with the current time supplied
    /// in milliseconds since the epoch
    pub fn verify_request_at(
        &self,
        claims: &Claims,
        expected: &str,
        mode: RequestMode,
        now_ms: i64,
    ) -> Verdict {
        let ctx = Context {
            claims,
            config: &self.config,
            expected,
            mode,
            now_ms,
        };

        for (name, check) in CHECKS.iter() {
            if let Err(reason) = check(&ctx) {
                debug!(check = name, mode = %mode, "attestation rejected: {reason}");
                return Verdict::fail(reason);
            }

            debug!(check = name, "passed");
        }

        info!(mode = %mode, "attested device meets policy");

        Verdict::success()
    }
}

fn section<'a>(claims: &'a Claims, name: &str) -> Result<Section<'a>, Reason> {
    claims.section(name).map_err(|e| match e {
        FieldError::Missing => Reason::SectionMissing {
            section: name.to_string(),
        },
        FieldError::TypeMismatch { found, .. } => Reason::SectionType {
            section: name.to_string(),
            found,
        },
    })
}

fn subsection<'a>(parent: Section<'a>, parent_name: &str, name: &str) -> Result<Section<'a>, Reason> {
    parent.object(name).map_err(|e| match e {
        FieldError::Missing => Reason::SectionMissing {
            section: format!("{parent_name}.{name}"),
        },
        FieldError::TypeMismatch { found, .. } => Reason::SectionType {
            section: format!("{parent_name}.{name}"),
            found,
        },
    })
}

fn field_reason(field: String, e: FieldError) -> Reason {
    match e {
        FieldError::Missing => Reason::FieldMissing { field },
        FieldError::TypeMismatch { expected, found } => Reason::FieldType {
            field,
            expected,
            found,
        },
    }
}

fn string<'a>(s: Section<'a>, section: &str, key: &str) -> Result<&'a str, Reason> {
    s.str(key)
        .map_err(|e| field_reason(format!("{section}.{key}"), e))
}

fn array<'a>(s: Section<'a>, section: &str, key: &str) -> Result<&'a [Value], Reason> {
    s.array(key)
        .map_err(|e| field_reason(format!("{section}.{key}"), e))
}

/// A string field holding a non-negative decimal integer
fn digits(s: Section<'_>, section: &str, key: &str) -> Result<u64, Reason> {
    let v = string(s, section, key)?;

    parse_digits(v).ok_or_else(|| Reason::NotDigits {
        field: format!("{section}.{key}"),
    })
}

/// An array element that must be a non-empty string
fn element<'a>(v: &'a Value, field: String) -> Result<&'a str, Reason> {
    match v {
        Value::String(s) if !s.is_empty() => Ok(s.as_str()),
        Value::String(_) | Value::Null => Err(Reason::FieldMissing { field }),
        other => Err(Reason::FieldType {
            field,
            expected: JsonType::String,
            found: JsonType::of(other),
        }),
    }
}

fn check_request_binding(ctx: &Context<'_>) -> Result<(), Reason> {
    let rd = section(ctx.claims, REQUEST_DETAILS)?;

    let key = ctx.mode.binding_field();
    let received = string(rd, REQUEST_DETAILS, key)?;

    debug!(expected = ctx.expected, received, "comparing request binding");

    if received != ctx.expected {
        return Err(Reason::BindingMismatch {
            field: format!("{REQUEST_DETAILS}.{key}"),
        });
    }

    Ok(())
}

fn check_request_package(ctx: &Context<'_>) -> Result<(), Reason> {
    let rd = section(ctx.claims, REQUEST_DETAILS)?;

    let key = "requestPackageName";
    let pkg = string(rd, REQUEST_DETAILS, key)?;

    if pkg != ctx.config.package_name {
        return Err(Reason::PackageMismatch {
            field: format!("{REQUEST_DETAILS}.{key}"),
            found: pkg.to_string(),
        });
    }

    Ok(())
}

fn check_request_age(ctx: &Context<'_>) -> Result<(), Reason> {
    let rd = section(ctx.claims, REQUEST_DETAILS)?;

    let ts = digits(rd, REQUEST_DETAILS, "timestampMillis")?;
    let max_age_ms = ctx.mode.max_age_ms(ctx.config);

    // a token stamped in the future has a negative age and is not rejected
    // here
    let age = i128::from(ctx.now_ms) - i128::from(ts);

    if age > i128::from(max_age_ms) {
        return Err(Reason::RequestTooOld {
            age_ms: u64::try_from(age).unwrap_or(u64::MAX),
            max_age_ms,
        });
    }

    info!("attested device has valid {REQUEST_DETAILS}");

    Ok(())
}

fn check_device_recognition(ctx: &Context<'_>) -> Result<(), Reason> {
    let di = section(ctx.claims, DEVICE_INTEGRITY)?;

    let key = "deviceRecognitionVerdict";
    let labels = array(di, DEVICE_INTEGRITY, key)?;

    let mut verdicts = DeviceVerdicts::none();

    for (i, v) in labels.iter().enumerate() {
        match element(v, format!("{DEVICE_INTEGRITY}.{key}[{i}]"))? {
            MEETS_BASIC_INTEGRITY => verdicts.set(DeviceVerdict::Basic),
            MEETS_DEVICE_INTEGRITY => verdicts.set(DeviceVerdict::Device),
            MEETS_STRONG_INTEGRITY => verdicts.set(DeviceVerdict::Strong),
            MEETS_VIRTUAL_INTEGRITY => verdicts.set(DeviceVerdict::Virtual),
            other => debug!("ignoring device recognition label {other}"),
        }
    }

    if verdicts.contains(DeviceVerdict::Virtual) {
        return Err(Reason::VirtualIntegrity);
    }

    let required = [
        (DeviceVerdict::Basic, MEETS_BASIC_INTEGRITY),
        (DeviceVerdict::Device, MEETS_DEVICE_INTEGRITY),
        (DeviceVerdict::Strong, MEETS_STRONG_INTEGRITY),
    ];

    for (flag, label) in required.iter() {
        if !verdicts.contains(*flag) {
            return Err(Reason::IntegrityLabelMissing {
                label: label.to_string(),
            });
        }
    }

    info!("attested device has valid {key}");

    Ok(())
}

fn check_device_activity(ctx: &Context<'_>) -> Result<(), Reason> {
    let di = section(ctx.claims, DEVICE_INTEGRITY)?;
    let rda = subsection(di, DEVICE_INTEGRITY, RECENT_DEVICE_ACTIVITY)?;

    let level = string(
        rda,
        &format!("{DEVICE_INTEGRITY}.{RECENT_DEVICE_ACTIVITY}"),
        "deviceActivityLevel",
    )?;

    if level == UNEVALUATED {
        return Err(Reason::ActivityUnevaluated);
    }

    let attested = ActivityLevel::from_claim(level).ok_or_else(|| Reason::ActivityUnknown {
        found: level.to_string(),
    })?;

    let max = ctx.config.max_activity_level;

    if attested > max {
        return Err(Reason::ActivityTooHigh {
            max: max.as_u8(),
            found: attested.as_u8(),
        });
    }

    info!(level = %attested, "attested device has valid deviceActivityLevel");

    Ok(())
}

fn check_app_recognition(ctx: &Context<'_>) -> Result<(), Reason> {
    let ai = section(ctx.claims, APP_INTEGRITY)?;

    let verdict = string(ai, APP_INTEGRITY, "appRecognitionVerdict")?;

    if verdict != PLAY_RECOGNIZED {
        return Err(Reason::AppNotRecognized {
            verdict: verdict.to_string(),
        });
    }

    Ok(())
}

fn check_app_package(ctx: &Context<'_>) -> Result<(), Reason> {
    let ai = section(ctx.claims, APP_INTEGRITY)?;

    let key = "packageName";
    let pkg = string(ai, APP_INTEGRITY, key)?;

    if pkg != ctx.config.package_name {
        return Err(Reason::PackageMismatch {
            field: format!("{APP_INTEGRITY}.{key}"),
            found: pkg.to_string(),
        });
    }

    Ok(())
}

fn check_app_version(ctx: &Context<'_>) -> Result<(), Reason> {
    let ai = section(ctx.claims, APP_INTEGRITY)?;

    let version = digits(ai, APP_INTEGRITY, "versionCode")?;
    let min = ctx.config.min_version_code;

    if version < min {
        return Err(Reason::VersionTooOld {
            found: version,
            min,
        });
    }

    Ok(())
}

fn check_app_certificate(ctx: &Context<'_>) -> Result<(), Reason> {
    let ai = section(ctx.claims, APP_INTEGRITY)?;

    let key = "certificateSha256Digest";
    let certs = array(ai, APP_INTEGRITY, key)?;

    // apps signed by several certificates are not supported
    if certs.len() != 1 {
        return Err(Reason::CertificateCount { found: certs.len() });
    }

    let received = element(&certs[0], format!("{APP_INTEGRITY}.{key}[0]"))?;

    // verdicts always carry the compact form; other spellings are not
    // normalised here
    let allowed = CertificateDigest::from_compact(received)
        .map(|d| ctx.config.allowed_certificates.contains(&d))
        .unwrap_or(false);

    if !allowed {
        return Err(Reason::CertificateNotAllowed {
            found: received.to_string(),
        });
    }

    info!("attested device has valid {APP_INTEGRITY}");

    Ok(())
}

fn check_play_protect(ctx: &Context<'_>) -> Result<(), Reason> {
    let ed = section(ctx.claims, ENVIRONMENT_DETAILS)?;

    let verdict = string(ed, ENVIRONMENT_DETAILS, "playProtectVerdict")?;

    if verdict != NO_ISSUES {
        return Err(Reason::PlayProtect {
            found: verdict.to_string(),
        });
    }

    info!("attested device has valid {ENVIRONMENT_DETAILS}");

    Ok(())
}

fn check_licensing(ctx: &Context<'_>) -> Result<(), Reason> {
    let ad = section(ctx.claims, ACCOUNT_DETAILS)?;

    let verdict = string(ad, ACCOUNT_DETAILS, "appLicensingVerdict")?;

    if verdict != LICENSED {
        return Err(Reason::Unlicensed {
            found: verdict.to_string(),
        });
    }

    info!("attested device has valid {ACCOUNT_DETAILS}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Status;
    use serde_json::json;

    const TEST_POLICY: &str = include_str!("../../testdata/policy.json");
    const TEST_CLAIMS_CLASSIC_OK: &str = include_str!("../../testdata/claims-classic.json");
    const TEST_CLAIMS_STANDARD_OK: &str = include_str!("../../testdata/claims-standard.json");

    const NONCE: &str = "R2Rra24fVm5xa2Mg";
    const REQUEST_HASH: &str = "2cp24z...f7a3";
    // matches timestampMillis in the fixtures
    const ISSUED_AT_MS: i64 = 1_700_000_000_000;
    const NOW_MS: i64 = ISSUED_AT_MS + 5_000;

    fn verifier() -> PolicyVerifier {
        PolicyVerifier::new(PolicyConfig::load_json(TEST_POLICY).expect("loading policy"))
    }

    fn classic_doc() -> Value {
        serde_json::from_str(TEST_CLAIMS_CLASSIC_OK).unwrap()
    }

    fn run(doc: Value) -> Verdict {
        let claims = Claims::from_value(doc).unwrap();

        verifier().verify_request_at(&claims, NONCE, RequestMode::Classic, NOW_MS)
    }

    fn assert_fail(v: &Verdict, reason: Reason) {
        assert_eq!(v.status, Status::Fail, "{}", v.message);
        assert_eq!(v.reason.as_ref(), Some(&reason), "{}", v.message);
    }

    #[test]
    fn classic_ok() {
        let v = run(classic_doc());

        assert_eq!(v, Verdict::success());
        assert_eq!(v.message, "Successful");
    }

    #[test]
    fn standard_ok() {
        let claims = Claims::from_json(TEST_CLAIMS_STANDARD_OK).unwrap();

        let v = verifier().verify_request_at(&claims, REQUEST_HASH, RequestMode::Standard, NOW_MS);

        assert!(v.is_success(), "{}", v.message);
    }

    #[test]
    fn standard_binds_request_hash_not_nonce() {
        let claims = Claims::from_value(classic_doc()).unwrap();

        let v = verifier().verify_request_at(&claims, NONCE, RequestMode::Standard, NOW_MS);

        assert_fail(
            &v,
            Reason::FieldMissing {
                field: "requestDetails.requestHash".to_string(),
            },
        );
    }

    #[test]
    fn unknown_request_type_is_an_error() {
        let claims = Claims::from_value(classic_doc()).unwrap();

        for mode in ["", "Classic", "ios", "standard "] {
            let v = verifier().verify(&claims, NONCE, mode);

            assert_eq!(v.status, Status::Error);
            assert!(matches!(v.reason, Some(Reason::InvalidRequestType { .. })));
        }

        // claims content is irrelevant
        let empty = Claims::from_value(json!({})).unwrap();
        assert_eq!(verifier().verify(&empty, NONCE, "legacy").status, Status::Error);
    }

    #[test]
    fn verify_with_string_mode() {
        let claims = Claims::from_value(classic_doc()).unwrap();

        // the fixture timestamp is long past, so a real clock rejects it as
        // too old, which still proves the classic path was taken
        let v = verifier().verify(&claims, NONCE, "classic");

        assert!(matches!(v.reason, Some(Reason::RequestTooOld { .. })));
    }

    #[test]
    fn missing_sections() {
        for (section, pos) in [
            ("requestDetails", 0),
            ("deviceIntegrity", 1),
            ("appIntegrity", 2),
            ("environmentDetails", 3),
            ("accountDetails", 4),
        ] {
            let mut doc = classic_doc();
            doc.as_object_mut().unwrap().remove(section);

            let v = run(doc);

            assert_fail(
                &v,
                Reason::SectionMissing {
                    section: section.to_string(),
                },
            );
            assert!(v.message.contains(section), "{pos}: {}", v.message);
        }
    }

    #[test]
    fn section_wrong_type() {
        let mut doc = classic_doc();
        doc["appIntegrity"] = json!(["PLAY_RECOGNIZED"]);

        assert_fail(
            &run(doc),
            Reason::SectionType {
                section: "appIntegrity".to_string(),
                found: JsonType::Array,
            },
        );
    }

    // For every check: the field is removed, then replaced with a number.
    // All earlier fields are valid, so the verdict must name exactly the
    // field under test.
    #[test]
    fn every_field_missing_or_mistyped() {
        let fields: [(&str, &str, JsonType); 11] = [
            ("/requestDetails", "nonce", JsonType::String),
            ("/requestDetails", "requestPackageName", JsonType::String),
            ("/requestDetails", "timestampMillis", JsonType::String),
            ("/deviceIntegrity", "deviceRecognitionVerdict", JsonType::Array),
            (
                "/deviceIntegrity/recentDeviceActivity",
                "deviceActivityLevel",
                JsonType::String,
            ),
            ("/appIntegrity", "appRecognitionVerdict", JsonType::String),
            ("/appIntegrity", "packageName", JsonType::String),
            ("/appIntegrity", "versionCode", JsonType::String),
            ("/appIntegrity", "certificateSha256Digest", JsonType::Array),
            ("/environmentDetails", "playProtectVerdict", JsonType::String),
            ("/accountDetails", "appLicensingVerdict", JsonType::String),
        ];

        for (parent, key, expected) in fields {
            let name = format!("{}.{key}", parent.trim_start_matches('/').replace('/', "."));

            let mut doc = classic_doc();
            doc.pointer_mut(parent)
                .unwrap()
                .as_object_mut()
                .unwrap()
                .remove(key);

            assert_fail(&run(doc), Reason::FieldMissing { field: name.clone() });

            let mut doc = classic_doc();
            doc.pointer_mut(parent).unwrap()[key] = json!(42);

            let v = run(doc);
            assert_fail(
                &v,
                Reason::FieldType {
                    field: name.clone(),
                    expected,
                    found: JsonType::Number,
                },
            );
            assert!(v.message.contains(&name), "{}", v.message);
        }
    }

    #[test]
    fn fail_fast_later_checks_not_evaluated() {
        // both the nonce and the licensing verdict are wrong: only the first
        // is reported
        let mut doc = classic_doc();
        doc["requestDetails"]["nonce"] = json!("replayed");
        doc["accountDetails"]["appLicensingVerdict"] = json!("UNLICENSED");

        assert_fail(
            &run(doc),
            Reason::BindingMismatch {
                field: "requestDetails.nonce".to_string(),
            },
        );
    }

    #[test]
    fn null_counts_as_missing() {
        let mut doc = classic_doc();
        doc["requestDetails"]["nonce"] = Value::Null;

        assert_fail(
            &run(doc),
            Reason::FieldMissing {
                field: "requestDetails.nonce".to_string(),
            },
        );
    }

    #[test]
    fn request_package_mismatch() {
        let mut doc = classic_doc();
        doc["requestDetails"]["requestPackageName"] = json!("com.example.evil");

        assert_fail(
            &run(doc),
            Reason::PackageMismatch {
                field: "requestDetails.requestPackageName".to_string(),
                found: "com.example.evil".to_string(),
            },
        );
    }

    #[test]
    fn timestamp_must_be_digits() {
        for bad in ["-1", "1.7e12", " 1700000000000", "0x10", "+1700000000000"] {
            let mut doc = classic_doc();
            doc["requestDetails"]["timestampMillis"] = json!(bad);

            assert_fail(
                &run(doc),
                Reason::NotDigits {
                    field: "requestDetails.timestampMillis".to_string(),
                },
            );
        }
    }

    #[test]
    fn request_age_per_mode() {
        let claims = Claims::from_json(TEST_CLAIMS_STANDARD_OK).unwrap();
        let v = verifier();

        // 10 s is the standard limit, inclusive
        let at_limit = ISSUED_AT_MS + 10_000;
        assert!(v
            .verify_request_at(&claims, REQUEST_HASH, RequestMode::Standard, at_limit)
            .is_success());

        let over = v.verify_request_at(&claims, REQUEST_HASH, RequestMode::Standard, at_limit + 1);
        assert_fail(
            &over,
            Reason::RequestTooOld {
                age_ms: 10_001,
                max_age_ms: 10_000,
            },
        );

        // the classic limit is 60 s
        let claims = Claims::from_value(classic_doc()).unwrap();
        assert!(v
            .verify_request_at(&claims, NONCE, RequestMode::Classic, ISSUED_AT_MS + 60_000)
            .is_success());
        assert!(!v
            .verify_request_at(&claims, NONCE, RequestMode::Classic, ISSUED_AT_MS + 60_001)
            .is_success());
    }

    #[test]
    fn future_timestamp_is_not_too_old() {
        let claims = Claims::from_value(classic_doc()).unwrap();

        let v = verifier().verify_request_at(&claims, NONCE, RequestMode::Classic, ISSUED_AT_MS - 1);

        assert!(v.is_success(), "{}", v.message);
    }

    #[test]
    fn emulator_is_rejected() {
        let mut doc = classic_doc();
        doc["deviceIntegrity"]["deviceRecognitionVerdict"]
            .as_array_mut()
            .unwrap()
            .push(json!("MEETS_VIRTUAL_INTEGRITY"));

        let v = run(doc);

        assert_fail(&v, Reason::VirtualIntegrity);
        assert!(v.message.contains("virtual integrity"));
    }

    #[test]
    fn integrity_tiers_reported_in_order() {
        let cases = [
            (
                json!(["MEETS_DEVICE_INTEGRITY", "MEETS_STRONG_INTEGRITY"]),
                MEETS_BASIC_INTEGRITY,
            ),
            (
                json!(["MEETS_BASIC_INTEGRITY", "MEETS_STRONG_INTEGRITY"]),
                MEETS_DEVICE_INTEGRITY,
            ),
            (
                json!(["MEETS_BASIC_INTEGRITY", "MEETS_DEVICE_INTEGRITY"]),
                MEETS_STRONG_INTEGRITY,
            ),
            (json!([]), MEETS_BASIC_INTEGRITY),
        ];

        for (labels, missing) in cases {
            let mut doc = classic_doc();
            doc["deviceIntegrity"]["deviceRecognitionVerdict"] = labels;

            assert_fail(
                &run(doc),
                Reason::IntegrityLabelMissing {
                    label: missing.to_string(),
                },
            );
        }
    }

    #[test]
    fn device_label_must_be_string() {
        let mut doc = classic_doc();
        doc["deviceIntegrity"]["deviceRecognitionVerdict"][1] = json!(true);

        assert_fail(
            &run(doc),
            Reason::FieldType {
                field: "deviceIntegrity.deviceRecognitionVerdict[1]".to_string(),
                expected: JsonType::String,
                found: JsonType::Boolean,
            },
        );
    }

    #[test]
    fn recent_device_activity_missing() {
        let mut doc = classic_doc();
        doc["deviceIntegrity"]
            .as_object_mut()
            .unwrap()
            .remove("recentDeviceActivity");

        assert_fail(
            &run(doc),
            Reason::SectionMissing {
                section: "deviceIntegrity.recentDeviceActivity".to_string(),
            },
        );
    }

    #[test]
    fn activity_level_boundary() {
        // the policy allows up to LEVEL_2
        let level = |l: &str| {
            let mut doc = classic_doc();
            doc["deviceIntegrity"]["recentDeviceActivity"]["deviceActivityLevel"] = json!(l);
            run(doc)
        };

        assert!(level("LEVEL_1").is_success());
        assert!(level("LEVEL_2").is_success());
        assert_fail(&level("LEVEL_3"), Reason::ActivityTooHigh { max: 2, found: 3 });
        assert_fail(&level("LEVEL_4"), Reason::ActivityTooHigh { max: 2, found: 4 });
        assert_fail(&level("UNEVALUATED"), Reason::ActivityUnevaluated);
        assert_fail(
            &level("LEVEL_5"),
            Reason::ActivityUnknown {
                found: "LEVEL_5".to_string(),
            },
        );
    }

    #[test]
    fn app_not_recognized_is_echoed() {
        for verdict in ["UNRECOGNIZED_VERSION", "UNEVALUATED"] {
            let mut doc = classic_doc();
            doc["appIntegrity"]["appRecognitionVerdict"] = json!(verdict);

            let v = run(doc);

            assert_fail(
                &v,
                Reason::AppNotRecognized {
                    verdict: verdict.to_string(),
                },
            );
            assert!(v.message.contains(verdict));
        }
    }

    #[test]
    fn app_package_checked_independently() {
        // request section is fine, app section was forged
        let mut doc = classic_doc();
        doc["appIntegrity"]["packageName"] = json!("com.example.evil");

        assert_fail(
            &run(doc),
            Reason::PackageMismatch {
                field: "appIntegrity.packageName".to_string(),
                found: "com.example.evil".to_string(),
            },
        );
    }

    #[test]
    fn version_is_compared_numerically() {
        let mut config = PolicyConfig::load_json(TEST_POLICY).unwrap();

        let version = |config: &PolicyConfig, code: &str| {
            let mut doc = classic_doc();
            doc["appIntegrity"]["versionCode"] = json!(code);
            let claims = Claims::from_value(doc).unwrap();

            PolicyVerifier::new(config.clone()).verify_request_at(
                &claims,
                NONCE,
                RequestMode::Classic,
                NOW_MS,
            )
        };

        config.min_version_code = 10;
        assert_fail(&version(&config, "9"), Reason::VersionTooOld { found: 9, min: 10 });
        assert!(version(&config, "10").is_success());
        assert!(version(&config, "100").is_success());

        config.min_version_code = 9;
        assert!(version(&config, "10").is_success());

        assert_fail(
            &version(&config, "10a"),
            Reason::NotDigits {
                field: "appIntegrity.versionCode".to_string(),
            },
        );
    }

    #[test]
    fn certificate_array_must_have_one_element() {
        let good = "sEQvE7ZSHiOakI9K21w1QOcNYw3Z-UpB2rxUfqCmGXM";

        for (certs, n) in [
            (json!([good, good]), 2),
            (json!([good, "not-a-digest"]), 2),
            (json!([]), 0),
        ] {
            let mut doc = classic_doc();
            doc["appIntegrity"]["certificateSha256Digest"] = certs;

            let v = run(doc);

            assert_fail(&v, Reason::CertificateCount { found: n });
            assert!(v.message.contains("exactly one element"));
        }
    }

    #[test]
    fn certificate_not_allowed() {
        for bad in [
            "amoUdLXLuysapX4Lw-LD8emi0PRcYemhx-blPmHZ8KI",
            "garbage",
            "sEQvE7ZSHiOakI9K21w1QOcNYw3Z-UpB2rxUfqCmGXM=",
        ] {
            let mut doc = classic_doc();
            doc["appIntegrity"]["certificateSha256Digest"] = json!([bad]);

            assert_fail(
                &run(doc),
                Reason::CertificateNotAllowed {
                    found: bad.to_string(),
                },
            );
        }
    }

    #[test]
    fn certificate_claim_must_be_compact() {
        let hex_colons = "B0:44:2F:13:B6:52:1E:23:9A:90:8F:4A:DB:5C:35:40:E7:0D:63:0D:D9:F9:4A:41:DA:BC:54:7E:A0:A6:19:73";

        // all of these name the allowed certificate
        for claimed in [
            "  sEQvE7ZSHiOakI9K21w1QOcNYw3Z-UpB2rxUfqCmGXM ",
            "b0442f13b6521e239a908f4adb5c3540e70d630dd9f94a41dabc547ea0a61973",
            hex_colons,
        ] {
            let mut doc = classic_doc();
            doc["appIntegrity"]["certificateSha256Digest"] = json!([claimed]);

            assert_fail(
                &run(doc),
                Reason::CertificateNotAllowed {
                    found: claimed.to_string(),
                },
            );
        }
    }

    #[test]
    fn certificate_configured_as_hex_matches_compact_claim() {
        let digest: CertificateDigest =
            "b0442f13b6521e239a908f4adb5c3540e70d630dd9f94a41dabc547ea0a61973"
                .parse()
                .unwrap();
        let config = PolicyConfig::new(
            "com.example.app",
            10,
            60_000,
            10_000,
            ActivityLevel::Level2,
            [digest],
        )
        .unwrap();

        let claims = Claims::from_value(classic_doc()).unwrap();

        let v = PolicyVerifier::new(config).verify_request_at(
            &claims,
            NONCE,
            RequestMode::Classic,
            NOW_MS,
        );

        assert!(v.is_success(), "{}", v.message);
    }

    #[test]
    fn play_protect_and_licensing() {
        let mut doc = classic_doc();
        doc["environmentDetails"]["playProtectVerdict"] = json!("HIGH_RISK");

        assert_fail(
            &run(doc),
            Reason::PlayProtect {
                found: "HIGH_RISK".to_string(),
            },
        );

        let mut doc = classic_doc();
        doc["accountDetails"]["appLicensingVerdict"] = json!("UNLICENSED");

        assert_fail(
            &run(doc),
            Reason::Unlicensed {
                found: "UNLICENSED".to_string(),
            },
        );
    }

    #[test]
    fn request_mode_parsing() {
        assert_eq!("classic".parse::<RequestMode>(), Ok(RequestMode::Classic));
        assert_eq!("standard".parse::<RequestMode>(), Ok(RequestMode::Standard));
        assert!("STANDARD".parse::<RequestMode>().is_err());
        assert_eq!(RequestMode::Standard.to_string(), "standard");
    }
}
