// Copyright 2024 Contributors to the pitoken project.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use pitoken::policy::{CertificateDigest, PolicyConfig, PolicyVerifier, RequestMode, Verdict};
use pitoken::token::{
    Claims, DecodeMode, GoogleAuthority, LocalKeys, ServiceAccount, TokenDecoder,
};
use std::error::Error;
use std::fs;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
enum PITokenCli {
    Decode(DecodeArgs),
    Verify(VerifyArgs),
    Check(CheckArgs),
    Digest(DigestArgs),
}

#[derive(Debug, clap::Args)]
struct DecodeKeys {
    /// Standard base64 of the AES-256 key used by the local decode path
    #[arg(long, env = "BASE64_OF_ENCODED_DECRYPTION_KEY", hide_env_values = true)]
    decryption_key: Option<String>,

    /// Standard base64 of the DER EC public key used by the local decode path
    #[arg(long, env = "BASE64_OF_ENCODED_VERIFICATION_KEY")]
    verification_key: Option<String>,

    /// Service account JSON key file used by the remote decode path
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials: Option<String>,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Decode the supplied integrity token and print its claims")]
struct DecodeArgs {
    #[arg(short, long, default_value = "token.txt")]
    token: String,

    #[arg(short, long, default_value = "remote")]
    mode: DecodeMode,

    #[arg(short, long, env = "PACKAGE_NAME")]
    package_name: String,

    #[command(flatten)]
    keys: DecodeKeys,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Appraise the supplied claims against the policy and print the \
    verdict")]
struct VerifyArgs {
    #[arg(short, long, default_value = "claims.json")]
    claims: String,

    #[arg(short, long)]
    nonce: String,

    #[arg(short, long, default_value = "classic")]
    request_type: String,

    /// Policy JSON file; the environment is used when absent
    #[arg(short, long)]
    policy: Option<String>,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Decode the supplied integrity token, then appraise its claims \
    against the policy")]
struct CheckArgs {
    #[arg(short, long, default_value = "token.txt")]
    token: String,

    #[arg(short, long, default_value = "remote")]
    mode: DecodeMode,

    #[arg(short, long)]
    nonce: String,

    #[arg(short, long, default_value = "classic")]
    request_type: RequestMode,

    #[arg(short, long)]
    policy: Option<String>,

    #[command(flatten)]
    keys: DecodeKeys,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Print the canonical form of certificate digests given as hex \
    or unpadded base64url")]
struct DigestArgs {
    #[arg(required = true)]
    digests: Vec<String>,
}

fn main() -> ExitCode {
    init_logging();

    let ok = match PITokenCli::parse() {
        PITokenCli::Decode(args) => match decode(&args) {
            Ok(c) => {
                println!("{}", c.to_json_pretty());
                true
            }
            Err(e) => {
                eprintln!("decoding failed: {e}");
                false
            }
        },

        PITokenCli::Verify(args) => match verify(&args) {
            Ok(v) => report(&v),
            Err(e) => {
                eprintln!("verification failed: {e}");
                false
            }
        },

        PITokenCli::Check(args) => match check(&args) {
            Ok(v) => report(&v),
            Err(e) => {
                eprintln!("check failed: {e}");
                false
            }
        },

        PITokenCli::Digest(args) => match digest(&args) {
            Ok(()) => true,
            Err(e) => {
                eprintln!("digest normalisation failed: {e}");
                false
            }
        },
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// `RUST_LOG` wins; otherwise `LOGGING_LEVEL` 0, 1 or 2 selects error, info
/// or debug
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match std::env::var("LOGGING_LEVEL").ok().as_deref().map(str::trim) {
            Some("0") => "error",
            Some("2") => "debug",
            _ => "info",
        };
        EnvFilter::new(level)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report(v: &Verdict) -> bool {
    match serde_json::to_string_pretty(v) {
        Ok(j) => println!("{j}"),
        Err(_) => println!("{}", v.message),
    }

    v.is_success()
}

fn load_policy(path: &Option<String>) -> Result<PolicyConfig, Box<dyn Error>> {
    let c = match path {
        Some(p) => PolicyConfig::load_json(&fs::read_to_string(p)?)?,
        None => PolicyConfig::from_env()?,
    };

    Ok(c)
}

fn make_decoder(package_name: &str, keys: &DecodeKeys) -> Result<TokenDecoder, Box<dyn Error>> {
    let mut d = TokenDecoder::new(package_name);

    if let (Some(dk), Some(vk)) = (&keys.decryption_key, &keys.verification_key) {
        d = d.with_local_keys(LocalKeys::from_encoded(dk, vk)?);
    }

    if let Some(path) = &keys.credentials {
        let sa = ServiceAccount::from_json(&fs::read_to_string(path)?)?;
        d = d.with_authority(Box::new(GoogleAuthority::new(sa)));
    }

    Ok(d)
}

fn decode(args: &DecodeArgs) -> Result<Claims, Box<dyn Error>> {
    let d = make_decoder(&args.package_name, &args.keys)?;

    let token = fs::read_to_string(&args.token)?;

    Ok(d.decode(token.trim(), args.mode)?)
}

fn verify(args: &VerifyArgs) -> Result<Verdict, Box<dyn Error>> {
    let config = load_policy(&args.policy)?;

    let claims = Claims::from_json(&fs::read_to_string(&args.claims)?)?;

    Ok(PolicyVerifier::new(config).verify(&claims, &args.nonce, &args.request_type))
}

fn check(args: &CheckArgs) -> Result<Verdict, Box<dyn Error>> {
    let config = load_policy(&args.policy)?;

    let d = make_decoder(&config.package_name, &args.keys)?;

    let token = fs::read_to_string(&args.token)?;

    let claims = d.decode_for(token.trim(), args.mode, args.request_type)?;

    Ok(PolicyVerifier::new(config).verify_request(&claims, &args.nonce, args.request_type))
}

fn digest(args: &DigestArgs) -> Result<(), Box<dyn Error>> {
    for v in &args.digests {
        let d: CertificateDigest = v.parse()?;

        println!("{d}\t{}", d.to_hex_colons());
    }

    Ok(())
}
