//! `attestor verify` command - Validate an attestation token.
//!
//! Runs the full validation pipeline against the configured trust roots and
//! a claims policy, prints the JSON report, and exits non-zero when the
//! token is rejected.

use std::io::Read;
use std::path::{Path, PathBuf};

use attestor_runtime::{ClaimsPolicy, NonceSet, Verifier};
use clap::Args;

use super::ConfigArgs;

#[derive(Args)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Compact token. Read from --token-file or stdin when omitted.
    #[arg(long, conflicts_with = "token_file")]
    pub token: Option<String>,

    /// File containing the compact token
    #[arg(long)]
    pub token_file: Option<PathBuf>,

    /// Nonce the token must be bound to (repeatable, at least one)
    #[arg(long = "nonce", required = true)]
    pub nonces: Vec<String>,

    /// Path to claims policy JSON file.
    /// If not provided, a default policy (require_secure_boot=true) is used.
    #[arg(long, short)]
    pub policy: Option<PathBuf>,

    /// Only output the verification result (true/false), no full report.
    #[arg(long, short)]
    pub quiet: bool,
}

pub async fn execute(args: VerifyArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.config.resolve()?;
    let verifier = Verifier::from_config(&config)?;

    let mut policy = match &args.policy {
        Some(path) => load_policy(path)?,
        None => ClaimsPolicy::default(),
    };
    policy.nonces = NonceSet::new(args.nonces)?;

    let token = match (args.token, &args.token_file) {
        (Some(token), _) => token,
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read token file {}: {}", path.display(), e))?,
        (None, None) => {
            let mut token = String::new();
            std::io::stdin().read_to_string(&mut token)?;
            token
        }
    };

    let result = verifier.validate(token.trim(), &policy);

    if args.quiet {
        if result.is_accepted() {
            println!("true");
        } else {
            println!("false");
            if let Some(reason) = result.reason() {
                eprintln!("  {}", reason);
            }
            std::process::exit(1);
        }
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(&result.report())?);

    if !result.is_accepted() {
        std::process::exit(1);
    }

    Ok(())
}

fn load_policy(path: &Path) -> Result<ClaimsPolicy, Box<dyn std::error::Error>> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read policy file {}: {}", path.display(), e))?;
    let policy = serde_json::from_str::<ClaimsPolicy>(&data)
        .map_err(|e| format!("Failed to parse policy file {}: {}", path.display(), e))?;
    Ok(policy)
}
