//! CLI command definitions and dispatch.

mod fingerprint;
mod issue;
mod verify;
mod version;

use std::path::PathBuf;

use attestor_core::config::AttestationConfig;
use clap::{Args, Parser, Subcommand};

/// Attestor - issue and verify confidential-computing attestation tokens.
#[derive(Parser)]
#[command(name = "attestor", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Request an attestation token bound to one or more nonces
    Issue(issue::IssueArgs),
    /// Validate a token against pinned roots and a claims policy
    Verify(verify::VerifyArgs),
    /// Print SHA-256 fingerprints of PEM certificates for pinning
    Fingerprint(fingerprint::FingerprintArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Options shared by commands that need attestation configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Configuration file (YAML, or JSON with a .json extension)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Use simulated attestation instead of hardware
    #[arg(long)]
    pub simulate: bool,
}

impl ConfigArgs {
    /// Load the configuration file (or defaults) with environment overrides,
    /// then apply command-line flags. Not validated.
    pub fn resolve(&self) -> Result<AttestationConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => AttestationConfig::read(path)?,
            None => {
                let mut config = AttestationConfig::default();
                config.apply_env();
                config
            }
        };
        if self.simulate {
            config.simulate = true;
        }
        Ok(config)
    }
}

/// Dispatch a parsed CLI command to its handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Issue(args) => issue::execute(args).await,
        Command::Verify(args) => verify::execute(args).await,
        Command::Fingerprint(args) => fingerprint::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attestor_core::config::SIMULATE_ENV;
    use serial_test::serial;

    #[test]
    fn test_parse_issue() {
        let cli = Cli::try_parse_from([
            "attestor",
            "issue",
            "--nonce",
            "nonce-0000000001",
            "--nonce",
            "nonce-0000000002",
            "--simulate",
        ])
        .unwrap();
        match cli.command {
            Command::Issue(args) => {
                assert_eq!(args.nonces.len(), 2);
                assert!(args.config.simulate);
            }
            _ => panic!("expected issue"),
        }
    }

    #[test]
    fn test_parse_verify_requires_nonce() {
        assert!(Cli::try_parse_from(["attestor", "verify", "--token", "a.b.c"]).is_err());
        assert!(Cli::try_parse_from([
            "attestor",
            "verify",
            "--token",
            "a.b.c",
            "--nonce",
            "nonce-0000000001"
        ])
        .is_ok());
    }

    #[test]
    #[serial]
    fn test_resolve_defaults_and_flags() {
        std::env::remove_var(SIMULATE_ENV);
        let config = ConfigArgs::default().resolve().unwrap();
        assert!(!config.simulate);

        let args = ConfigArgs {
            config: None,
            simulate: true,
        };
        assert!(args.resolve().unwrap().simulate);
    }

    #[test]
    #[serial]
    fn test_resolve_reads_file() {
        std::env::remove_var(SIMULATE_ENV);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attestor.yaml");
        std::fs::write(&path, "socket_path: /run/other.sock\nrequest_timeout_ms: 750\n").unwrap();

        let args = ConfigArgs {
            config: Some(path),
            simulate: false,
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/run/other.sock"));
        assert_eq!(config.request_timeout_ms, 750);
    }
}
