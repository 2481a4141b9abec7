//! `attestor fingerprint` command.
//!
//! Prints the SHA-256 fingerprint of every certificate in a PEM bundle, in
//! the form accepted by `trusted_root_fingerprints`.

use std::path::PathBuf;

use attestor_runtime::tee::{fingerprint_hex, split_pem_bundle};
use clap::Args;

#[derive(Args)]
pub struct FingerprintArgs {
    /// PEM file containing one or more certificates
    pub pem: PathBuf,
}

pub async fn execute(args: FingerprintArgs) -> Result<(), Box<dyn std::error::Error>> {
    let bundle = std::fs::read(&args.pem)
        .map_err(|e| format!("Failed to read {}: {}", args.pem.display(), e))?;
    for line in fingerprint_lines(&bundle)? {
        println!("{}", line);
    }
    Ok(())
}

fn fingerprint_lines(bundle: &[u8]) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let certs = split_pem_bundle(bundle)?;
    Ok(certs.iter().map(|der| fingerprint_hex(der)).collect())
}
