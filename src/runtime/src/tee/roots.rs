//! Pinned trust anchors.
//!
//! Roots are pinned by SHA-256 fingerprint of the certificate DER. The set
//! is built once from configuration and never changes afterwards; share it
//! behind an `Arc`.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

use attestor_core::config::AttestationConfig;
use attestor_core::error::{AttestError, Result};

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// SHA-256 fingerprint of a DER certificate.
pub fn fingerprint(der: &[u8]) -> [u8; 32] {
    Sha256::digest(der).into()
}

/// Lowercase hex SHA-256 fingerprint of a DER certificate.
pub fn fingerprint_hex(der: &[u8]) -> String {
    hex::encode(fingerprint(der))
}

/// Immutable set of pinned root fingerprints.
#[derive(Debug, Clone, Default)]
pub struct TrustedRoots {
    fingerprints: HashSet<[u8; 32]>,
}

impl TrustedRoots {
    /// Pin roots by hex fingerprint. Colons and whitespace are ignored, so
    /// `AB:CD:...` as printed by openssl is accepted.
    pub fn from_fingerprints<I, S>(fingerprints: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = HashSet::new();
        for fp in fingerprints {
            set.insert(parse_fingerprint(fp.as_ref())?);
        }
        Ok(Self { fingerprints: set })
    }

    /// Pin every certificate in a PEM bundle.
    pub fn from_pem_bundle(bundle: &[u8]) -> Result<Self> {
        let certs = split_pem_bundle(bundle)?;
        Ok(Self {
            fingerprints: certs.iter().map(|der| fingerprint(der)).collect(),
        })
    }

    /// Build the root set named by configuration: hex fingerprints plus the
    /// certificates found in each configured PEM file.
    pub fn from_config(config: &AttestationConfig) -> Result<Self> {
        let mut roots = Self::from_fingerprints(&config.trusted_root_fingerprints)?;
        for path in &config.trusted_root_certs {
            let bundle = std::fs::read(path).map_err(|e| {
                AttestError::ConfigError(format!(
                    "Failed to read trusted root {}: {}",
                    path.display(),
                    e
                ))
            })?;
            roots
                .fingerprints
                .extend(Self::from_pem_bundle(&bundle)?.fingerprints);
        }
        tracing::debug!(count = roots.len(), "Loaded pinned trust roots");
        Ok(roots)
    }

    /// Pin one more DER certificate.
    pub fn with_certificate(mut self, der: &[u8]) -> Self {
        self.fingerprints.insert(fingerprint(der));
        self
    }

    pub fn contains(&self, fingerprint: &[u8; 32]) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

fn parse_fingerprint(input: &str) -> Result<[u8; 32]> {
    let cleaned: String = input
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .collect();
    let bytes = hex::decode(&cleaned).map_err(|e| {
        AttestError::ConfigError(format!("Invalid root fingerprint '{}': {}", input, e))
    })?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        AttestError::ConfigError(format!(
            "Root fingerprint must be 32 bytes (SHA-256), got {}",
            b.len()
        ))
    })
}

/// Split a PEM bundle into DER certificates, in bundle order.
pub fn split_pem_bundle(bundle: &[u8]) -> Result<Vec<Vec<u8>>> {
    let pem_str = String::from_utf8_lossy(bundle);
    let certs: Vec<&str> = pem_str
        .split(PEM_END)
        .filter(|s| s.contains(PEM_BEGIN))
        .collect();

    if certs.is_empty() {
        return Err(AttestError::ConfigError(
            "No certificates found in PEM bundle".to_string(),
        ));
    }

    certs.into_iter().map(pem_to_der).collect()
}

/// Convert one PEM certificate block to DER bytes.
fn pem_to_der(pem: &str) -> Result<Vec<u8>> {
    let body = pem.split(PEM_BEGIN).nth(1).unwrap_or_default();
    let b64: String = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    STANDARD
        .decode(b64)
        .map_err(|e| AttestError::ConfigError(format!("Failed to decode PEM certificate: {}", e)))
}
