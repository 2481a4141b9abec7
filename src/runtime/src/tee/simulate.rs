//! Simulated attestation for development and testing.
//!
//! When `simulate: true` is configured (or `SIMULATE_ATTESTATION=1` is set),
//! tokens are issued by a deterministic software key instead of the launcher.
//! Simulated tokens carry `sim: true` in their header and no certificate
//! chain. A verifier only accepts them when built in simulated mode.

use sha2::{Digest, Sha384, Sha512};

use attestor_core::error::{AttestError, Result};
use attestor_core::tee::DEFAULT_AUDIENCE;

use super::assembler::{assemble, QuoteSigner};
use super::chain::PublicKey;
use super::claims::{Claims, ContainerClaims, Submods, DEBUG_DISABLED};
use super::nonce::{AttestationRequest, NonceSet};
use super::token::AttestationToken;

/// Key id carried by simulated tokens.
pub const SIMULATED_KID: &str = "simulated";

/// Issuer of simulated tokens. The `.invalid` TLD never resolves.
pub const SIMULATED_ISSUER: &str = "https://attestor.invalid/simulated";

/// Hardware model claimed by simulated tokens.
pub const SIMULATED_HWMODEL: &str = "SIMULATED";

/// Simulated quote version marker.
/// Real quotes never use 0xA3.
pub const SIMULATED_QUOTE_VERSION: u32 = 0xA3;

/// Simulated chip ID (all 0xA3 bytes, clearly fake).
pub const SIMULATED_CHIP_ID: [u8; 64] = [0xA3; 64];

/// Size of a simulated quote.
pub const SIMULATED_QUOTE_SIZE: usize = 1184;

/// Lifetime of a simulated token.
const SIMULATED_TOKEN_LIFETIME_SECS: i64 = 3600;

const SIMULATION_SEED: &[u8] = b"attestor simulation signing key v1";

/// Report data bound into a simulated quote: SHA-512 over the nonces in
/// sorted order, each prefixed by its byte length.
pub fn report_data(nonces: &NonceSet) -> [u8; 64] {
    let mut hasher = Sha512::new();
    for nonce in nonces.iter() {
        hasher.update((nonce.len() as u32).to_be_bytes());
        hasher.update(nonce.as_bytes());
    }
    hasher.finalize().into()
}

/// Build a simulated quote with the given report_data.
///
/// The layout mirrors a hardware report (version, svn, policy, TCB,
/// report data, measurement, chip id, signature) but the version carries
/// the 0xA3 marker and the signature area is all zeros.
pub fn build_simulated_quote(report_data: &[u8; 64]) -> Vec<u8> {
    let mut quote = vec![0u8; SIMULATED_QUOTE_SIZE];

    // version at 0x00 (4 bytes LE)
    quote[0x00..0x04].copy_from_slice(&SIMULATED_QUOTE_VERSION.to_le_bytes());

    // guest_svn at 0x04 (4 bytes LE)
    quote[0x04..0x08].copy_from_slice(&1u32.to_le_bytes());

    // policy at 0x08 (8 bytes LE), debug disallowed
    quote[0x08..0x10].copy_from_slice(&0u64.to_le_bytes());

    // current_tcb at 0x38
    quote[0x38] = 3; // boot_loader
    quote[0x3E] = 8; // snp
    quote[0x3F] = 115; // microcode

    // report_data at 0x50 (64 bytes)
    quote[0x50..0x90].copy_from_slice(report_data);

    // measurement at 0x90 (48 bytes)
    for i in 0..48 {
        quote[0x90 + i] = (i as u8).wrapping_mul(0xA3);
    }

    // chip_id at 0x1A0 (64 bytes)
    quote[0x1A0..0x1E0].copy_from_slice(&SIMULATED_CHIP_ID);

    // signature at 0x2A0 stays zero

    quote
}

/// Whether a quote carries the simulation version marker (0xA3).
pub fn is_simulated_quote(quote: &[u8]) -> bool {
    match quote.get(0x00..0x04) {
        Some(version) => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(version);
            u32::from_le_bytes(bytes) == SIMULATED_QUOTE_VERSION
        }
        None => false,
    }
}

/// Measurement placed in a simulated quote, as a container image digest.
fn simulated_image_digest() -> String {
    let measurement: Vec<u8> = (0..48u8).map(|i| i.wrapping_mul(0xA3)).collect();
    format!("sha256:{}", hex::encode(&measurement[..32]))
}

fn simulation_key() -> Result<p384::ecdsa::SigningKey> {
    let seed = Sha384::digest(SIMULATION_SEED);
    p384::ecdsa::SigningKey::from_slice(&seed)
        .map_err(|e| AttestError::ConfigError(format!("Invalid simulation key: {}", e)))
}

/// Public key that signs every simulated token.
pub fn simulation_public_key() -> Result<PublicKey> {
    Ok(PublicKey::P384(p384::ecdsa::VerifyingKey::from(
        &simulation_key()?,
    )))
}

/// Software attester that needs no TEE.
#[derive(Debug)]
pub struct SimulatedAttester {
    signer: QuoteSigner,
    default_audience: String,
}

impl SimulatedAttester {
    pub fn new() -> Result<Self> {
        Ok(Self {
            signer: QuoteSigner::simulated(simulation_key()?, SIMULATED_KID),
            default_audience: DEFAULT_AUDIENCE.to_string(),
        })
    }

    /// Audience used when a request does not name one.
    pub fn with_default_audience(mut self, audience: impl Into<String>) -> Self {
        self.default_audience = audience.into();
        self
    }

    /// Issue a simulated token at `now` (Unix seconds).
    pub fn issue(&self, request: &AttestationRequest, now: i64) -> Result<AttestationToken> {
        let quote = build_simulated_quote(&report_data(&request.nonces));
        let claims = Claims {
            iss: SIMULATED_ISSUER.to_string(),
            sub: SIMULATED_KID.to_string(),
            aud: request
                .audience
                .clone()
                .unwrap_or_else(|| self.default_audience.clone()),
            iat: now,
            exp: now + SIMULATED_TOKEN_LIFETIME_SECS,
            nbf: Some(now),
            eat_nonce: request.nonces.to_vec(),
            secboot: true,
            submods: Submods {
                container: ContainerClaims {
                    image_digest: simulated_image_digest(),
                    ..Default::default()
                },
                ..Default::default()
            },
            hwmodel: Some(SIMULATED_HWMODEL.to_string()),
            swname: Some("ATTESTOR_SIMULATION".to_string()),
            dbgstat: Some(DEBUG_DISABLED.to_string()),
            ..Default::default()
        };

        tracing::warn!(
            nonces = request.nonces.len(),
            "Issuing simulated attestation token (no hardware backing)"
        );
        assemble(&quote, &claims, &self.signer)
    }
}
