//! Compact attestation token encoding.
//!
//! A token is three base64url (unpadded) segments joined by `.`:
//! `header.payload.signature`. The header names the signing algorithm and
//! carries the certificate chain (`x5c`, leaf first, standard base64 DER).
//! The signature over `header.payload` is the raw `r || s` value for ECDSA
//! and the PKCS#1 v1.5 block for RSA.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use attestor_core::error::{AttestError, Result};

use super::claims::Claims;

/// Signing algorithms accepted in token headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// ECDSA P-256 with SHA-256.
    ES256,
    /// ECDSA P-384 with SHA-384.
    ES384,
    /// RSASSA-PKCS1-v1_5 with SHA-256, as the hosted attestation service
    /// signs.
    RS256,
}

impl std::fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ES256 => write!(f, "ES256"),
            Self::ES384 => write!(f, "ES384"),
            Self::RS256 => write!(f, "RS256"),
        }
    }
}

/// Token header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub alg: SigningAlgorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Certificate chain, leaf first, standard base64 DER.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub x5c: Vec<String>,
    /// Simulation marker. Present only on tokens from the simulation shim.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sim: bool,
}

impl TokenHeader {
    /// Decode the `x5c` chain into DER certificates, leaf first.
    pub fn chain_der(&self) -> Result<Vec<Vec<u8>>> {
        self.x5c
            .iter()
            .enumerate()
            .map(|(i, cert)| {
                STANDARD.decode(cert).map_err(|e| {
                    AttestError::MalformedToken(format!("x5c[{}] is not base64: {}", i, e))
                })
            })
            .collect()
    }
}

/// A parsed, immutable attestation token.
///
/// Parsing only checks structure. Nothing about a parsed token is trusted
/// until the verifier accepts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationToken {
    header: TokenHeader,
    header_b64: String,
    payload_b64: String,
    signature: Vec<u8>,
    encoded: String,
}

impl AttestationToken {
    /// Parse the compact form.
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(AttestError::MalformedToken(format!(
                "expected 3 segments, got {}",
                segments.len()
            )));
        }

        let header = decode_header(segments[0])?;
        // Must decode even though claims are only interpreted after the
        // signature checks out.
        decode_segment(segments[1], "payload")?;
        let signature = decode_segment(segments[2], "signature")?;
        if signature.is_empty() {
            return Err(AttestError::MalformedToken("empty signature".to_string()));
        }

        Ok(Self {
            header,
            header_b64: segments[0].to_string(),
            payload_b64: segments[1].to_string(),
            signature,
            encoded: token.to_string(),
        })
    }

    /// Build a token from already-encoded header and payload segments.
    pub(crate) fn from_parts(
        header: TokenHeader,
        header_b64: String,
        payload_b64: String,
        signature: Vec<u8>,
    ) -> Self {
        let encoded = format!(
            "{}.{}.{}",
            header_b64,
            payload_b64,
            URL_SAFE_NO_PAD.encode(&signature)
        );
        Self {
            header,
            header_b64,
            payload_b64,
            signature,
            encoded,
        }
    }

    pub fn header(&self) -> &TokenHeader {
        &self.header
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Whether the header carries the simulation marker.
    pub fn is_simulated(&self) -> bool {
        self.header.sim
    }

    /// Bytes covered by the signature: `header.payload`.
    pub fn signing_input(&self) -> Vec<u8> {
        let mut input = Vec::with_capacity(self.header_b64.len() + 1 + self.payload_b64.len());
        input.extend_from_slice(self.header_b64.as_bytes());
        input.push(b'.');
        input.extend_from_slice(self.payload_b64.as_bytes());
        input
    }

    /// Decode the payload into claims.
    pub fn claims(&self) -> Result<Claims> {
        let payload = URL_SAFE_NO_PAD
            .decode(&self.payload_b64)
            .map_err(|e| AttestError::MalformedClaims(format!("payload is not base64url: {}", e)))?;
        serde_json::from_slice(&payload)
            .map_err(|e| AttestError::MalformedClaims(e.to_string()))
    }

    /// Compact encoded form.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl std::fmt::Display for AttestationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl std::str::FromStr for AttestationToken {
    type Err = AttestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Header fields read before the token is parsed.
#[derive(Deserialize)]
struct SimulationMarker {
    #[serde(default)]
    sim: bool,
}

/// Read the simulation marker from the header segment of a compact token.
///
/// Only `sim` is inspected, so a marked header is recognised even when the
/// rest of it (or of the token) would not parse.
pub fn peek_simulated(token: &str) -> Result<bool> {
    let first = token.trim().split('.').next().unwrap_or_default();
    let bytes = decode_segment(first, "header")?;
    let marker: SimulationMarker = serde_json::from_slice(&bytes)
        .map_err(|e| AttestError::MalformedToken(format!("invalid header: {}", e)))?;
    Ok(marker.sim)
}

fn decode_header(segment: &str) -> Result<TokenHeader> {
    let bytes = decode_segment(segment, "header")?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AttestError::MalformedToken(format!("invalid header: {}", e)))
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AttestError::MalformedToken(format!("{} is not base64url: {}", name, e)))
}

pub(crate) fn encode_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(value)?))
}
