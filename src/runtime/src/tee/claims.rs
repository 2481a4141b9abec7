//! Decoded attestation claims.
//!
//! The claim names follow the confidential-space token layout so tokens
//! minted by the launcher decode without translation.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use attestor_core::error::{AttestError, Result};

use super::nonce::NonceSet;

/// Value of `dbgstat` when the workload image cannot be debugged.
pub const DEBUG_DISABLED: &str = "disabled-since-boot";

/// Claims carried in an attestation token payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer.
    pub iss: String,
    /// Workload identity.
    pub sub: String,
    /// Intended audience.
    pub aud: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Nonces echoed from the request. Encoded as a bare string when there
    /// is exactly one.
    #[serde(with = "eat_nonce")]
    pub eat_nonce: Vec<String>,
    /// Whether the platform booted with secure boot enforced.
    pub secboot: bool,
    /// Per-component measurements.
    pub submods: Submods,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hwmodel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swname: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub swversion: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbgstat: Option<String>,
    /// Raw hardware quote (base64url), when the issuer embeds one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    /// Claims this crate does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submods {
    pub container: ContainerClaims,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerClaims {
    /// Digest of the workload image, e.g. `sha256:...`.
    pub image_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_reference: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Claims {
    pub fn image_digest(&self) -> &str {
        &self.submods.container.image_digest
    }

    /// The nonce claim as a set.
    pub fn nonce_set(&self) -> NonceSet {
        NonceSet::from_claim(&self.eat_nonce)
    }

    /// Decoded `quote` claim, if present.
    pub fn quote_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.quote
            .as_deref()
            .map(|quote| {
                URL_SAFE_NO_PAD.decode(quote).map_err(|e| {
                    AttestError::MalformedClaims(format!("quote is not base64url: {}", e))
                })
            })
            .transpose()
    }

    /// Earliest instant the token may be used: `nbf` if present, else `iat`.
    pub fn not_before(&self) -> i64 {
        self.nbf.unwrap_or(self.iat)
    }
}

mod eat_nonce {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        One(String),
        Many(Vec<String>),
    }

    pub fn serialize<S: Serializer>(nonces: &[String], s: S) -> Result<S::Ok, S::Error> {
        match nonces {
            [one] => one.serialize(s),
            many => many.serialize(s),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Repr::deserialize(d)? {
            Repr::One(one) => vec![one],
            Repr::Many(many) => many,
        })
    }
}
