//! Claims policy.
//!
//! Defines the rules for accepting or rejecting the claims of a token whose
//! signature and chain already verified. Checks run in a fixed order and
//! stop at the first failure: nonces, issuer, audience, secure boot, image
//! digest, debug state, hardware model, token age.

use serde::{Deserialize, Serialize};

use attestor_core::error::{AttestError, Result};

use super::claims::{Claims, DEBUG_DISABLED};
use super::nonce::NonceSet;

/// Policy applied to decoded claims.
///
/// Optional fields are only checked when set. The default policy requires
/// secure boot and has no nonces; it rejects every token until `nonces` is
/// filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimsPolicy {
    /// Nonces the token must have been issued for, as a set.
    #[serde(default)]
    pub nonces: NonceSet,

    /// Required `iss` claim.
    #[serde(default)]
    pub expected_issuer: Option<String>,

    /// Required `aud` claim.
    #[serde(default)]
    pub expected_audience: Option<String>,

    /// Require `secboot: true`.
    #[serde(default = "default_true")]
    pub require_secure_boot: bool,

    /// Container image digests allowed to run. Empty allows any image.
    #[serde(default)]
    pub allowed_image_digests: Vec<String>,

    /// Require `dbgstat` to be `disabled-since-boot`.
    #[serde(default)]
    pub require_debug_disabled: bool,

    /// Required `hwmodel` claim, e.g. `GCP_AMD_SEV`.
    #[serde(default)]
    pub expected_hwmodel: Option<String>,

    /// Maximum age of the token (`now - iat`) in seconds.
    #[serde(default)]
    pub max_token_age_secs: Option<u64>,
}

impl Default for ClaimsPolicy {
    fn default() -> Self {
        Self {
            nonces: NonceSet::default(),
            expected_issuer: None,
            expected_audience: None,
            require_secure_boot: true,
            allowed_image_digests: Vec::new(),
            require_debug_disabled: false,
            expected_hwmodel: None,
            max_token_age_secs: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn violation(claim: &str, reason: impl Into<String>) -> AttestError {
    AttestError::PolicyViolation {
        claim: claim.to_string(),
        reason: reason.into(),
    }
}

impl ClaimsPolicy {
    /// Default policy bound to the given nonces.
    pub fn new(nonces: NonceSet) -> Self {
        Self {
            nonces,
            ..Default::default()
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.expected_audience = Some(audience.into());
        self
    }

    pub fn allow_image_digest(mut self, digest: impl Into<String>) -> Self {
        self.allowed_image_digests.push(digest.into());
        self
    }

    /// Check claims against this policy at `now` (Unix seconds).
    pub fn check(&self, claims: &Claims, now: i64, skew_secs: i64) -> Result<()> {
        if self.nonces.is_empty() {
            return Err(AttestError::InvalidNonce(
                "policy has no expected nonces".to_string(),
            ));
        }
        if claims.nonce_set() != self.nonces {
            return Err(AttestError::NonceMismatch);
        }

        if let Some(ref issuer) = self.expected_issuer {
            if &claims.iss != issuer {
                return Err(violation(
                    "iss",
                    format!("expected '{}', got '{}'", issuer, claims.iss),
                ));
            }
        }

        if let Some(ref audience) = self.expected_audience {
            if &claims.aud != audience {
                return Err(violation(
                    "aud",
                    format!("expected '{}', got '{}'", audience, claims.aud),
                ));
            }
        }

        if self.require_secure_boot && !claims.secboot {
            return Err(violation("secboot", "secure boot is not enabled"));
        }

        if !self.allowed_image_digests.is_empty()
            && !self
                .allowed_image_digests
                .iter()
                .any(|d| d == claims.image_digest())
        {
            return Err(violation(
                "submods.container.image_digest",
                format!("image '{}' is not in the allow-list", claims.image_digest()),
            ));
        }

        if self.require_debug_disabled && claims.dbgstat.as_deref() != Some(DEBUG_DISABLED) {
            return Err(violation(
                "dbgstat",
                format!(
                    "expected '{}', got '{}'",
                    DEBUG_DISABLED,
                    claims.dbgstat.as_deref().unwrap_or("<absent>")
                ),
            ));
        }

        if let Some(ref hwmodel) = self.expected_hwmodel {
            if claims.hwmodel.as_ref() != Some(hwmodel) {
                return Err(violation(
                    "hwmodel",
                    format!(
                        "expected '{}', got '{}'",
                        hwmodel,
                        claims.hwmodel.as_deref().unwrap_or("<absent>")
                    ),
                ));
            }
        }

        if let Some(max_age) = self.max_token_age_secs {
            let max_age = i64::try_from(max_age).unwrap_or(i64::MAX);
            let age = now.saturating_sub(claims.iat);
            if age > max_age.saturating_add(skew_secs) {
                return Err(violation(
                    "iat",
                    format!("token is {}s old, maximum is {}s", age, max_age),
                ));
            }
        }

        Ok(())
    }
}
