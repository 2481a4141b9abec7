//! Attestation token verifier.
//!
//! Verifies the certificate chain, signature, freshness and policy
//! compliance of an attestation token. This is the trust anchor of the
//! crate: a token is accepted only when every step passes, in order:
//!
//! 1. Reject simulated tokens unless the verifier runs in simulated mode
//! 2. Parse the compact token
//! 3. Extract the `x5c` chain and verify every link (validity, issuer,
//!    signature)
//! 4. Match the terminal certificate against the pinned roots
//! 5. Verify the token signature with the leaf key
//! 6. Decode the claims and check `exp`/`nbf`/`iat` against the clock
//! 7. Apply the claims policy
//!
//! Simulated tokens skip steps 3 and 4 and are verified against the
//! simulation key instead. Outside simulated mode a chain-signed token that
//! embeds a simulated quote is refused as well.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use attestor_core::config::AttestationConfig;
use attestor_core::error::{AttestError, Result};

use super::cache::ChainCache;
use super::chain::{CertificateChain, PublicKey};
use super::claims::Claims;
use super::policy::ClaimsPolicy;
use super::roots::TrustedRoots;
use super::simulate::{is_simulated_quote, simulation_public_key};
use super::token::{peek_simulated, AttestationToken};

/// Which tokens a verifier is willing to accept.
#[derive(Debug, Clone)]
pub enum VerifierMode {
    /// Only tokens whose chain ends in a pinned root.
    HardwareBacked,
    /// Additionally accept simulated tokens signed by this key.
    Simulated(PublicKey),
}

impl VerifierMode {
    /// Simulated mode keyed to the built-in simulation signer.
    pub fn simulated() -> Result<Self> {
        Ok(Self::Simulated(simulation_public_key()?))
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulated(_))
    }
}

/// Outcome of validating one token.
#[derive(Debug)]
pub enum ValidationResult {
    Accepted(Claims),
    Rejected(AttestError),
}

/// Serializable summary of a [`ValidationResult`].
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// `ACCEPTED` or `REJECTED`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<Claims>,
    /// Stable reason code, e.g. `NONCE_MISMATCH`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn claims(&self) -> Option<&Claims> {
        match self {
            Self::Accepted(claims) => Some(claims),
            Self::Rejected(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&AttestError> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(err) => Some(err),
        }
    }

    pub fn into_result(self) -> Result<Claims> {
        match self {
            Self::Accepted(claims) => Ok(claims),
            Self::Rejected(err) => Err(err),
        }
    }

    pub fn report(&self) -> ValidationReport {
        match self {
            Self::Accepted(claims) => ValidationReport {
                status: "ACCEPTED",
                claims: Some(claims.clone()),
                reason: None,
                detail: None,
            },
            Self::Rejected(err) => ValidationReport {
                status: "REJECTED",
                claims: None,
                reason: Some(err.code()),
                detail: Some(err.to_string()),
            },
        }
    }
}

impl From<Result<Claims>> for ValidationResult {
    fn from(result: Result<Claims>) -> Self {
        match result {
            Ok(claims) => Self::Accepted(claims),
            Err(err) => Self::Rejected(err),
        }
    }
}

/// Token verifier.
///
/// Holds only immutable trust configuration plus an optional concurrent
/// chain cache, so one instance can be shared across threads behind an
/// `Arc` and called without external locking.
#[derive(Debug)]
pub struct Verifier {
    roots: Arc<TrustedRoots>,
    skew_secs: i64,
    mode: VerifierMode,
    cache: Option<ChainCache>,
}

impl Verifier {
    pub fn new(roots: Arc<TrustedRoots>, clock_skew: Duration, mode: VerifierMode) -> Self {
        Self {
            roots,
            skew_secs: i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX),
            mode,
            cache: None,
        }
    }

    /// Cache verified chains for at most `ttl`.
    pub fn with_cache(mut self, ttl: Duration) -> Self {
        self.cache = Some(ChainCache::new(ttl));
        self
    }

    /// Build a verifier from configuration: pinned roots, skew, simulation
    /// mode and chain cache.
    pub fn from_config(config: &AttestationConfig) -> Result<Self> {
        config.validate()?;
        let roots = Arc::new(TrustedRoots::from_config(config)?);
        let mode = if config.simulate {
            tracing::warn!("Verifier accepts simulated attestation tokens");
            VerifierMode::simulated()?
        } else {
            VerifierMode::HardwareBacked
        };

        let verifier = Self::new(roots, config.clock_skew(), mode);
        Ok(match config.chain_cache_ttl_secs {
            Some(ttl) => verifier.with_cache(Duration::from_secs(ttl)),
            None => verifier,
        })
    }

    pub fn mode(&self) -> &VerifierMode {
        &self.mode
    }

    pub fn roots(&self) -> &TrustedRoots {
        &self.roots
    }

    pub fn cache(&self) -> Option<&ChainCache> {
        self.cache.as_ref()
    }

    /// Validate a compact token against `policy` at the current time.
    pub fn validate(&self, token: &str, policy: &ClaimsPolicy) -> ValidationResult {
        self.validate_at(token, policy, Utc::now())
    }

    /// Validate a compact token against `policy` at `now`.
    pub fn validate_at(
        &self,
        token: &str,
        policy: &ClaimsPolicy,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        let result = self.verify(token, policy, now.timestamp());
        match &result {
            Ok(claims) => tracing::debug!(
                iss = %claims.iss,
                nonces = claims.eat_nonce.len(),
                "Attestation token accepted"
            ),
            Err(e) => tracing::warn!(reason = e.code(), error = %e, "Attestation token rejected"),
        }
        result.into()
    }

    fn verify(&self, raw: &str, policy: &ClaimsPolicy, now: i64) -> Result<Claims> {
        if peek_simulated(raw)? && !self.mode.is_simulated() {
            return Err(AttestError::SimulationNotAllowed);
        }

        let token = AttestationToken::parse(raw)?;
        tracing::debug!(alg = %token.header().alg, "Parsed attestation token");

        let key = match (&self.mode, token.is_simulated()) {
            (VerifierMode::Simulated(key), true) => {
                tracing::warn!("Verifying simulated attestation token (not hardware-attested)");
                key.clone()
            }
            (VerifierMode::HardwareBacked, true) => return Err(AttestError::SimulationNotAllowed),
            (_, false) => self.verify_chain(&token, now)?,
        };

        if key.algorithm() != token.header().alg
            || !key.verify_raw(&token.signing_input(), token.signature())
        {
            return Err(AttestError::SignatureMismatch);
        }
        tracing::debug!("Token signature verified");

        let claims = token.claims()?;
        if !self.mode.is_simulated() {
            if let Some(quote) = claims.quote_bytes()? {
                if is_simulated_quote(&quote) {
                    return Err(AttestError::SimulationNotAllowed);
                }
            }
        }
        self.check_freshness(&claims, now)?;
        policy.check(&claims, now, self.skew_secs)?;
        Ok(claims)
    }

    /// Chain extraction, link verification and root pinning. Returns the
    /// leaf key.
    fn verify_chain(&self, token: &AttestationToken, now: i64) -> Result<PublicKey> {
        let chain = CertificateChain::from_header(token.header())?;

        if let Some(cache) = &self.cache {
            if let Some(key) = cache.get(&chain.fingerprint(), now) {
                tracing::debug!(chain_len = chain.len(), "Certificate chain cache hit");
                return Ok(key);
            }
        }

        chain.verify_links(now, self.skew_secs)?;
        chain.verify_root(&self.roots)?;
        let key = chain.leaf_key()?;
        tracing::debug!(chain_len = chain.len(), "Certificate chain verified");

        if let Some(cache) = &self.cache {
            cache.insert(&chain, key.clone(), now, self.skew_secs);
        }
        Ok(key)
    }

    fn check_freshness(&self, claims: &Claims, now: i64) -> Result<()> {
        if claims.exp.saturating_add(self.skew_secs) < now {
            return Err(AttestError::TokenExpired {
                exp: claims.exp,
                now,
            });
        }
        let not_before = claims.not_before().max(claims.iat);
        if not_before > now.saturating_add(self.skew_secs) {
            return Err(AttestError::TokenNotYetValid { not_before, now });
        }
        Ok(())
    }
}
