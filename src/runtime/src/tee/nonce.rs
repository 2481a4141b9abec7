//! Attestation requests and nonce sets.

use std::collections::BTreeSet;

use attestor_core::error::{AttestError, Result};
use attestor_core::tee::{TokenType, MAX_NONCES, MAX_NONCE_BYTES, MIN_NONCE_BYTES};
use serde::{Deserialize, Serialize};

/// A validated, duplicate-free set of nonces.
///
/// Equality is set equality: the order nonces were supplied in does not
/// matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct NonceSet(BTreeSet<String>);

impl NonceSet {
    /// Validate caller-supplied nonces.
    ///
    /// Rejects an empty set, more than [`MAX_NONCES`] entries, duplicates,
    /// and any nonce outside `MIN_NONCE_BYTES..=MAX_NONCE_BYTES` UTF-8 bytes.
    pub fn new<I, S>(nonces: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for nonce in nonces {
            if set.len() == MAX_NONCES {
                return Err(AttestError::InvalidNonce(format!(
                    "at most {} nonces allowed",
                    MAX_NONCES
                )));
            }
            let nonce = nonce.into();
            let len = nonce.len();
            if !(MIN_NONCE_BYTES..=MAX_NONCE_BYTES).contains(&len) {
                return Err(AttestError::InvalidNonce(format!(
                    "nonce must be between {} and {} bytes, got {}",
                    MIN_NONCE_BYTES, MAX_NONCE_BYTES, len
                )));
            }
            if !set.insert(nonce) {
                return Err(AttestError::InvalidNonce("duplicate nonce".to_string()));
            }
        }
        if set.is_empty() {
            return Err(AttestError::InvalidNonce(
                "at least one nonce is required".to_string(),
            ));
        }
        Ok(Self(set))
    }

    /// Build a set from a token's nonce claim without length rules.
    ///
    /// Claim contents are whatever the issuer signed; only structural
    /// equality with the expected set matters on the verifying side.
    pub(crate) fn from_claim(nonces: &[String]) -> Self {
        Self(nonces.iter().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, nonce: &str) -> bool {
        self.0.contains(nonce)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Nonces in sorted order.
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl TryFrom<Vec<String>> for NonceSet {
    type Error = AttestError;

    fn try_from(nonces: Vec<String>) -> Result<Self> {
        Self::new(nonces)
    }
}

impl From<NonceSet> for Vec<String> {
    fn from(set: NonceSet) -> Self {
        set.0.into_iter().collect()
    }
}

/// Per-call request for an attestation token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationRequest {
    /// Nonces the token must echo back.
    pub nonces: NonceSet,
    /// Intended audience. The attester default applies when `None`.
    #[serde(default)]
    pub audience: Option<String>,
    /// Token flavour requested from the launcher.
    #[serde(default)]
    pub token_type: TokenType,
}

impl AttestationRequest {
    pub fn new<I, S>(nonces: I, audience: Option<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            nonces: NonceSet::new(nonces)?,
            audience,
            token_type: TokenType::default(),
        })
    }

    pub fn with_token_type(mut self, token_type: TokenType) -> Self {
        self.token_type = token_type;
        self
    }
}
