//! Token assembly.
//!
//! Wraps a raw hardware quote and its claims into a compact signed token.
//! The signing key is held by a [`QuoteSigner`], which stands for the key
//! inside the attestation boundary; tokens and logs only ever carry its
//! certificate chain.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use ecdsa::signature::Signer;
use sha2::Sha256;

use attestor_core::error::{AttestError, Result};

use super::chain::PublicKey;
use super::claims::Claims;
use super::token::{encode_json, AttestationToken, SigningAlgorithm, TokenHeader};

enum SigningKey {
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    Rsa(rsa::RsaPrivateKey),
}

/// Attestation signing key plus the certificate chain vouching for it.
pub struct QuoteSigner {
    key: SigningKey,
    chain: Vec<Vec<u8>>,
    kid: Option<String>,
    simulated: bool,
}

impl std::fmt::Debug for QuoteSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteSigner")
            .field("alg", &self.algorithm())
            .field("chain_len", &self.chain.len())
            .field("kid", &self.kid)
            .field("simulated", &self.simulated)
            .finish_non_exhaustive()
    }
}

impl QuoteSigner {
    /// Load a PKCS#8 DER private key (P-256, P-384 or RSA) with its chain,
    /// leaf first.
    pub fn from_pkcs8_der(key_der: &[u8], chain: Vec<Vec<u8>>) -> Result<Self> {
        use p384::pkcs8::DecodePrivateKey;

        let key = if let Ok(key) = p384::ecdsa::SigningKey::from_pkcs8_der(key_der) {
            SigningKey::P384(key)
        } else if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_der(key_der) {
            SigningKey::P256(key)
        } else if let Ok(key) =
            <rsa::RsaPrivateKey as rsa::pkcs8::DecodePrivateKey>::from_pkcs8_der(key_der)
        {
            SigningKey::Rsa(key)
        } else {
            return Err(AttestError::ConfigError(
                "signing key is not a PKCS#8 P-256, P-384 or RSA key".to_string(),
            ));
        };

        Ok(Self {
            key,
            chain,
            kid: None,
            simulated: false,
        })
    }

    /// Chainless signer for simulated tokens.
    pub(crate) fn simulated(key: p384::ecdsa::SigningKey, kid: &str) -> Self {
        Self {
            key: SigningKey::P384(key),
            chain: Vec::new(),
            kid: Some(kid.to_string()),
            simulated: true,
        }
    }

    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        match self.key {
            SigningKey::P256(_) => SigningAlgorithm::ES256,
            SigningKey::P384(_) => SigningAlgorithm::ES384,
            SigningKey::Rsa(_) => SigningAlgorithm::RS256,
        }
    }

    /// Public half of the signing key.
    pub fn public_key(&self) -> PublicKey {
        match &self.key {
            SigningKey::P256(key) => PublicKey::P256(p256::ecdsa::VerifyingKey::from(key)),
            SigningKey::P384(key) => PublicKey::P384(p384::ecdsa::VerifyingKey::from(key)),
            SigningKey::Rsa(key) => PublicKey::Rsa(key.to_public_key()),
        }
    }

    fn header(&self) -> TokenHeader {
        TokenHeader {
            alg: self.algorithm(),
            typ: Some("JWT".to_string()),
            kid: self.kid.clone(),
            x5c: self.chain.iter().map(|der| STANDARD.encode(der)).collect(),
            sim: self.simulated,
        }
    }

    /// Raw `r || s` signature, or the PKCS#1 v1.5 block for RSA. Both are
    /// deterministic (RFC 6979 nonces for ECDSA).
    fn sign(&self, message: &[u8]) -> Vec<u8> {
        match &self.key {
            SigningKey::P256(key) => {
                let sig: p256::ecdsa::Signature = key.sign(message);
                sig.to_bytes().to_vec()
            }
            SigningKey::P384(key) => {
                let sig: p384::ecdsa::Signature = key.sign(message);
                sig.to_bytes().to_vec()
            }
            SigningKey::Rsa(key) => {
                let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone());
                let sig = rsa::signature::Signer::sign(&signing_key, message);
                rsa::signature::SignatureEncoding::to_vec(&sig)
            }
        }
    }
}

/// Assemble a compact signed token.
///
/// A non-empty `raw_quote` is embedded base64url in the `quote` claim,
/// replacing whatever the claims carried. Identical inputs and key give a
/// byte-identical token.
pub fn assemble(raw_quote: &[u8], claims: &Claims, signer: &QuoteSigner) -> Result<AttestationToken> {
    let mut claims = claims.clone();
    if !raw_quote.is_empty() {
        claims.quote = Some(URL_SAFE_NO_PAD.encode(raw_quote));
    }

    let header = signer.header();
    let header_b64 = encode_json(&header)?;
    let payload_b64 = encode_json(&claims)?;

    let mut signing_input = Vec::with_capacity(header_b64.len() + 1 + payload_b64.len());
    signing_input.extend_from_slice(header_b64.as_bytes());
    signing_input.push(b'.');
    signing_input.extend_from_slice(payload_b64.as_bytes());
    let signature = signer.sign(&signing_input);

    tracing::debug!(
        alg = %header.alg,
        chain_len = header.x5c.len(),
        simulated = header.sim,
        nonces = claims.eat_nonce.len(),
        "Assembled attestation token"
    );

    Ok(AttestationToken::from_parts(
        header,
        header_b64,
        payload_b64,
        signature,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tee::testutil::{sample_claims, TestChain};

    #[test]
    fn test_assemble_is_deterministic() {
        let signer = TestChain::p384().signer();
        let claims = sample_claims(&["nonce-0000000001"], 1_800_000_000);
        let a = assemble(b"quote", &claims, &signer).unwrap();
        let b = assemble(b"quote", &claims, &signer).unwrap();
        assert_eq!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_assemble_header_and_signature() {
        let test = TestChain::p384();
        let signer = test.signer().with_kid("leaf-1");
        let claims = sample_claims(&["nonce-0000000001"], 1_800_000_000);
        let token = assemble(&[], &claims, &signer).unwrap();

        let header = token.header();
        assert_eq!(header.alg, SigningAlgorithm::ES384);
        assert_eq!(header.typ.as_deref(), Some("JWT"));
        assert_eq!(header.kid.as_deref(), Some("leaf-1"));
        assert_eq!(header.chain_der().unwrap(), test.chain_der());
        assert!(!token.is_simulated());
        assert_eq!(token.signature().len(), 96);
        assert!(signer
            .public_key()
            .verify_raw(&token.signing_input(), token.signature()));
    }

    #[test]
    fn test_assemble_p256_signature_len() {
        let signer = TestChain::p256().signer();
        let claims = sample_claims(&["nonce-0000000001"], 1_800_000_000);
        let token = assemble(&[], &claims, &signer).unwrap();
        assert_eq!(token.header().alg, SigningAlgorithm::ES256);
        assert_eq!(token.signature().len(), 64);
    }

    #[test]
    fn test_assemble_rs256() {
        let test = TestChain::rs256();
        let signer = test.signer();
        let claims = sample_claims(&["nonce-0000000001"], 1_800_000_000);
        let token = assemble(&[], &claims, &signer).unwrap();

        assert_eq!(token.header().alg, SigningAlgorithm::RS256);
        assert_eq!(token.signature().len(), 256);
        assert!(signer
            .public_key()
            .verify_raw(&token.signing_input(), token.signature()));
        assert_eq!(
            token.as_str(),
            assemble(&[], &claims, &signer).unwrap().as_str()
        );
    }

    #[test]
    fn test_assemble_embeds_quote() {
        let signer = TestChain::p384().signer();
        let claims = sample_claims(&["nonce-0000000001"], 1_800_000_000);
        let token = assemble(&[0xA3, 0x01], &claims, &signer).unwrap();
        let decoded = token.claims().unwrap();
        assert_eq!(decoded.quote.as_deref(), Some("owE"));

        let token = assemble(&[], &claims, &signer).unwrap();
        assert!(token.claims().unwrap().quote.is_none());
    }

    #[test]
    fn test_assembled_token_parses_back() {
        let signer = TestChain::p384().signer();
        let claims = sample_claims(&["nonce-0000000001", "nonce-0000000002"], 1_800_000_000);
        let token = assemble(&[], &claims, &signer).unwrap();
        let parsed = AttestationToken::parse(token.as_str()).unwrap();
        assert_eq!(parsed, token);
        assert_eq!(parsed.claims().unwrap(), claims);
    }

    #[test]
    fn test_from_pkcs8_rejects_garbage() {
        assert!(matches!(
            QuoteSigner::from_pkcs8_der(&[1, 2, 3], Vec::new()),
            Err(AttestError::ConfigError(_))
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        let signer = TestChain::p384().signer();
        let debug = format!("{:?}", signer);
        assert!(debug.contains("ES384"));
        assert!(debug.contains("chain_len: 3"));
    }
}
