//! Certificate chain verification.
//!
//! Covers the chain steps of token validation: extracting the `x5c` chain,
//! checking every link from leaf to root, and matching the terminal
//! certificate against the pinned roots. Certificates must be ECDSA
//! P-256/SHA-256, ECDSA P-384/SHA-384 or RSA (at least 2048 bits) with
//! PKCS#1 v1.5 SHA-256.

use der::oid::ObjectIdentifier;
use der::{Decode, Encode};
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use sha2::{Digest, Sha256};
use x509_cert::Certificate;

use attestor_core::error::{AttestError, Result};

use super::roots::{fingerprint, TrustedRoots};
use super::token::{SigningAlgorithm, TokenHeader};

/// Longest chain accepted, leaf and root included.
pub const MAX_CHAIN_LEN: usize = 5;

const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// Smallest RSA modulus accepted, in bits.
pub const MIN_RSA_BITS: usize = 2048;

/// Uncompressed and compressed SEC1 point lengths per curve.
const P256_POINT_LENS: [usize; 2] = [65, 33];
const P384_POINT_LENS: [usize; 2] = [97, 49];

/// Signature verification key taken from a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
    Rsa(rsa::RsaPublicKey),
}

impl PublicKey {
    /// Extract the subject public key of a certificate.
    pub fn from_certificate(cert: &Certificate) -> std::result::Result<Self, String> {
        let spki = &cert.tbs_certificate.subject_public_key_info;
        if spki.algorithm.oid == RSA_ENCRYPTION {
            let der = spki
                .to_der()
                .map_err(|e| format!("failed to encode public key: {}", e))?;
            let key = rsa::RsaPublicKey::from_public_key_der(&der)
                .map_err(|e| format!("invalid RSA key: {}", e))?;
            let bits = key.size() * 8;
            if bits < MIN_RSA_BITS {
                return Err(format!(
                    "RSA key has {} bits, at least {} required",
                    bits, MIN_RSA_BITS
                ));
            }
            return Ok(Self::Rsa(key));
        }

        let bytes = spki
            .subject_public_key
            .as_bytes()
            .ok_or("public key is not byte aligned")?;

        if P256_POINT_LENS.contains(&bytes.len()) {
            p256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                .map(Self::P256)
                .map_err(|e| format!("invalid P-256 key: {}", e))
        } else if P384_POINT_LENS.contains(&bytes.len()) {
            p384::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                .map(Self::P384)
                .map_err(|e| format!("invalid P-384 key: {}", e))
        } else {
            Err(format!("unsupported public key ({} bytes)", bytes.len()))
        }
    }

    /// Token algorithm this key produces.
    pub fn algorithm(&self) -> SigningAlgorithm {
        match self {
            Self::P256(_) => SigningAlgorithm::ES256,
            Self::P384(_) => SigningAlgorithm::ES384,
            Self::Rsa(_) => SigningAlgorithm::RS256,
        }
    }

    /// Verify a token signature: raw `r || s` for ECDSA, the PKCS#1 v1.5
    /// block for RSA.
    pub fn verify_raw(&self, message: &[u8], signature: &[u8]) -> bool {
        use ecdsa::signature::Verifier;

        match self {
            Self::P256(key) => p256::ecdsa::Signature::from_slice(signature)
                .map(|sig| key.verify(message, &sig).is_ok())
                .unwrap_or(false),
            Self::P384(key) => p384::ecdsa::Signature::from_slice(signature)
                .map(|sig| key.verify(message, &sig).is_ok())
                .unwrap_or(false),
            Self::Rsa(key) => verify_rsa(key, message, signature),
        }
    }

    /// Verify a certificate signature: DER for ECDSA, the PKCS#1 v1.5
    /// block for RSA.
    fn verify_der(&self, message: &[u8], signature: &[u8]) -> bool {
        use ecdsa::signature::Verifier;

        match self {
            Self::P256(key) => p256::ecdsa::DerSignature::from_bytes(signature)
                .map(|sig| key.verify(message, &sig).is_ok())
                .unwrap_or(false),
            Self::P384(key) => p384::ecdsa::DerSignature::from_bytes(signature)
                .map(|sig| key.verify(message, &sig).is_ok())
                .unwrap_or(false),
            Self::Rsa(key) => verify_rsa(key, message, signature),
        }
    }

    fn signature_oid(&self) -> ObjectIdentifier {
        match self {
            Self::P256(_) => ECDSA_WITH_SHA256,
            Self::P384(_) => ECDSA_WITH_SHA384,
            Self::Rsa(_) => SHA256_WITH_RSA,
        }
    }
}

/// RSASSA-PKCS1-v1_5 with SHA-256.
fn verify_rsa(key: &rsa::RsaPublicKey, message: &[u8], signature: &[u8]) -> bool {
    let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key.clone());
    rsa::pkcs1v15::Signature::try_from(signature)
        .map(|sig| rsa::signature::Verifier::verify(&verifying_key, message, &sig).is_ok())
        .unwrap_or(false)
}

/// A certificate chain as carried by a token, leaf first.
#[derive(Debug, Clone)]
pub struct CertificateChain {
    der: Vec<Vec<u8>>,
    certs: Vec<Certificate>,
}

impl CertificateChain {
    /// EXTRACT_CHAIN: decode the `x5c` header into certificates.
    pub fn from_header(header: &TokenHeader) -> Result<Self> {
        if header.x5c.is_empty() {
            return Err(AttestError::MissingChain);
        }
        Self::from_der(header.chain_der()?)
    }

    pub fn from_der(der: Vec<Vec<u8>>) -> Result<Self> {
        if der.is_empty() {
            return Err(AttestError::MissingChain);
        }
        if der.len() > MAX_CHAIN_LEN {
            return Err(AttestError::ChainBroken(format!(
                "chain has {} certificates, at most {} allowed",
                der.len(),
                MAX_CHAIN_LEN
            )));
        }

        let certs = der
            .iter()
            .enumerate()
            .map(|(i, bytes)| {
                Certificate::from_der(bytes).map_err(|e| {
                    AttestError::MalformedToken(format!("x5c[{}] is not a certificate: {}", i, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { der, certs })
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn leaf(&self) -> &Certificate {
        &self.certs[0]
    }

    pub fn root(&self) -> &Certificate {
        &self.certs[self.certs.len() - 1]
    }

    /// Cache key: SHA-256 over the concatenated chain DER.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for der in &self.der {
            hasher.update((der.len() as u32).to_be_bytes());
            hasher.update(der);
        }
        hasher.finalize().into()
    }

    /// Latest `not_before` and earliest `not_after` across the chain, in
    /// seconds since the epoch.
    pub fn validity_bounds(&self) -> (i64, i64) {
        self.certs.iter().fold((i64::MIN, i64::MAX), |(from, until), cert| {
            let (nb, na) = validity(cert);
            (from.max(nb), until.min(na))
        })
    }

    /// VERIFY_CHAIN: validity windows and every leaf-to-root link.
    pub fn verify_links(&self, now: i64, skew_secs: i64) -> Result<()> {
        for (i, cert) in self.certs.iter().enumerate() {
            let (not_before, not_after) = validity(cert);
            if now < not_before.saturating_sub(skew_secs) || now > not_after.saturating_add(skew_secs)
            {
                return Err(AttestError::ExpiredCertificate(format!(
                    "certificate {} ({}) valid {}..{}, now {}",
                    i, cert.tbs_certificate.subject, not_before, not_after, now
                )));
            }
        }

        for (i, pair) in self.certs.windows(2).enumerate() {
            let (cert, issuer) = (&pair[0], &pair[1]);
            if cert.tbs_certificate.issuer != issuer.tbs_certificate.subject {
                return Err(AttestError::ChainBroken(format!(
                    "certificate {} issuer '{}' does not match certificate {} subject '{}'",
                    i,
                    cert.tbs_certificate.issuer,
                    i + 1,
                    issuer.tbs_certificate.subject
                )));
            }
            verify_cert_signature(cert, issuer)
                .map_err(|e| AttestError::ChainBroken(format!("certificate {}: {}", i, e)))?;
        }

        Ok(())
    }

    /// VERIFY_ROOT: the terminal certificate must be pinned.
    pub fn verify_root(&self, roots: &TrustedRoots) -> Result<()> {
        let fp = fingerprint(&self.der[self.der.len() - 1]);
        if roots.contains(&fp) {
            Ok(())
        } else {
            Err(AttestError::UntrustedRoot {
                fingerprint: hex::encode(fp),
            })
        }
    }

    /// Public key of the leaf certificate.
    pub fn leaf_key(&self) -> Result<PublicKey> {
        PublicKey::from_certificate(self.leaf())
            .map_err(|e| AttestError::ChainBroken(format!("leaf key: {}", e)))
    }
}

fn validity(cert: &Certificate) -> (i64, i64) {
    let v = &cert.tbs_certificate.validity;
    (
        v.not_before.to_unix_duration().as_secs() as i64,
        v.not_after.to_unix_duration().as_secs() as i64,
    )
}

/// Verify that `cert` was signed by the key of `issuer`.
fn verify_cert_signature(
    cert: &Certificate,
    issuer: &Certificate,
) -> std::result::Result<(), String> {
    let issuer_key = PublicKey::from_certificate(issuer)?;

    if cert.signature_algorithm.oid != issuer_key.signature_oid() {
        return Err(format!(
            "signature algorithm {} does not match issuer key",
            cert.signature_algorithm.oid
        ));
    }

    let tbs_der = cert
        .tbs_certificate
        .to_der()
        .map_err(|e| format!("failed to encode tbsCertificate: {}", e))?;
    let signature = cert
        .signature
        .as_bytes()
        .ok_or("signature is not byte aligned")?;

    if issuer_key.verify_der(&tbs_der, signature) {
        Ok(())
    } else {
        Err("signature does not verify under issuer key".to_string())
    }
}
